/*!
 * Monitoring
 * Structured tracing setup and per-CPU spans
 */

mod tracer;

pub use tracer::{init_tracing, span_pcpu, PcpuSpan};
