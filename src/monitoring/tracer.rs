/*!
 * Structured Tracing
 * Subscriber setup and per-CPU operation spans using the tracing crate
 *
 * Every event emitted inside a `PcpuSpan` carries the CPU id and a
 * sequence number, in either compact text or JSON output.
 */

use crate::core::types::PcpuId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info, span, warn, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static NEXT_SPAN_SEQ: AtomicU64 = AtomicU64::new(1);

const DEFAULT_FILTER: &str = "info";
const TRACE_JSON_ENV: &str = "HVSCHED_TRACE_JSON";

/// Install the global subscriber
///
/// Levels come from RUST_LOG (default `info`). HVSCHED_TRACE_JSON=1|true
/// switches from compact lines to one JSON object per event.
pub fn init_tracing() {
    let json = json_output_requested();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let json_layer = json.then(|| {
        fmt::layer()
            .json()
            .with_thread_names(true)
            .with_current_span(true)
    });
    let text_layer = (!json).then(|| fmt::layer().compact().with_thread_names(true));

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .init();
    info!(json, "tracing initialized");
}

fn json_output_requested() -> bool {
    matches!(std::env::var(TRACE_JSON_ENV).as_deref(), Ok("1") | Ok("true"))
}

/// Span covering one operation on one physical CPU
pub struct PcpuSpan {
    span: tracing::Span,
    start: Instant,
    seq: u64,
}

impl PcpuSpan {
    pub fn new(operation: &str, pcpu_id: PcpuId) -> Self {
        let seq = NEXT_SPAN_SEQ.fetch_add(1, Ordering::Relaxed);
        let span = span!(
            Level::DEBUG,
            "pcpu",
            seq,
            pcpu = pcpu_id,
            operation = operation,
            switches = tracing::field::Empty,
            duration_us = tracing::field::Empty,
        );

        Self {
            span,
            start: Instant::now(),
            seq,
        }
    }

    /// Sequence number correlating this span's events
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn record_switches(&self, count: u64) {
        self.span.record("switches", count);
    }

    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

impl Drop for PcpuSpan {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        self.span.record("duration_us", duration.as_micros() as u64);
        let _entered = self.span.enter();

        if duration.as_millis() > 100 {
            warn!(seq = self.seq, duration_ms = duration.as_millis() as u64, "slow pcpu operation");
        } else {
            debug!(seq = self.seq, "pcpu operation completed");
        }
    }
}

/// Helper to create a per-CPU span
#[inline]
pub fn span_pcpu(operation: &str, pcpu_id: PcpuId) -> PcpuSpan {
    PcpuSpan::new(operation, pcpu_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn init_test_tracing() {
        let _ = tracing_subscriber::registry()
            .with(EnvFilter::new("debug"))
            .with(tracing_subscriber::fmt::layer().compact())
            .try_init();
    }

    #[test]
    fn test_pcpu_span_sequence() {
        init_test_tracing();

        let first = span_pcpu("workload", 0);
        let second = span_pcpu("workload", 1);
        assert!(second.seq() > first.seq());

        let _entered = first.enter();
        first.record_switches(3);
    }

    #[test]
    #[serial]
    fn test_json_output_switch() {
        std::env::remove_var(TRACE_JSON_ENV);
        assert!(!json_output_requested());

        std::env::set_var(TRACE_JSON_ENV, "true");
        assert!(json_output_requested());
        std::env::set_var(TRACE_JSON_ENV, "yes");
        assert!(!json_output_requested());

        std::env::remove_var(TRACE_JSON_ENV);
    }
}
