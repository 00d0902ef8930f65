/*!
 * Error Types
 * Configuration-edge errors with thiserror, miette, and serde support
 *
 * The dispatch engine has no recoverable error path: contract violations
 * panic. These errors only surface while turning external configuration
 * into scheduler parameters.
 */

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Scheduler configuration errors with serialization support
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum SchedError {
    #[error("Invalid scheduling policy: {0}")]
    #[diagnostic(
        code(sched::invalid_policy),
        help("Use one of: noop, iorr, bvt, prio.")
    )]
    InvalidPolicy(String),

    #[error("Invalid idle mode: {0}")]
    #[diagnostic(code(sched::invalid_idle_mode), help("Use pause or hlt."))]
    InvalidIdleMode(String),

    #[error("Invalid thread parameters: {0}")]
    #[diagnostic(
        code(sched::invalid_params),
        help("BVT weight must be at least 1 and the priority must be idle, low or high.")
    )]
    InvalidParams(String),

    #[error("Invalid timer period: {0}")]
    #[diagnostic(
        code(sched::invalid_period),
        help("Tick periods and charging units are whole milliseconds between 1 and 1000.")
    )]
    InvalidPeriod(String),

    #[error("Physical CPU count out of range: {0}")]
    #[diagnostic(
        code(sched::invalid_pcpu_count),
        help("A scheduler instance manages between 1 and 64 physical CPUs.")
    )]
    InvalidPcpuCount(usize),

    #[error("Failed to parse scheduler configuration: {0}")]
    #[diagnostic(
        code(sched::config_parse),
        help("Check the configuration JSON against SchedConfig's fields.")
    )]
    ConfigParse(String),
}

impl From<serde_json::Error> for SchedError {
    fn from(err: serde_json::Error) -> Self {
        SchedError::ConfigParse(err.to_string())
    }
}

/// Result type for configuration-edge operations
pub type SchedResult<T> = Result<T, SchedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_serializes_with_tag() {
        let err = SchedError::InvalidPcpuCount(0);
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("invalid_pcpu_count"));
    }

    #[test]
    fn test_json_error_converts() {
        let parse: Result<u32, _> = serde_json::from_str("not json");
        let err: SchedError = parse.unwrap_err().into();
        assert!(matches!(err, SchedError::ConfigParse(_)));
    }
}
