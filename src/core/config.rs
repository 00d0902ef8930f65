/*!
 * Scheduler Configuration
 *
 * Build-time knobs of the scheduling core, loadable from JSON or the
 * environment:
 * - HVSCHED_POLICY: noop | iorr | bvt | prio
 * - HVSCHED_IDLE_MODE: pause | hlt
 * - HVSCHED_PCPUS: number of physical CPUs
 */

use super::errors::{SchedError, SchedResult};
use super::types::{IdleMode, MAX_PCPUS};
use crate::scheduler::types::{PeriodMs, SchedulerKind};
use serde::{Deserialize, Serialize};

/// Default round-robin quantum
pub const DEFAULT_IORR_TICK_MS: u32 = 10;
/// BVT minimum charging unit
pub const BVT_MCU_MS: u32 = 1;
/// BVT context switch allowance, in charging units
pub const BVT_CSA_MCU: u32 = 5;

const IORR_TICK: PeriodMs = PeriodMs::from_const(DEFAULT_IORR_TICK_MS);
const BVT_MCU: PeriodMs = PeriodMs::from_const(BVT_MCU_MS);

/// Scheduling core configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedConfig {
    /// Policy bound to every CPU at `init_sched`
    pub policy: SchedulerKind,
    /// Wait mode of the idle thread
    pub idle_mode: IdleMode,
    /// Physical CPUs managed by this instance
    pub nr_pcpus: usize,
    /// IORR preemption tick
    pub iorr_tick_ms: PeriodMs,
    /// BVT minimum charging unit and tick
    pub bvt_mcu_ms: PeriodMs,
    /// Extra charging units a BVT thread may run past the runner-up
    pub bvt_csa_mcu: u32,
}

impl Default for SchedConfig {
    fn default() -> Self {
        Self {
            policy: SchedulerKind::default(),
            idle_mode: IdleMode::default(),
            nr_pcpus: 1,
            iorr_tick_ms: IORR_TICK,
            bvt_mcu_ms: BVT_MCU,
            bvt_csa_mcu: BVT_CSA_MCU,
        }
    }
}

impl SchedConfig {
    /// Configuration for `nr_pcpus` CPUs running `policy`
    pub fn new(policy: SchedulerKind, nr_pcpus: usize) -> Self {
        Self {
            policy,
            nr_pcpus,
            ..Self::default()
        }
    }

    pub fn with_idle_mode(mut self, idle_mode: IdleMode) -> Self {
        self.idle_mode = idle_mode;
        self
    }

    /// Check cross-field constraints
    pub fn validate(self) -> SchedResult<Self> {
        if self.nr_pcpus == 0 || self.nr_pcpus > MAX_PCPUS {
            return Err(SchedError::InvalidPcpuCount(self.nr_pcpus));
        }
        Ok(self)
    }

    /// Parse and validate a JSON document
    pub fn from_json(json: &str) -> SchedResult<Self> {
        let config: SchedConfig = serde_json::from_str(json)?;
        config.validate()
    }

    /// Defaults overridden by HVSCHED_* environment variables
    pub fn from_env() -> SchedResult<Self> {
        let mut config = Self::default();

        if let Ok(policy) = std::env::var("HVSCHED_POLICY") {
            config.policy = SchedulerKind::from_str(&policy)?;
        }
        if let Ok(mode) = std::env::var("HVSCHED_IDLE_MODE") {
            config.idle_mode = IdleMode::from_str(&mode).map_err(SchedError::InvalidIdleMode)?;
        }
        if let Ok(pcpus) = std::env::var("HVSCHED_PCPUS") {
            config.nr_pcpus = pcpus
                .trim()
                .parse()
                .map_err(|_| SchedError::ConfigParse(format!("HVSCHED_PCPUS='{}'", pcpus)))?;
        }

        config.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_defaults_are_valid() {
        let config = SchedConfig::default().validate().unwrap();
        assert_eq!(config.policy, SchedulerKind::Iorr);
        assert_eq!(config.iorr_tick_ms.as_millis(), DEFAULT_IORR_TICK_MS);
        assert_eq!(config.bvt_csa_mcu, BVT_CSA_MCU);
    }

    #[test]
    fn test_from_json_partial() {
        let config =
            SchedConfig::from_json(r#"{"policy":"bvt","nr_pcpus":4,"idle_mode":"pause"}"#)
                .unwrap();
        assert_eq!(config.policy, SchedulerKind::Bvt);
        assert_eq!(config.nr_pcpus, 4);
        assert_eq!(config.idle_mode, IdleMode::Pause);
        assert_eq!(config.bvt_mcu_ms.as_millis(), BVT_MCU_MS);
    }

    #[test]
    fn test_from_json_rejects_bad_values() {
        assert!(matches!(
            SchedConfig::from_json(r#"{"nr_pcpus":0}"#),
            Err(SchedError::InvalidPcpuCount(0))
        ));
        assert!(SchedConfig::from_json(r#"{"iorr_tick_ms":0}"#).is_err());
        assert!(SchedConfig::from_json(r#"{"policy":"fifo"}"#).is_err());
        assert!(SchedConfig::from_json(r#"{"quantum":3}"#).is_err());
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        std::env::set_var("HVSCHED_POLICY", "prio");
        std::env::set_var("HVSCHED_PCPUS", "2");
        std::env::remove_var("HVSCHED_IDLE_MODE");

        let config = SchedConfig::from_env().unwrap();
        assert_eq!(config.policy, SchedulerKind::Prio);
        assert_eq!(config.nr_pcpus, 2);

        std::env::set_var("HVSCHED_PCPUS", "many");
        assert!(SchedConfig::from_env().is_err());

        std::env::remove_var("HVSCHED_POLICY");
        std::env::remove_var("HVSCHED_PCPUS");
    }
}
