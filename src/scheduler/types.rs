/*!
 * Scheduler Types
 * Policy selection, priority levels and per-thread scheduling parameters
 */

use crate::core::errors::{SchedError, SchedResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Scheduling policy bound to a physical CPU
///
/// # Performance
/// - Packed C layout for efficient policy checks
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SchedulerKind {
    /// One fixed thread per CPU
    Noop,
    /// I/O-weighted round robin with a periodic tick
    #[default]
    Iorr,
    /// Borrowed virtual time
    Bvt,
    /// Strict two-level priority
    Prio,
}

impl SchedulerKind {
    /// Parse from string representation
    pub fn from_str(s: &str) -> SchedResult<Self> {
        match s.to_lowercase().as_str() {
            "noop" | "sched_noop" => Ok(Self::Noop),
            "iorr" | "sched_iorr" | "round_robin" | "rr" => Ok(Self::Iorr),
            "bvt" | "sched_bvt" | "borrowed_virtual_time" => Ok(Self::Bvt),
            "prio" | "sched_prio" | "priority" => Ok(Self::Prio),
            _ => Err(SchedError::InvalidPolicy(format!(
                "'{}'. Valid: noop, iorr, bvt, prio",
                s
            ))),
        }
    }

    /// Convert to string representation
    ///
    /// # Performance
    /// Hot path - frequently called for logging and serialization
    #[inline(always)]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Noop => "sched_noop",
            Self::Iorr => "sched_iorr",
            Self::Bvt => "sched_bvt",
            Self::Prio => "sched_prio",
        }
    }
}

impl Serialize for SchedulerKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SchedulerKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Priority levels understood by the PRIO policy
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadPriority {
    Idle = 0,
    #[default]
    Low = 1,
    High = 2,
}

/// Number of priority levels
pub const PRIO_MAX: usize = 3;

impl ThreadPriority {
    /// All levels, highest first
    pub const DESCENDING: [ThreadPriority; PRIO_MAX] =
        [ThreadPriority::High, ThreadPriority::Low, ThreadPriority::Idle];

    #[inline(always)]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Next level up, saturating at `High`
    pub const fn boosted(self) -> Self {
        match self {
            Self::Idle => Self::Low,
            Self::Low | Self::High => Self::High,
        }
    }
}

/// Per-thread scheduling parameters, consumed once by `init_thread_data`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSchedParams")]
pub struct SchedParams {
    /// Level used by the PRIO policy
    pub prio: ThreadPriority,
    /// BVT weight: CPU share is proportional to it
    pub bvt_weight: u8,
    /// Amount subtracted from AVT while the thread is warped
    pub bvt_warp_value: i32,
    /// Longest warp episode, in charging units
    pub bvt_warp_limit: u32,
    /// Minimum unwarped time after an episode, in charging units
    pub bvt_unwarp_period: u32,
}

impl Default for SchedParams {
    fn default() -> Self {
        Self {
            prio: ThreadPriority::Low,
            bvt_weight: 1,
            bvt_warp_value: 0,
            bvt_warp_limit: 0,
            bvt_unwarp_period: 0,
        }
    }
}

impl SchedParams {
    pub fn with_prio(prio: ThreadPriority) -> Self {
        Self {
            prio,
            ..Self::default()
        }
    }

    pub fn with_weight(bvt_weight: u8) -> Self {
        Self {
            bvt_weight,
            ..Self::default()
        }
    }

    /// Check the parameter bundle before it reaches a policy
    pub fn validate(self) -> SchedResult<Self> {
        if self.bvt_weight == 0 {
            return Err(SchedError::InvalidParams("bvt_weight is 0".into()));
        }
        if self.bvt_warp_value < 0 {
            return Err(SchedError::InvalidParams(format!(
                "bvt_warp_value {} is negative",
                self.bvt_warp_value
            )));
        }
        if self.bvt_warp_value > 0 && self.bvt_warp_limit == 0 {
            return Err(SchedError::InvalidParams(
                "bvt_warp_value set without a bvt_warp_limit".into(),
            ));
        }
        Ok(self)
    }

    /// Whether the BVT policy may ever warp this thread
    #[inline]
    pub const fn can_warp(&self) -> bool {
        self.bvt_warp_value > 0 && self.bvt_warp_limit > 0
    }
}

#[derive(Deserialize)]
struct RawSchedParams {
    #[serde(default)]
    prio: ThreadPriority,
    #[serde(default = "default_weight")]
    bvt_weight: u8,
    #[serde(default)]
    bvt_warp_value: i32,
    #[serde(default)]
    bvt_warp_limit: u32,
    #[serde(default)]
    bvt_unwarp_period: u32,
}

fn default_weight() -> u8 {
    1
}

impl TryFrom<RawSchedParams> for SchedParams {
    type Error = SchedError;

    fn try_from(raw: RawSchedParams) -> SchedResult<Self> {
        SchedParams {
            prio: raw.prio,
            bvt_weight: raw.bvt_weight,
            bvt_warp_value: raw.bvt_warp_value,
            bvt_warp_limit: raw.bvt_warp_limit,
            bvt_unwarp_period: raw.bvt_unwarp_period,
        }
        .validate()
    }
}

/// Timer period configuration in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PeriodMs(u32);

impl PeriodMs {
    /// Create new period
    pub fn new(ms: u32) -> SchedResult<Self> {
        if ms == 0 || ms > 1_000 {
            return Err(SchedError::InvalidPeriod(format!(
                "{}ms must be between 1ms and 1000ms",
                ms
            )));
        }
        Ok(Self(ms))
    }

    /// Compile-time constructor for built-in defaults
    pub(crate) const fn from_const(ms: u32) -> Self {
        assert!(ms > 0 && ms <= 1_000, "period out of range");
        Self(ms)
    }

    #[inline(always)]
    pub const fn as_millis(&self) -> u32 {
        self.0
    }

    /// Convert to platform clock ticks
    #[inline(always)]
    pub const fn to_ticks(&self, ticks_per_ms: u64) -> u64 {
        self.0 as u64 * ticks_per_ms
    }
}

impl<'de> Deserialize<'de> for PeriodMs {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u32::deserialize(deserializer)?;
        Self::new(ms).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_parsing() {
        assert_eq!(SchedulerKind::from_str("iorr").unwrap(), SchedulerKind::Iorr);
        assert_eq!(SchedulerKind::from_str("SCHED_BVT").unwrap(), SchedulerKind::Bvt);
        assert_eq!(SchedulerKind::from_str("priority").unwrap(), SchedulerKind::Prio);
        assert_eq!(SchedulerKind::from_str("noop").unwrap(), SchedulerKind::Noop);
        assert!(SchedulerKind::from_str("cfs").is_err());
    }

    #[test]
    fn test_policy_serde_uses_canonical_names() {
        let json = serde_json::to_string(&SchedulerKind::Bvt).unwrap();
        assert_eq!(json, "\"sched_bvt\"");
        let back: SchedulerKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, SchedulerKind::Bvt);
    }

    #[test]
    fn test_priority_boost_saturates() {
        assert_eq!(ThreadPriority::Idle.boosted(), ThreadPriority::Low);
        assert_eq!(ThreadPriority::Low.boosted(), ThreadPriority::High);
        assert_eq!(ThreadPriority::High.boosted(), ThreadPriority::High);
        assert!(ThreadPriority::High > ThreadPriority::Low);
    }

    #[test]
    fn test_params_validation() {
        assert!(SchedParams::default().validate().is_ok());
        assert!(SchedParams::with_weight(0).validate().is_err());

        let negative_warp = SchedParams {
            bvt_warp_value: -3,
            ..SchedParams::default()
        };
        assert!(negative_warp.validate().is_err());

        let warp_without_limit = SchedParams {
            bvt_warp_value: 4,
            ..SchedParams::default()
        };
        assert!(warp_without_limit.validate().is_err());
    }

    #[test]
    fn test_params_deserialize_validates() {
        let params: SchedParams =
            serde_json::from_str(r#"{"prio":"high","bvt_weight":4}"#).unwrap();
        assert_eq!(params.prio, ThreadPriority::High);
        assert_eq!(params.bvt_weight, 4);
        assert!(!params.can_warp());

        assert!(serde_json::from_str::<SchedParams>(r#"{"bvt_weight":0}"#).is_err());
    }

    #[test]
    fn test_period_validation() {
        assert!(PeriodMs::new(0).is_err());
        assert!(PeriodMs::new(1).is_ok());
        assert!(PeriodMs::new(1_000).is_ok());
        assert!(PeriodMs::new(1_001).is_err());
        assert_eq!(PeriodMs::new(10).unwrap().to_ticks(1_000), 10_000);
    }
}
