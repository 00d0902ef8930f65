/*!
 * Lock-Free Scheduler Statistics
 * Per-CPU atomic counters updated on the dispatch hot paths
 */

use super::stats::SchedStats;
use crate::core::types::PcpuId;
use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic scheduler statistics for one physical CPU
///
/// # Performance
/// - Cache-line aligned to prevent false sharing between CPUs
/// - All operations use relaxed ordering
/// - Snapshot requires no lock
#[repr(C, align(64))]
#[derive(Debug, Default)]
pub struct AtomicSchedStats {
    picks: AtomicU64,
    context_switches: AtomicU64,
    wakes: AtomicU64,
    sleeps: AtomicU64,
    yields: AtomicU64,
    ticks: AtomicU64,
    reschedule_requests: AtomicU64,
    remote_kicks: AtomicU64,
}

impl AtomicSchedStats {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Performance
    /// Hot path - called on every `schedule()` that consumes a request
    #[inline(always)]
    pub fn inc_picks(&self) {
        self.picks.fetch_add(1, Ordering::Relaxed);
    }

    /// # Performance
    /// Hot path - called on every status hand-off
    #[inline(always)]
    pub fn inc_context_switches(&self) {
        self.context_switches.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_wakes(&self) {
        self.wakes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_sleeps(&self) {
        self.sleeps.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_yields(&self) {
        self.yields.fetch_add(1, Ordering::Relaxed);
    }

    /// # Performance
    /// Hot path - called from timer interrupt context
    #[inline(always)]
    pub fn inc_ticks(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_reschedule_requests(&self) {
        self.reschedule_requests.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_remote_kicks(&self) {
        self.remote_kicks.fetch_add(1, Ordering::Relaxed);
    }

    /// Zero every counter (CPU re-initialisation)
    pub fn reset(&self) {
        for counter in [
            &self.picks,
            &self.context_switches,
            &self.wakes,
            &self.sleeps,
            &self.yields,
            &self.ticks,
            &self.reschedule_requests,
            &self.remote_kicks,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Get snapshot of current stats
    ///
    /// # Note
    /// Counters may be slightly inconsistent with each other under
    /// concurrent updates; each value is individually accurate.
    #[inline]
    pub fn snapshot(&self, pcpu_id: PcpuId) -> SchedStats {
        SchedStats {
            pcpu_id,
            picks: self.picks.load(Ordering::Relaxed),
            context_switches: self.context_switches.load(Ordering::Relaxed),
            wakes: self.wakes.load(Ordering::Relaxed),
            sleeps: self.sleeps.load(Ordering::Relaxed),
            yields: self.yields.load(Ordering::Relaxed),
            ticks: self.ticks.load(Ordering::Relaxed),
            reschedule_requests: self.reschedule_requests.load(Ordering::Relaxed),
            remote_kicks: self.remote_kicks.load(Ordering::Relaxed),
            ..SchedStats::default()
        }
    }
}
