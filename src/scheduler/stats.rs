/*!
 * Scheduler Statistics
 * Per-CPU snapshot combining counters with queue state
 */

use super::types::SchedulerKind;
use super::Scheduler;
use crate::core::types::{PcpuId, ThreadId};
use serde::{Deserialize, Serialize};

/// Point-in-time statistics of one physical CPU
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedStats {
    pub pcpu_id: PcpuId,
    /// `None` while the CPU is not initialised
    pub policy: Option<SchedulerKind>,
    pub current: Option<ThreadId>,
    pub runqueue_len: usize,
    pub picks: u64,
    pub context_switches: u64,
    pub wakes: u64,
    pub sleeps: u64,
    pub yields: u64,
    pub ticks: u64,
    pub reschedule_requests: u64,
    pub remote_kicks: u64,
}

impl Scheduler {
    /// Statistics snapshot of `pcpu_id`
    pub fn stats(&self, pcpu_id: PcpuId) -> SchedStats {
        let control = self.control(pcpu_id);
        let mut snapshot = control.stats().snapshot(pcpu_id);

        let state = self.lock_control(control);
        snapshot.policy = state.policy_kind();
        snapshot.current = state.current().map(|cur| cur.id());
        snapshot.runqueue_len = state.queued().len();
        snapshot
    }

    /// Snapshots of every CPU
    pub fn all_stats(&self) -> Vec<SchedStats> {
        (0..self.nr_pcpus())
            .map(|pcpu| self.stats(pcpu as PcpuId))
            .collect()
    }
}
