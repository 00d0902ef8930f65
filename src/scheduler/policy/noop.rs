/*!
 * Noop Policy
 * Partitioned CPU: exactly one non-idle thread, no timer, no queue
 */

use super::super::traits::{PolicyCtx, SchedPolicy};
use super::super::types::{SchedParams, SchedulerKind};
use super::SchedData;
use crate::core::types::ThreadId;
use crate::thread::ThreadObject;
use tracing::debug;

/// Single-slot policy for CPUs dedicated to one VCPU
#[derive(Debug, Default)]
pub struct NoopSched {
    thread: Option<ThreadId>,
}

impl NoopSched {
    pub fn new() -> Self {
        Self::default()
    }

    /// Thread owning this CPU, if one is registered
    pub fn owner(&self) -> Option<ThreadId> {
        self.thread
    }
}

impl SchedPolicy for NoopSched {
    fn kind(&self) -> SchedulerKind {
        SchedulerKind::Noop
    }

    fn init_data(&mut self, obj: &ThreadObject, _params: &SchedParams) -> SchedData {
        if let Some(owner) = self.thread {
            panic!(
                "noop pcpu{} already owned by thread {}, cannot add {}",
                obj.pcpu_id(),
                owner,
                obj
            );
        }
        debug!(pcpu = obj.pcpu_id(), thread = %obj, "noop owner registered");
        self.thread = Some(obj.id());
        SchedData::Noop
    }

    #[inline]
    fn pick_next(&mut self, ctx: &PolicyCtx<'_>) -> Option<ThreadId> {
        let id = self.thread?;
        let obj = ctx.threads.get(id);
        if obj.is_blocked() || obj.is_blocking() {
            None
        } else {
            Some(id)
        }
    }

    fn deinit_data(&mut self, obj: &ThreadObject) {
        if self.thread == Some(obj.id()) {
            self.thread = None;
        }
    }

    fn deinit(&mut self, _ctx: &PolicyCtx<'_>) {
        self.thread = None;
    }

    fn queued(&self) -> Vec<ThreadId> {
        self.thread.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::Bench;
    use super::*;
    use crate::thread::ThreadStatus;

    #[test]
    fn test_pick_follows_owner_status() {
        let mut bench = Bench::new();
        let mut noop = NoopSched::new();
        let vcpu = bench.thread("vcpu0");
        noop.init_data(&vcpu, &SchedParams::default());

        // Registered but still blocked
        assert_eq!(noop.pick_next(&bench.ctx()), None);

        vcpu.status.store(ThreadStatus::Runnable);
        assert_eq!(noop.pick_next(&bench.ctx()), Some(vcpu.id()));

        bench.dispatch(&vcpu);
        vcpu.be_blocking.store(true, std::sync::atomic::Ordering::SeqCst);
        assert_eq!(noop.pick_next(&bench.ctx()), None);
    }

    #[test]
    #[should_panic(expected = "already owned")]
    fn test_second_owner_panics() {
        let mut bench = Bench::new();
        let mut noop = NoopSched::new();
        let first = bench.thread("vcpu0");
        let second = bench.thread("vcpu1");
        noop.init_data(&first, &SchedParams::default());
        noop.init_data(&second, &SchedParams::default());
    }

    #[test]
    fn test_deinit_data_frees_slot() {
        let mut bench = Bench::new();
        let mut noop = NoopSched::new();
        let vcpu = bench.thread("vcpu0");
        noop.init_data(&vcpu, &SchedParams::default());
        noop.deinit_data(&vcpu);
        assert_eq!(noop.owner(), None);
        assert!(noop.queued().is_empty());
    }
}
