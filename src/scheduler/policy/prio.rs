/*!
 * PRIO Policy
 * Strict priority levels, FIFO within a level, no time slicing
 */

use super::super::traits::{PolicyCtx, SchedPolicy};
use super::super::types::{SchedParams, SchedulerKind, ThreadPriority, PRIO_MAX};
use super::SchedData;
use crate::core::types::ThreadId;
use crate::thread::ThreadObject;
use serde::Serialize;
use std::collections::VecDeque;
use tracing::{debug, trace};

/// Per-thread PRIO data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PrioData {
    pub prio: ThreadPriority,
}

/// One FIFO per priority level
///
/// The running thread stays at the head of its level, so it keeps the CPU
/// until it sleeps, yields, or something strictly more urgent wakes.
#[derive(Debug, Default)]
pub struct PrioSched {
    queues: [VecDeque<ThreadId>; PRIO_MAX],
}

impl PrioSched {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn remove(&mut self, id: ThreadId) {
        for queue in &mut self.queues {
            queue.retain(|queued| *queued != id);
        }
    }

    #[inline]
    fn contains(&self, id: ThreadId) -> bool {
        self.queues.iter().any(|queue| queue.contains(&id))
    }

    /// Threads queued at one level, head first
    pub fn level(&self, prio: ThreadPriority) -> impl Iterator<Item = ThreadId> + '_ {
        self.queues[prio.index()].iter().copied()
    }
}

impl SchedPolicy for PrioSched {
    fn kind(&self) -> SchedulerKind {
        SchedulerKind::Prio
    }

    fn init_data(&mut self, _obj: &ThreadObject, params: &SchedParams) -> SchedData {
        SchedData::Prio(PrioData { prio: params.prio })
    }

    #[inline]
    fn pick_next(&mut self, ctx: &PolicyCtx<'_>) -> Option<ThreadId> {
        let next = ThreadPriority::DESCENDING
            .iter()
            .find_map(|prio| self.queues[prio.index()].front().copied());
        trace!(pcpu = ctx.pcpu_id, ?next, "prio pick");
        next
    }

    fn dispatched(&mut self, obj: &ThreadObject, _ctx: &PolicyCtx<'_>) {
        if obj.is_idle() {
            return;
        }
        let level = obj.data().prio().prio;
        self.remove(obj.id());
        self.queues[level.index()].push_front(obj.id());
    }

    fn sleep(&mut self, obj: &ThreadObject, _ctx: &PolicyCtx<'_>) {
        self.remove(obj.id());
    }

    fn wake(&mut self, obj: &ThreadObject, ctx: &PolicyCtx<'_>) -> bool {
        // Each data lock is released before the next one is taken; obj may
        // be the current thread.
        let woken = obj.data().prio().prio;
        if !self.contains(obj.id()) {
            // A cancelled sleep keeps its place ahead of same-level peers
            let queue = &mut self.queues[woken.index()];
            if ctx.is_current(obj) {
                queue.push_front(obj.id());
            } else {
                queue.push_back(obj.id());
            }
        }

        match ctx.current_non_idle() {
            None => true,
            Some(cur) => {
                let running = cur.data().prio().prio;
                woken >= running
            }
        }
    }

    fn yield_current(&mut self, ctx: &PolicyCtx<'_>) {
        if let Some(cur) = ctx.current_non_idle() {
            let prio = cur.data().prio().prio;
            let queue = &mut self.queues[prio.index()];
            if let Some(pos) = queue.iter().position(|queued| *queued == cur.id()) {
                queue.remove(pos);
                queue.push_back(cur.id());
            }
        }
    }

    fn prioritize(&mut self, obj: &ThreadObject, _ctx: &PolicyCtx<'_>) {
        let (from, to) = {
            let mut data = obj.data();
            let prio = data.prio_mut();
            let from = prio.prio;
            prio.prio = from.boosted();
            (from, prio.prio)
        };
        if from == to {
            return;
        }

        let queue = &mut self.queues[from.index()];
        if let Some(pos) = queue.iter().position(|queued| *queued == obj.id()) {
            queue.remove(pos);
            self.queues[to.index()].push_back(obj.id());
        }
        debug!(thread = %obj, ?from, ?to, "prio boosted");
    }

    fn deinit_data(&mut self, obj: &ThreadObject) {
        self.remove(obj.id());
    }

    fn deinit(&mut self, _ctx: &PolicyCtx<'_>) {
        for queue in &mut self.queues {
            queue.clear();
        }
    }

    fn queued(&self) -> Vec<ThreadId> {
        ThreadPriority::DESCENDING
            .iter()
            .flat_map(|prio| self.queues[prio.index()].iter().copied())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::Bench;
    use super::*;
    use crate::thread::ThreadStatus;
    use std::sync::Arc;

    fn thread_at(bench: &mut Bench, prio: &mut PrioSched, name: &str, level: ThreadPriority) -> Arc<ThreadObject> {
        let obj = bench.thread(name);
        *obj.data() = prio.init_data(&obj, &SchedParams::with_prio(level));
        obj
    }

    fn wake(bench: &Bench, prio: &mut PrioSched, obj: &ThreadObject) -> bool {
        let resched = prio.wake(obj, &bench.ctx());
        obj.status.store(ThreadStatus::Runnable);
        resched
    }

    #[test]
    fn test_highest_level_first() {
        let mut bench = Bench::new();
        let mut prio = PrioSched::new();
        let low = thread_at(&mut bench, &mut prio, "low", ThreadPriority::Low);
        let high = thread_at(&mut bench, &mut prio, "high", ThreadPriority::High);

        assert!(wake(&bench, &mut prio, &low));
        assert!(wake(&bench, &mut prio, &high));
        assert_eq!(prio.pick_next(&bench.ctx()), Some(high.id()));
        assert_eq!(prio.queued(), vec![high.id(), low.id()]);
    }

    #[test]
    fn test_running_thread_keeps_cpu() {
        let mut bench = Bench::new();
        let mut prio = PrioSched::new();
        let first = thread_at(&mut bench, &mut prio, "first", ThreadPriority::Low);
        let second = thread_at(&mut bench, &mut prio, "second", ThreadPriority::Low);

        wake(&bench, &mut prio, &first);
        let next = bench.resolve(prio.pick_next(&bench.ctx()));
        bench.dispatch(&next);

        // Same level wake asks for a re-pick but the head stays
        assert!(wake(&bench, &mut prio, &second));
        assert_eq!(prio.pick_next(&bench.ctx()), Some(first.id()));
    }

    #[test]
    fn test_lower_wake_does_not_preempt() {
        let mut bench = Bench::new();
        let mut prio = PrioSched::new();
        let high = thread_at(&mut bench, &mut prio, "high", ThreadPriority::High);
        let low = thread_at(&mut bench, &mut prio, "low", ThreadPriority::Low);

        wake(&bench, &mut prio, &high);
        let next = bench.resolve(prio.pick_next(&bench.ctx()));
        bench.dispatch(&next);

        assert!(!wake(&bench, &mut prio, &low));
    }

    #[test]
    fn test_wake_of_current_thread() {
        let mut bench = Bench::new();
        let mut prio = PrioSched::new();
        let vcpu = thread_at(&mut bench, &mut prio, "vcpu", ThreadPriority::Low);
        wake(&bench, &mut prio, &vcpu);
        let next = bench.resolve(prio.pick_next(&bench.ctx()));
        bench.dispatch(&next);

        // Latched sleep followed by a wake before the switch
        prio.sleep(&vcpu, &bench.ctx());
        assert!(prio.wake(&vcpu, &bench.ctx()));
        assert_eq!(prio.queued(), vec![vcpu.id()]);
    }

    #[test]
    fn test_cancelled_sleep_keeps_head_of_level() {
        let mut bench = Bench::new();
        let mut prio = PrioSched::new();
        let vcpu = thread_at(&mut bench, &mut prio, "vcpu", ThreadPriority::Low);
        let peer = thread_at(&mut bench, &mut prio, "peer", ThreadPriority::Low);
        wake(&bench, &mut prio, &vcpu);
        wake(&bench, &mut prio, &peer);
        let next = bench.resolve(prio.pick_next(&bench.ctx()));
        bench.dispatch(&next);
        assert_eq!(next.id(), vcpu.id());

        prio.sleep(&vcpu, &bench.ctx());
        assert_eq!(prio.pick_next(&bench.ctx()), Some(peer.id()));

        prio.wake(&vcpu, &bench.ctx());
        assert_eq!(prio.queued(), vec![vcpu.id(), peer.id()]);
        assert_eq!(prio.pick_next(&bench.ctx()), Some(vcpu.id()));
    }

    #[test]
    fn test_direct_dispatch_moves_to_head_of_level() {
        let mut bench = Bench::new();
        let mut prio = PrioSched::new();
        let a = thread_at(&mut bench, &mut prio, "a", ThreadPriority::Low);
        let b = thread_at(&mut bench, &mut prio, "b", ThreadPriority::Low);
        wake(&bench, &mut prio, &a);
        wake(&bench, &mut prio, &b);

        prio.dispatched(&b, &bench.ctx());
        bench.dispatch(&b);
        assert_eq!(prio.queued(), vec![b.id(), a.id()]);
        assert_eq!(prio.pick_next(&bench.ctx()), Some(b.id()));
    }

    #[test]
    fn test_yield_rotates_level() {
        let mut bench = Bench::new();
        let mut prio = PrioSched::new();
        let a = thread_at(&mut bench, &mut prio, "a", ThreadPriority::Low);
        let b = thread_at(&mut bench, &mut prio, "b", ThreadPriority::Low);
        wake(&bench, &mut prio, &a);
        wake(&bench, &mut prio, &b);

        let next = bench.resolve(prio.pick_next(&bench.ctx()));
        bench.dispatch(&next);
        prio.yield_current(&bench.ctx());

        assert_eq!(prio.pick_next(&bench.ctx()), Some(b.id()));
    }

    #[test]
    fn test_prioritize_moves_to_higher_level() {
        let mut bench = Bench::new();
        let mut prio = PrioSched::new();
        let a = thread_at(&mut bench, &mut prio, "a", ThreadPriority::Low);
        let b = thread_at(&mut bench, &mut prio, "b", ThreadPriority::Low);
        wake(&bench, &mut prio, &a);
        wake(&bench, &mut prio, &b);

        prio.prioritize(&b, &bench.ctx());
        assert_eq!(b.data().prio().prio, ThreadPriority::High);
        assert_eq!(prio.level(ThreadPriority::High).collect::<Vec<_>>(), vec![b.id()]);
        assert_eq!(prio.pick_next(&bench.ctx()), Some(b.id()));

        // Saturates at the top level
        prio.prioritize(&b, &bench.ctx());
        assert_eq!(b.data().prio().prio, ThreadPriority::High);
    }
}
