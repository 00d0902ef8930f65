/*!
 * IORR Policy
 * FIFO round robin over runnable threads, preempted by a periodic tick
 */

use super::super::traits::{PolicyCtx, SchedPolicy};
use super::super::types::{SchedParams, SchedulerKind};
use super::SchedData;
use crate::core::types::{ThreadId, Ticks};
use crate::thread::ThreadObject;
use std::collections::VecDeque;
use tracing::trace;

/// Round-robin runqueue of one CPU
///
/// The running thread is not queued; it goes back to the tail when the
/// next pick displaces it.
#[derive(Debug)]
pub struct IorrSched {
    runqueue: VecDeque<ThreadId>,
    tick_period: Ticks,
}

impl IorrSched {
    pub fn new(tick_period: Ticks) -> Self {
        Self {
            runqueue: VecDeque::new(),
            tick_period,
        }
    }

    #[inline]
    pub fn tick_period(&self) -> Ticks {
        self.tick_period
    }

    #[inline]
    fn enqueue(&mut self, id: ThreadId) {
        if !self.runqueue.contains(&id) {
            self.runqueue.push_back(id);
        }
    }

    #[inline]
    fn remove(&mut self, id: ThreadId) {
        self.runqueue.retain(|queued| *queued != id);
    }

    /// Send a still-eligible current thread to the tail
    fn requeue_prev(&mut self, ctx: &PolicyCtx<'_>) {
        if let Some(prev) = ctx.current_non_idle() {
            if prev.is_running() && !prev.is_blocking() {
                self.enqueue(prev.id());
            }
        }
    }
}

impl SchedPolicy for IorrSched {
    fn kind(&self) -> SchedulerKind {
        SchedulerKind::Iorr
    }

    fn init(&mut self, ctx: &PolicyCtx<'_>) {
        ctx.platform.arm_tick(ctx.pcpu_id, self.tick_period);
    }

    fn init_data(&mut self, _obj: &ThreadObject, _params: &SchedParams) -> SchedData {
        SchedData::Iorr
    }

    fn pick_next(&mut self, ctx: &PolicyCtx<'_>) -> Option<ThreadId> {
        self.requeue_prev(ctx);
        let next = self.runqueue.pop_front();
        trace!(pcpu = ctx.pcpu_id, ?next, queued = self.runqueue.len(), "iorr pick");
        next
    }

    fn dispatched(&mut self, obj: &ThreadObject, ctx: &PolicyCtx<'_>) {
        self.requeue_prev(ctx);
        self.remove(obj.id());
    }

    fn sleep(&mut self, obj: &ThreadObject, _ctx: &PolicyCtx<'_>) {
        self.remove(obj.id());
    }

    fn wake(&mut self, obj: &ThreadObject, _ctx: &PolicyCtx<'_>) -> bool {
        if !obj.is_running() {
            self.enqueue(obj.id());
        }
        true
    }

    fn deinit_data(&mut self, obj: &ThreadObject) {
        self.remove(obj.id());
    }

    fn deinit(&mut self, ctx: &PolicyCtx<'_>) {
        ctx.platform.disarm_tick(ctx.pcpu_id);
        self.runqueue.clear();
    }

    fn suspend(&mut self, ctx: &PolicyCtx<'_>) {
        ctx.platform.disarm_tick(ctx.pcpu_id);
    }

    fn resume(&mut self, ctx: &PolicyCtx<'_>) {
        ctx.platform.arm_tick(ctx.pcpu_id, self.tick_period);
    }

    #[inline]
    fn tick(&mut self, _ctx: &PolicyCtx<'_>) -> bool {
        true
    }

    fn queued(&self) -> Vec<ThreadId> {
        self.runqueue.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::Bench;
    use super::*;
    use crate::thread::ThreadStatus;

    fn runnable(bench: &mut Bench, iorr: &mut IorrSched, name: &str) -> std::sync::Arc<ThreadObject> {
        let obj = bench.thread(name);
        iorr.init_data(&obj, &SchedParams::default());
        assert!(iorr.wake(&obj, &bench.ctx()));
        obj.status.store(ThreadStatus::Runnable);
        obj
    }

    #[test]
    fn test_round_robin_cycle() {
        let mut bench = Bench::new();
        let mut iorr = IorrSched::new(10_000);
        let a = runnable(&mut bench, &mut iorr, "a");
        let b = runnable(&mut bench, &mut iorr, "b");
        let c = runnable(&mut bench, &mut iorr, "c");

        let mut order = Vec::new();
        for _ in 0..6 {
            let next = bench.resolve(iorr.pick_next(&bench.ctx()));
            bench.dispatch(&next);
            order.push(next.id());
        }

        assert_eq!(order, vec![a.id(), b.id(), c.id(), a.id(), b.id(), c.id()]);
    }

    #[test]
    fn test_wake_is_idempotent() {
        let mut bench = Bench::new();
        let mut iorr = IorrSched::new(10_000);
        let a = runnable(&mut bench, &mut iorr, "a");
        iorr.wake(&a, &bench.ctx());
        assert_eq!(iorr.queued(), vec![a.id()]);
    }

    #[test]
    fn test_blocking_prev_is_not_requeued() {
        let mut bench = Bench::new();
        let mut iorr = IorrSched::new(10_000);
        let a = runnable(&mut bench, &mut iorr, "a");

        let next = bench.resolve(iorr.pick_next(&bench.ctx()));
        bench.dispatch(&next);
        a.be_blocking.store(true, std::sync::atomic::Ordering::SeqCst);
        iorr.sleep(&a, &bench.ctx());

        assert_eq!(iorr.pick_next(&bench.ctx()), None);
        assert!(iorr.queued().is_empty());
    }

    #[test]
    fn test_direct_dispatch_dequeues_and_requeues_prev() {
        let mut bench = Bench::new();
        let mut iorr = IorrSched::new(10_000);
        let a = runnable(&mut bench, &mut iorr, "a");
        let b = runnable(&mut bench, &mut iorr, "b");

        let next = bench.resolve(iorr.pick_next(&bench.ctx()));
        bench.dispatch(&next);
        assert_eq!(iorr.queued(), vec![b.id()]);

        iorr.dispatched(&b, &bench.ctx());
        bench.dispatch(&b);
        assert_eq!(iorr.queued(), vec![a.id()]);
        assert_eq!(iorr.pick_next(&bench.ctx()), Some(a.id()));
    }

    #[test]
    fn test_timer_follows_lifecycle() {
        let bench = Bench::new();
        let mut iorr = IorrSched::new(10_000);

        iorr.init(&bench.ctx());
        assert_eq!(bench.platform.armed_period(0), Some(10_000));
        iorr.suspend(&bench.ctx());
        assert_eq!(bench.platform.armed_period(0), None);
        iorr.resume(&bench.ctx());
        assert_eq!(bench.platform.armed_period(0), Some(10_000));
        iorr.deinit(&bench.ctx());
        assert_eq!(bench.platform.armed_period(0), None);
    }
}
