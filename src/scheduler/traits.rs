/*!
 * Scheduler Policy Trait
 * Capability set every scheduling algorithm implements
 */

use super::arena::ThreadArena;
use super::policy::SchedData;
use super::types::{SchedParams, SchedulerKind};
use crate::core::types::{PcpuId, ThreadId, Ticks};
use crate::platform::Platform;
use crate::thread::ThreadObject;
use std::sync::Arc;

/// View of a CPU's scheduling state handed to a policy
///
/// Only ever built while the CPU's scheduler lock is held.
pub struct PolicyCtx<'a> {
    pub pcpu_id: PcpuId,
    pub now: Ticks,
    /// Thread currently running on the CPU (may be the idle thread)
    pub current: Option<&'a Arc<ThreadObject>>,
    pub threads: &'a ThreadArena,
    pub platform: &'a dyn Platform,
}

impl PolicyCtx<'_> {
    /// Whether `obj` is the thread running on this CPU
    #[inline]
    pub fn is_current(&self, obj: &ThreadObject) -> bool {
        self.current.map(|cur| cur.id()) == Some(obj.id())
    }

    /// Current thread unless it is the idle thread
    #[inline]
    pub fn current_non_idle(&self) -> Option<&Arc<ThreadObject>> {
        self.current.filter(|cur| !cur.is_idle())
    }
}

/// Scheduling algorithm bound to one physical CPU
///
/// Every method runs under the CPU's scheduler lock. Methods a policy has
/// no use for keep their no-op defaults.
pub trait SchedPolicy: Send {
    /// Which algorithm this is
    fn kind(&self) -> SchedulerKind;

    /// Bring the per-CPU state to operating state
    fn init(&mut self, _ctx: &PolicyCtx<'_>) {}

    /// Seed the per-thread data block of a thread joining this CPU
    fn init_data(&mut self, obj: &ThreadObject, params: &SchedParams) -> SchedData;

    /// Choose the thread to run next; `None` selects the idle thread
    fn pick_next(&mut self, ctx: &PolicyCtx<'_>) -> Option<ThreadId>;

    /// `obj` is about to displace `ctx.current` without a pick
    ///
    /// Called by `run_thread` on a first dispatch, before the hand-off.
    fn dispatched(&mut self, _obj: &ThreadObject, _ctx: &PolicyCtx<'_>) {}

    /// Take `obj` off the runqueue
    fn sleep(&mut self, _obj: &ThreadObject, _ctx: &PolicyCtx<'_>) {}

    /// Put `obj` back on the runqueue
    ///
    /// Returns whether the CPU should re-evaluate its choice.
    fn wake(&mut self, _obj: &ThreadObject, _ctx: &PolicyCtx<'_>) -> bool {
        true
    }

    /// Give up the rest of the current thread's turn
    fn yield_current(&mut self, _ctx: &PolicyCtx<'_>) {}

    /// Raise `obj`'s standing for upcoming picks
    fn prioritize(&mut self, _obj: &ThreadObject, _ctx: &PolicyCtx<'_>) {}

    /// Forget a thread leaving this CPU
    fn deinit_data(&mut self, _obj: &ThreadObject) {}

    /// Release per-CPU resources
    fn deinit(&mut self, _ctx: &PolicyCtx<'_>) {}

    /// Stop internal timers, keeping queue contents
    fn suspend(&mut self, _ctx: &PolicyCtx<'_>) {}

    /// Restart internal timers
    fn resume(&mut self, _ctx: &PolicyCtx<'_>) {}

    /// Timer expiry in interrupt context; returns whether to reschedule
    fn tick(&mut self, _ctx: &PolicyCtx<'_>) -> bool {
        false
    }

    /// Queued threads in pick order (diagnostics)
    fn queued(&self) -> Vec<ThreadId> {
        Vec::new()
    }
}
