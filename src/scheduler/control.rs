/*!
 * Per-CPU Scheduler Control
 *
 * One control per physical CPU. The request flags are atomic and may be
 * set without the lock; everything else (current thread, arena, policy
 * queues) lives behind an IRQ-safe spin lock.
 */

use super::arena::ThreadArena;
use super::atomic_stats::AtomicSchedStats;
use super::policy::Policy;
use super::traits::{PolicyCtx, SchedPolicy};
use super::types::SchedulerKind;
use crate::core::types::{PcpuId, ThreadId};
use crate::platform::{Clock, CpuLocal, IrqFlags, Platform};
use crate::thread::{ThreadObject, ThreadStatus};
use bitflags::bitflags;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

bitflags! {
    /// Requests pending on a CPU, consumed by the CPU itself
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SchedFlags: u64 {
        /// Re-run the policy at the next scheduling point
        const NEED_RESCHEDULE = 1 << 0;
        /// Leave the idle loop
        const NEED_OFFLINE = 1 << 1;
    }
}

/// Lock-protected scheduling state of one CPU
pub struct SchedState {
    initialized: bool,
    suspended: bool,
    current: Option<ThreadId>,
    idle: Option<Arc<ThreadObject>>,
    threads: ThreadArena,
    policy: Option<Policy>,
}

impl SchedState {
    fn new() -> Self {
        Self {
            initialized: false,
            suspended: false,
            current: None,
            idle: None,
            threads: ThreadArena::new(),
            policy: None,
        }
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    #[inline]
    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Thread running on this CPU
    #[inline]
    pub fn current(&self) -> Option<&Arc<ThreadObject>> {
        self.current.map(|id| self.threads.get(id))
    }

    #[inline]
    pub fn idle(&self) -> Option<&Arc<ThreadObject>> {
        self.idle.as_ref()
    }

    #[inline]
    pub fn threads(&self) -> &ThreadArena {
        &self.threads
    }

    pub fn policy_kind(&self) -> Option<SchedulerKind> {
        self.policy.as_ref().map(Policy::kind)
    }

    /// Runqueue contents in pick order
    pub fn queued(&self) -> Vec<ThreadId> {
        self.policy
            .as_ref()
            .map(|policy| policy.as_dyn().queued())
            .unwrap_or_default()
    }

    #[inline]
    pub fn is_current(&self, obj: &ThreadObject) -> bool {
        self.current == Some(obj.id())
    }

    pub(crate) fn assert_initialized(&self, pcpu_id: PcpuId) {
        assert!(
            self.initialized,
            "pcpu{} scheduler is not initialized",
            pcpu_id
        );
    }

    pub(crate) fn assert_registered(&self, obj: &ThreadObject) {
        assert!(
            self.threads.contains(obj.id()),
            "thread {} is not registered on pcpu{}",
            obj,
            obj.pcpu_id()
        );
    }

    /// Run `f` against the bound policy with a view of this state
    pub(crate) fn with_policy<R>(
        &mut self,
        pcpu_id: PcpuId,
        platform: &dyn Platform,
        f: impl FnOnce(&mut dyn SchedPolicy, &PolicyCtx<'_>) -> R,
    ) -> R {
        let SchedState {
            current,
            threads,
            policy,
            ..
        } = self;
        let policy = match policy {
            Some(policy) => policy,
            None => panic!("pcpu{} has no scheduling policy bound", pcpu_id),
        };
        let threads: &ThreadArena = threads;
        let ctx = PolicyCtx {
            pcpu_id,
            now: platform.now(),
            current: (*current).map(|id| threads.get(id)),
            threads,
            platform,
        };
        f(policy.as_dyn_mut(), &ctx)
    }

    /// Status and hook hand-off from `prev` to `next`
    ///
    /// The raw switch, if any, happens after the lock is released.
    pub(crate) fn switch(&mut self, prev: &ThreadObject, next: &ThreadObject) {
        prev.run_switch_out();
        let status = if prev.be_blocking.swap(false, Ordering::AcqRel) {
            ThreadStatus::Blocked
        } else {
            ThreadStatus::Runnable
        };
        prev.status.store(status);

        next.run_switch_in();
        next.status.store(ThreadStatus::Running);
        self.current = Some(next.id());
    }

    pub(crate) fn bring_up(&mut self, idle: Arc<ThreadObject>, policy: Policy) {
        idle.status.store(ThreadStatus::Running);
        self.current = Some(idle.id());
        self.threads.insert(Arc::clone(&idle));
        self.idle = Some(idle);
        self.policy = Some(policy);
        self.initialized = true;
        self.suspended = false;
    }

    pub(crate) fn tear_down(&mut self) {
        for obj in self.threads.iter() {
            *obj.data() = Default::default();
        }
        self.threads.clear();
        self.current = None;
        self.idle = None;
        self.policy = None;
        self.initialized = false;
        self.suspended = false;
    }

    pub(crate) fn set_suspended(&mut self, suspended: bool) {
        self.suspended = suspended;
    }

    pub(crate) fn register(&mut self, obj: Arc<ThreadObject>) {
        self.threads.insert(obj);
    }

    pub(crate) fn unregister(&mut self, obj: &ThreadObject) {
        self.threads.remove(obj.id());
    }
}

/// Scheduler control block of one physical CPU
pub struct SchedControl {
    pcpu_id: PcpuId,
    flags: AtomicU64,
    state: spin::Mutex<SchedState>,
    stats: AtomicSchedStats,
}

impl SchedControl {
    pub(crate) fn new(pcpu_id: PcpuId) -> Self {
        Self {
            pcpu_id,
            flags: AtomicU64::new(0),
            state: spin::Mutex::new(SchedState::new()),
            stats: AtomicSchedStats::new(),
        }
    }

    #[inline]
    pub fn pcpu_id(&self) -> PcpuId {
        self.pcpu_id
    }

    /// Pending requests
    #[inline]
    pub fn flags(&self) -> SchedFlags {
        SchedFlags::from_bits_truncate(self.flags.load(Ordering::Acquire))
    }

    #[inline(always)]
    pub(crate) fn set_flag(&self, flag: SchedFlags) {
        self.flags.fetch_or(flag.bits(), Ordering::AcqRel);
    }

    #[inline(always)]
    pub(crate) fn test_flag(&self, flag: SchedFlags) -> bool {
        self.flags().contains(flag)
    }

    /// Clear `flag`, returning whether it was set
    #[inline(always)]
    pub(crate) fn test_and_clear(&self, flag: SchedFlags) -> bool {
        self.flags.fetch_and(!flag.bits(), Ordering::AcqRel) & flag.bits() != 0
    }

    pub(crate) fn clear_flags(&self) {
        self.flags.store(0, Ordering::Release);
    }

    #[inline]
    pub fn stats(&self) -> &AtomicSchedStats {
        &self.stats
    }

    /// Mask local interrupts, then take the lock
    pub(crate) fn lock<'a>(&'a self, platform: &'a dyn Platform) -> SchedLockGuard<'a> {
        let irq = IrqRestore {
            platform,
            flags: platform.irq_save(),
        };
        SchedLockGuard {
            state: self.state.lock(),
            _irq: irq,
        }
    }
}

struct IrqRestore<'a> {
    platform: &'a dyn Platform,
    flags: IrqFlags,
}

impl Drop for IrqRestore<'_> {
    fn drop(&mut self) {
        self.platform.irq_restore(self.flags);
    }
}

/// Held scheduler lock of one CPU
///
/// Dropping it releases the lock first, then restores the saved interrupt
/// state.
pub struct SchedLockGuard<'a> {
    // Field order is drop order
    state: spin::MutexGuard<'a, SchedState>,
    _irq: IrqRestore<'a>,
}

impl Deref for SchedLockGuard<'_> {
    type Target = SchedState;

    fn deref(&self) -> &SchedState {
        &self.state
    }
}

impl DerefMut for SchedLockGuard<'_> {
    fn deref_mut(&mut self) -> &mut SchedState {
        &mut self.state
    }
}
