/*!
 * Dispatch Engine
 *
 * Policy-agnostic driver of thread status transitions. Every operation
 * takes the owning CPU's lock, consults the bound policy, and updates
 * status and request flags. Only `schedule()` crosses into the raw
 * context switch, and only after the lock is gone.
 */

use super::control::SchedFlags;
use super::Scheduler;
use crate::core::types::{NotifyMode, PcpuId};
use crate::platform::{ContextSwitch, CpuLocal, Notifier};
use crate::thread::{ThreadObject, ThreadStatus};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, trace};

impl Scheduler {
    /// Re-evaluate the calling CPU if a reschedule is pending
    ///
    /// Called from the idle loop and the interrupt/VM-exit return path.
    /// Consumes `NEED_RESCHEDULE`, asks the policy for the next thread and
    /// hands off to it when it differs from the current one.
    ///
    /// # Panics
    /// If the calling CPU is not initialised, or the policy picks a
    /// blocked thread.
    pub fn schedule(&self) {
        let pcpu_id = self.platform.pcpu_id();
        let control = self.control(pcpu_id);
        let mut state = self.lock_control(control);
        state.assert_initialized(pcpu_id);

        if !control.test_and_clear(SchedFlags::NEED_RESCHEDULE) {
            return;
        }

        let picked = state.with_policy(pcpu_id, &*self.platform, |policy, ctx| {
            policy.pick_next(ctx)
        });
        control.stats().inc_picks();

        let next = match picked {
            Some(id) => Arc::clone(state.threads().get(id)),
            None => match state.idle() {
                Some(idle) => Arc::clone(idle),
                None => panic!("pcpu{} has no idle thread", pcpu_id),
            },
        };
        let prev = match state.current() {
            Some(prev) => Arc::clone(prev),
            None => panic!("pcpu{} has no current thread", pcpu_id),
        };
        if Arc::ptr_eq(&prev, &next) {
            return;
        }
        assert!(
            !next.is_blocked(),
            "pcpu{} picked blocked thread {}",
            pcpu_id,
            next
        );

        state.switch(&prev, &next);
        drop(state);
        control.stats().inc_context_switches();
        trace!(pcpu = pcpu_id, prev = %prev, next = %next, "context switch");

        // SAFETY: the lock is released, this is the only switch for this
        // decision, and both threads are registered on the calling CPU.
        unsafe { self.platform.switch_to(prev.host_stack(), next.host_stack()) };
    }

    /// First dispatch of `obj` on the calling CPU
    ///
    /// Lets the policy account for the hand-off, performs the status and
    /// hook hand-off, then runs the entry point on the caller's stack.
    ///
    /// # Panics
    /// If `obj` belongs to another CPU, is not registered, is neither
    /// runnable nor the idle thread, or was already entered.
    pub fn run_thread(&self, obj: &Arc<ThreadObject>) {
        let pcpu_id = self.platform.pcpu_id();
        assert_eq!(
            obj.pcpu_id(),
            pcpu_id,
            "run_thread: {} is not bound to pcpu{}",
            obj,
            pcpu_id
        );

        {
            let control = self.control(pcpu_id);
            let mut state = self.lock_control(control);
            state.assert_initialized(pcpu_id);
            state.assert_registered(obj);
            assert!(
                obj.is_runnable() || obj.is_idle(),
                "run_thread: {} is {:?}",
                obj,
                obj.status()
            );

            let prev = state.current().cloned();
            match prev {
                Some(prev) if !Arc::ptr_eq(&prev, obj) => {
                    state.with_policy(pcpu_id, &*self.platform, |policy, ctx| {
                        policy.dispatched(obj, ctx)
                    });
                    state.switch(&prev, obj);
                    control.stats().inc_context_switches();
                }
                _ => obj.status.store(ThreadStatus::Running),
            }
        }

        debug!(pcpu = pcpu_id, thread = %obj, "thread entered");
        obj.enter();
    }

    /// Take `obj` off its CPU's runqueue
    ///
    /// A thread that is still running is only latched; it blocks on its
    /// next switch-out, which is requested here.
    ///
    /// # Panics
    /// If `obj` is an idle thread or not registered.
    pub fn sleep_thread(&self, obj: &ThreadObject) {
        assert!(!obj.is_idle(), "cannot put idle thread {} to sleep", obj);

        let pcpu_id = obj.pcpu_id();
        let control = self.control(pcpu_id);
        let mut state = self.lock_control(control);
        state.assert_initialized(pcpu_id);
        state.assert_registered(obj);

        if obj.is_blocked() {
            return;
        }

        state.with_policy(pcpu_id, &*self.platform, |policy, ctx| policy.sleep(obj, ctx));
        if obj.is_running() {
            obj.be_blocking.store(true, Ordering::Release);
            self.make_reschedule_request_with(pcpu_id, obj.notify_mode());
        } else {
            obj.status.store(ThreadStatus::Blocked);
        }
        control.stats().inc_sleeps();
        trace!(pcpu = pcpu_id, thread = %obj, latched = obj.is_blocking(), "sleep");
    }

    /// `sleep_thread`, then wait until `obj` is actually BLOCKED
    ///
    /// # Panics
    /// If `obj` is running on the calling CPU, which would wait forever.
    pub fn sleep_thread_sync(&self, obj: &ThreadObject) {
        assert!(
            !(obj.pcpu_id() == self.platform.pcpu_id() && obj.is_running()),
            "sleep_thread_sync: {} would wait on itself",
            obj
        );

        self.sleep_thread(obj);
        while !obj.is_blocked() {
            self.platform.cpu_relax();
        }
    }

    /// Make `obj` eligible again
    ///
    /// Only acts on blocked or latched threads; waking anything else is a
    /// no-op. A cross-CPU wake kicks the owning CPU when the policy asks
    /// for a re-evaluation.
    ///
    /// # Panics
    /// If `obj` is not registered.
    pub fn wake_thread(&self, obj: &ThreadObject) {
        let pcpu_id = obj.pcpu_id();
        let control = self.control(pcpu_id);
        let mut state = self.lock_control(control);
        state.assert_initialized(pcpu_id);
        state.assert_registered(obj);

        let was_blocked = obj.is_blocked();
        if !was_blocked && !obj.is_blocking() {
            return;
        }

        let resched = state.with_policy(pcpu_id, &*self.platform, |policy, ctx| {
            policy.wake(obj, ctx)
        });
        if was_blocked {
            obj.status.store(ThreadStatus::Runnable);
            if resched {
                self.make_reschedule_request_with(pcpu_id, obj.notify_mode());
            }
        }
        obj.be_blocking.store(false, Ordering::Release);
        control.stats().inc_wakes();
        trace!(pcpu = pcpu_id, thread = %obj, was_blocked, resched, "wake");
    }

    /// Give up the rest of the current thread's turn on the calling CPU
    pub fn yield_current(&self) {
        let pcpu_id = self.platform.pcpu_id();
        let control = self.control(pcpu_id);
        {
            let mut state = self.lock_control(control);
            state.assert_initialized(pcpu_id);
            state.with_policy(pcpu_id, &*self.platform, |policy, ctx| {
                policy.yield_current(ctx)
            });
        }
        control.stats().inc_yields();
        self.make_reschedule_request(pcpu_id);
    }

    /// Raise `obj`'s standing with its CPU's policy
    ///
    /// Takes effect on the next pick; no reschedule is forced.
    pub fn prioritize_thread(&self, obj: &ThreadObject) {
        let pcpu_id = obj.pcpu_id();
        let mut state = self.obtain_schedule_lock(pcpu_id);
        state.assert_initialized(pcpu_id);
        state.assert_registered(obj);
        state.with_policy(pcpu_id, &*self.platform, |policy, ctx| {
            policy.prioritize(obj, ctx)
        });
    }

    /// Timer expiry on `pcpu_id`, called in interrupt context
    ///
    /// Ignored while the CPU is suspended or not initialised.
    pub fn tick(&self, pcpu_id: PcpuId) {
        let control = self.control(pcpu_id);
        let resched = {
            let mut state = self.lock_control(control);
            if !state.is_initialized() || state.is_suspended() {
                return;
            }
            control.stats().inc_ticks();
            state.with_policy(pcpu_id, &*self.platform, |policy, ctx| policy.tick(ctx))
        };

        if resched {
            self.make_reschedule_request(pcpu_id);
        }
    }

    /// Ask `pcpu_id` to re-evaluate at its next scheduling point
    #[inline]
    pub fn make_reschedule_request(&self, pcpu_id: PcpuId) {
        self.make_reschedule_request_with(pcpu_id, NotifyMode::Ipi);
    }

    /// Set the request flag; a remote CPU is kicked with `mode`
    pub(crate) fn make_reschedule_request_with(&self, pcpu_id: PcpuId, mode: NotifyMode) {
        let control = self.control(pcpu_id);
        control.set_flag(SchedFlags::NEED_RESCHEDULE);
        control.stats().inc_reschedule_requests();

        if pcpu_id != self.platform.pcpu_id() {
            self.platform.kick_pcpu(pcpu_id, mode);
            control.stats().inc_remote_kicks();
        }
    }

    /// Whether a reschedule is pending on `pcpu_id`
    #[inline]
    pub fn need_reschedule(&self, pcpu_id: PcpuId) -> bool {
        self.control(pcpu_id).test_flag(SchedFlags::NEED_RESCHEDULE)
    }
}
