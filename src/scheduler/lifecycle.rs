/*!
 * Scheduler Lifecycle
 * CPU bring-up and teardown, power transitions, thread registration
 */

use super::policy::{Policy, SchedData};
use super::types::{SchedParams, SchedulerKind};
use super::Scheduler;
use crate::core::types::PcpuId;
use crate::platform::{Clock, CpuLocal};
use crate::thread::{ThreadObject, ThreadStatus};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info};

impl Scheduler {
    /// Bring up `pcpu_id` with the configured policy
    ///
    /// # Panics
    /// If the CPU is already initialised.
    pub fn init_sched(&self, pcpu_id: PcpuId) {
        self.init_sched_with(pcpu_id, self.config.policy);
    }

    /// Bring up `pcpu_id` with an explicit policy
    ///
    /// Creates the CPU's idle thread and makes it current.
    ///
    /// # Panics
    /// If the CPU is already initialised.
    pub fn init_sched_with(&self, pcpu_id: PcpuId, kind: SchedulerKind) {
        let control = self.control(pcpu_id);
        let mut state = self.lock_control(control);
        assert!(
            !state.is_initialized(),
            "pcpu{} scheduler initialized twice",
            pcpu_id
        );

        let idle = ThreadObject::builder(&format!("idle{}", pcpu_id), pcpu_id)
            .idle()
            .build();
        let policy = Policy::new(kind, &self.config, self.platform.ticks_per_ms());

        control.clear_flags();
        control.stats().reset();
        state.bring_up(idle, policy);
        state.with_policy(pcpu_id, &*self.platform, |policy, ctx| policy.init(ctx));

        info!(pcpu = pcpu_id, policy = kind.as_str(), "scheduler initialized");
    }

    /// Tear down `pcpu_id` when it goes offline
    ///
    /// Releases the policy and forgets every thread registered on the CPU.
    ///
    /// # Panics
    /// If the CPU is not initialised.
    pub fn deinit_sched(&self, pcpu_id: PcpuId) {
        let control = self.control(pcpu_id);
        let mut state = self.lock_control(control);
        state.assert_initialized(pcpu_id);

        state.with_policy(pcpu_id, &*self.platform, |policy, ctx| policy.deinit(ctx));
        let dropped = state.threads().len().saturating_sub(1);
        state.tear_down();
        control.clear_flags();

        info!(pcpu = pcpu_id, dropped, "scheduler deinitialized");
    }

    /// Stop the calling CPU's policy timers ahead of a power transition
    ///
    /// Queue contents are kept; ticks are ignored until `resume_sched`.
    pub fn suspend_sched(&self) {
        let pcpu_id = self.platform.pcpu_id();
        let mut state = self.obtain_schedule_lock(pcpu_id);
        state.assert_initialized(pcpu_id);

        state.set_suspended(true);
        state.with_policy(pcpu_id, &*self.platform, |policy, ctx| policy.suspend(ctx));
        info!(pcpu = pcpu_id, "scheduler suspended");
    }

    /// Restart the calling CPU's policy timers and re-evaluate
    pub fn resume_sched(&self) {
        let pcpu_id = self.platform.pcpu_id();
        {
            let mut state = self.obtain_schedule_lock(pcpu_id);
            state.assert_initialized(pcpu_id);

            state.set_suspended(false);
            state.with_policy(pcpu_id, &*self.platform, |policy, ctx| policy.resume(ctx));
        }
        self.make_reschedule_request(pcpu_id);
        info!(pcpu = pcpu_id, "scheduler resumed");
    }

    /// Register `obj` with its CPU and seed its policy data
    ///
    /// The thread starts BLOCKED; `wake_thread` makes it eligible.
    ///
    /// # Panics
    /// If the CPU is not initialised, `obj` is an idle thread or already
    /// registered, or `params` are invalid.
    pub fn init_thread_data(&self, obj: &Arc<ThreadObject>, params: &SchedParams) {
        assert!(!obj.is_idle(), "idle thread {} has no policy data", obj);
        if let Err(err) = params.validate() {
            panic!("invalid scheduling parameters for {}: {}", obj, err);
        }

        let pcpu_id = obj.pcpu_id();
        let mut state = self.obtain_schedule_lock(pcpu_id);
        state.assert_initialized(pcpu_id);
        assert!(
            !state.threads().contains(obj.id()),
            "thread {} registered twice",
            obj
        );

        let data = state.with_policy(pcpu_id, &*self.platform, |policy, _ctx| {
            policy.init_data(obj, params)
        });
        *obj.data() = data;
        obj.status.store(ThreadStatus::Blocked);
        obj.be_blocking.store(false, Ordering::Release);
        state.register(Arc::clone(obj));

        debug!(pcpu = pcpu_id, thread = %obj, ?params, "thread registered");
    }

    /// Unregister a BLOCKED thread from its CPU
    ///
    /// # Panics
    /// If `obj` is not registered, not BLOCKED, or still current.
    pub fn deinit_thread_data(&self, obj: &ThreadObject) {
        let pcpu_id = obj.pcpu_id();
        let mut state = self.obtain_schedule_lock(pcpu_id);
        state.assert_initialized(pcpu_id);
        state.assert_registered(obj);
        assert!(
            obj.is_blocked() && !state.is_current(obj),
            "cannot deinit {} while it is {:?}",
            obj,
            obj.status()
        );

        state.with_policy(pcpu_id, &*self.platform, |policy, _ctx| {
            policy.deinit_data(obj)
        });
        *obj.data() = SchedData::Unset;
        state.unregister(obj);

        debug!(pcpu = pcpu_id, thread = %obj, "thread unregistered");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::SchedConfig;
    use crate::platform::{Platform, SimPlatform};
    use crate::scheduler::ThreadPriority;

    fn scheduler(kind: SchedulerKind) -> (Arc<SimPlatform>, Scheduler) {
        SimPlatform::bind_cpu(0);
        let platform = Arc::new(SimPlatform::new(1));
        let dyn_platform: Arc<dyn Platform> = platform.clone();
        let sched = Scheduler::new(SchedConfig::new(kind, 1), dyn_platform).unwrap();
        (platform, sched)
    }

    #[test]
    fn test_init_creates_running_idle_thread() {
        let (platform, sched) = scheduler(SchedulerKind::Iorr);
        sched.init_sched(0);

        let idle = sched.idle_thread(0).unwrap();
        assert!(idle.is_idle());
        assert_eq!(idle.name(), "idle0");
        assert_eq!(idle.status(), ThreadStatus::Running);
        assert_eq!(sched.sched_get_current(0).unwrap().id(), idle.id());
        assert_eq!(sched.policy_kind(0), Some(SchedulerKind::Iorr));
        assert_eq!(platform.armed_period(0), Some(10 * 1_000));
    }

    #[test]
    #[should_panic(expected = "initialized twice")]
    fn test_double_init_panics() {
        let (_platform, sched) = scheduler(SchedulerKind::Noop);
        sched.init_sched(0);
        sched.init_sched(0);
    }

    #[test]
    fn test_deinit_releases_timer_and_threads() {
        let (platform, sched) = scheduler(SchedulerKind::Bvt);
        sched.init_sched(0);
        assert_eq!(platform.armed_period(0), Some(1_000));

        let obj = ThreadObject::builder("vcpu0", 0).build();
        sched.init_thread_data(&obj, &SchedParams::default());
        sched.deinit_sched(0);

        assert_eq!(platform.armed_period(0), None);
        assert!(sched.policy_kind(0).is_none());
        assert!(matches!(*obj.data(), SchedData::Unset));

        // The CPU can come back with another policy
        sched.init_sched_with(0, SchedulerKind::Prio);
        assert_eq!(sched.policy_kind(0), Some(SchedulerKind::Prio));
    }

    #[test]
    fn test_thread_data_matches_policy() {
        let (_platform, sched) = scheduler(SchedulerKind::Prio);
        sched.init_sched(0);

        let obj = ThreadObject::builder("vcpu0", 0).build();
        sched.init_thread_data(&obj, &SchedParams::with_prio(ThreadPriority::High));
        assert_eq!(obj.data().prio().prio, ThreadPriority::High);
        assert!(obj.is_blocked());

        sched.deinit_thread_data(&obj);
        assert!(matches!(*obj.data(), SchedData::Unset));
        assert!(sched.runqueue(0).is_empty());
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn test_double_registration_panics() {
        let (_platform, sched) = scheduler(SchedulerKind::Iorr);
        sched.init_sched(0);
        let obj = ThreadObject::builder("vcpu0", 0).build();
        sched.init_thread_data(&obj, &SchedParams::default());
        sched.init_thread_data(&obj, &SchedParams::default());
    }

    #[test]
    #[should_panic(expected = "invalid scheduling parameters")]
    fn test_invalid_params_panic() {
        let (_platform, sched) = scheduler(SchedulerKind::Bvt);
        sched.init_sched(0);
        let obj = ThreadObject::builder("vcpu0", 0).build();
        sched.init_thread_data(&obj, &SchedParams::with_weight(0));
    }

    #[test]
    #[should_panic(expected = "cannot deinit")]
    fn test_deinit_runnable_thread_panics() {
        let (_platform, sched) = scheduler(SchedulerKind::Iorr);
        sched.init_sched(0);
        let obj = ThreadObject::builder("vcpu0", 0).build();
        sched.init_thread_data(&obj, &SchedParams::default());
        sched.wake_thread(&obj);
        sched.deinit_thread_data(&obj);
    }

    #[test]
    #[should_panic(expected = "not initialized")]
    fn test_register_on_uninitialized_cpu_panics() {
        let (_platform, sched) = scheduler(SchedulerKind::Iorr);
        let obj = ThreadObject::builder("vcpu0", 0).build();
        sched.init_thread_data(&obj, &SchedParams::default());
    }

    #[test]
    fn test_suspend_keeps_queue() {
        let (platform, sched) = scheduler(SchedulerKind::Iorr);
        sched.init_sched(0);
        let obj = ThreadObject::builder("vcpu0", 0).build();
        sched.init_thread_data(&obj, &SchedParams::default());
        sched.wake_thread(&obj);

        sched.suspend_sched();
        assert_eq!(platform.armed_period(0), None);
        assert_eq!(sched.runqueue(0), vec![obj.id()]);

        sched.resume_sched();
        assert!(platform.armed_period(0).is_some());
        assert!(sched.need_reschedule(0));
    }
}
