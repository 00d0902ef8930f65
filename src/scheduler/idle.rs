/*!
 * Idle Loop
 * Body of every CPU's idle thread
 */

use super::control::SchedFlags;
use super::Scheduler;
use crate::core::types::{NotifyMode, PcpuId};
use crate::platform::{CpuLocal, Notifier};
use std::sync::Arc;
use tracing::info;

impl Scheduler {
    /// Enter the calling CPU's idle thread and run the idle loop
    ///
    /// Returns once `request_offline` was issued for the CPU.
    ///
    /// # Panics
    /// If the CPU is not initialised or its idle loop already ran since
    /// `init_sched`.
    pub fn run_idle_thread(&self) {
        let pcpu_id = self.platform.pcpu_id();
        let idle = {
            let state = self.obtain_schedule_lock(pcpu_id);
            state.assert_initialized(pcpu_id);
            match state.idle() {
                Some(idle) => Arc::clone(idle),
                None => panic!("pcpu{} has no idle thread", pcpu_id),
            }
        };

        self.run_thread(&idle);
        self.default_idle(pcpu_id);
    }

    fn default_idle(&self, pcpu_id: PcpuId) {
        let control = self.control(pcpu_id);
        loop {
            if self.need_reschedule(pcpu_id) {
                self.schedule();
            } else if control.test_and_clear(SchedFlags::NEED_OFFLINE) {
                info!(pcpu = pcpu_id, "idle loop leaving for offline");
                return;
            } else {
                self.platform.cpu_do_idle(self.config.idle_mode);
            }
        }
    }

    /// Ask `pcpu_id`'s idle loop to return
    pub fn request_offline(&self, pcpu_id: PcpuId) {
        self.control(pcpu_id).set_flag(SchedFlags::NEED_OFFLINE);
        if pcpu_id != self.platform.pcpu_id() {
            self.platform.kick_pcpu(pcpu_id, NotifyMode::Ipi);
        }
    }
}
