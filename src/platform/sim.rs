/*!
 * Simulation Platform
 *
 * Hosted implementation of every platform trait, used by the test suite and
 * the `hvsched-sim` binary:
 * - CPU identity is bound per OS thread with `SimPlatform::bind_cpu`
 * - The clock only moves when told to
 * - Context switches are recorded instead of performed
 * - HLT parks the OS thread until the CPU is kicked
 * - Armed timers are kept in a table and fired explicitly
 */

use super::traits::{Clock, ContextSwitch, CpuLocal, HostStack, IrqFlags, Notifier, TickTimer};
use crate::core::types::{IdleMode, NotifyMode, PcpuId, Ticks};
use crate::scheduler::Scheduler;
use parking_lot::{Condvar, Mutex};
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::trace;

thread_local! {
    static CURRENT_PCPU: Cell<PcpuId> = const { Cell::new(0) };
}

/// Default simulated clock rate (1 tick per microsecond)
pub const SIM_TICKS_PER_MS: u64 = 1_000;

/// Longest time a simulated HLT parks before re-checking
const HALT_SLICE: Duration = Duration::from_millis(5);

/// One recorded call to the switch boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchRecord {
    pub pcpu_id: PcpuId,
    pub prev_sp: usize,
    pub next_sp: usize,
}

#[derive(Default)]
struct SimCpu {
    irqs_enabled: AtomicBool,
    ipi_kicks: AtomicU64,
    init_kicks: AtomicU64,
    idle_waits: AtomicU64,
    timer_period: Mutex<Option<Ticks>>,
    wakeup: Mutex<bool>,
    wakeup_cv: Condvar,
}

/// Simulated multi-CPU platform
pub struct SimPlatform {
    cpus: Box<[SimCpu]>,
    clock: AtomicU64,
    ticks_per_ms: u64,
    switches: Mutex<Vec<SwitchRecord>>,
}

impl SimPlatform {
    /// Create a platform with `nr_pcpus` CPUs
    pub fn new(nr_pcpus: usize) -> Self {
        Self::with_clock_rate(nr_pcpus, SIM_TICKS_PER_MS)
    }

    pub fn with_clock_rate(nr_pcpus: usize, ticks_per_ms: u64) -> Self {
        let cpus = (0..nr_pcpus)
            .map(|_| SimCpu {
                irqs_enabled: AtomicBool::new(true),
                ..SimCpu::default()
            })
            .collect();
        Self {
            cpus,
            clock: AtomicU64::new(0),
            ticks_per_ms,
            switches: Mutex::new(Vec::new()),
        }
    }

    /// Make the calling OS thread act as `pcpu_id`
    pub fn bind_cpu(pcpu_id: PcpuId) {
        CURRENT_PCPU.with(|cpu| cpu.set(pcpu_id));
    }

    fn cpu(&self, pcpu_id: PcpuId) -> &SimCpu {
        &self.cpus[usize::from(pcpu_id)]
    }

    /// Move the clock forward
    pub fn advance(&self, ticks: Ticks) {
        self.clock.fetch_add(ticks, Ordering::SeqCst);
    }

    pub fn advance_ms(&self, ms: u64) {
        self.advance(ms * self.ticks_per_ms);
    }

    /// Deliver one timer expiry to `pcpu_id` if its tick is armed
    ///
    /// Returns whether the tick was delivered.
    pub fn fire_tick(&self, sched: &Scheduler, pcpu_id: PcpuId) -> bool {
        if self.armed_period(pcpu_id).is_none() {
            return false;
        }
        sched.tick(pcpu_id);
        true
    }

    /// Period of the armed tick on `pcpu_id`, if any
    pub fn armed_period(&self, pcpu_id: PcpuId) -> Option<Ticks> {
        *self.cpu(pcpu_id).timer_period.lock()
    }

    /// IPI plus INIT kicks received by `pcpu_id`
    pub fn kicks(&self, pcpu_id: PcpuId) -> u64 {
        let cpu = self.cpu(pcpu_id);
        cpu.ipi_kicks.load(Ordering::SeqCst) + cpu.init_kicks.load(Ordering::SeqCst)
    }

    pub fn init_kicks(&self, pcpu_id: PcpuId) -> u64 {
        self.cpu(pcpu_id).init_kicks.load(Ordering::SeqCst)
    }

    /// Number of times `pcpu_id` entered its idle wait
    pub fn idle_waits(&self, pcpu_id: PcpuId) -> u64 {
        self.cpu(pcpu_id).idle_waits.load(Ordering::SeqCst)
    }

    pub fn irqs_enabled(&self, pcpu_id: PcpuId) -> bool {
        self.cpu(pcpu_id).irqs_enabled.load(Ordering::SeqCst)
    }

    /// All switches recorded so far
    pub fn switches(&self) -> Vec<SwitchRecord> {
        self.switches.lock().clone()
    }

    /// Switches recorded for one CPU
    pub fn switches_on(&self, pcpu_id: PcpuId) -> Vec<SwitchRecord> {
        self.switches
            .lock()
            .iter()
            .filter(|record| record.pcpu_id == pcpu_id)
            .copied()
            .collect()
    }
}

impl CpuLocal for SimPlatform {
    fn pcpu_id(&self) -> PcpuId {
        CURRENT_PCPU.with(|cpu| cpu.get())
    }

    fn irq_save(&self) -> IrqFlags {
        let was_enabled = self.cpu(self.pcpu_id()).irqs_enabled.swap(false, Ordering::SeqCst);
        IrqFlags(u64::from(was_enabled))
    }

    fn irq_restore(&self, flags: IrqFlags) {
        self.cpu(self.pcpu_id())
            .irqs_enabled
            .store(flags.0 != 0, Ordering::SeqCst);
    }

    fn cpu_do_idle(&self, mode: IdleMode) {
        let cpu = self.cpu(self.pcpu_id());
        cpu.idle_waits.fetch_add(1, Ordering::SeqCst);
        match mode {
            IdleMode::Pause => {
                std::hint::spin_loop();
                std::thread::yield_now();
            }
            IdleMode::Halt => {
                let mut woken = cpu.wakeup.lock();
                if !*woken {
                    cpu.wakeup_cv.wait_for(&mut woken, HALT_SLICE);
                }
                *woken = false;
            }
        }
    }

    fn cpu_relax(&self) {
        std::hint::spin_loop();
        std::thread::yield_now();
    }
}

impl Clock for SimPlatform {
    fn now(&self) -> Ticks {
        self.clock.load(Ordering::SeqCst)
    }

    fn ticks_per_ms(&self) -> u64 {
        self.ticks_per_ms
    }
}

impl TickTimer for SimPlatform {
    fn arm_tick(&self, pcpu_id: PcpuId, period: Ticks) {
        *self.cpu(pcpu_id).timer_period.lock() = Some(period);
    }

    fn disarm_tick(&self, pcpu_id: PcpuId) {
        *self.cpu(pcpu_id).timer_period.lock() = None;
    }
}

impl Notifier for SimPlatform {
    fn kick_pcpu(&self, pcpu_id: PcpuId, mode: NotifyMode) {
        let cpu = self.cpu(pcpu_id);
        match mode {
            NotifyMode::Ipi => cpu.ipi_kicks.fetch_add(1, Ordering::SeqCst),
            NotifyMode::Init => cpu.init_kicks.fetch_add(1, Ordering::SeqCst),
        };
        *cpu.wakeup.lock() = true;
        cpu.wakeup_cv.notify_all();
        trace!(pcpu = pcpu_id, ?mode, "kick delivered");
    }
}

impl ContextSwitch for SimPlatform {
    unsafe fn switch_to(&self, prev: &HostStack, next: &HostStack) {
        self.switches.lock().push(SwitchRecord {
            pcpu_id: self.pcpu_id(),
            prev_sp: prev.get(),
            next_sp: next.get(),
        });
    }
}
