/*!
 * Platform Traits
 * Interface definitions for the collaborators the scheduling core drives
 */

use crate::core::types::{IdleMode, NotifyMode, PcpuId, Ticks};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Saved local interrupt state returned by `irq_save`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrqFlags(pub u64);

/// Saved stack pointer of a suspended execution context
///
/// Written by the switch boundary only while its thread is not running.
#[derive(Debug, Default)]
pub struct HostStack(AtomicUsize);

impl HostStack {
    pub const fn new(sp: usize) -> Self {
        Self(AtomicUsize::new(sp))
    }

    #[inline]
    pub fn get(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set(&self, sp: usize) {
        self.0.store(sp, Ordering::Release);
    }
}

/// Operations on the calling physical CPU
pub trait CpuLocal: Send + Sync {
    /// Identity of the CPU executing the caller
    fn pcpu_id(&self) -> PcpuId;

    /// Mask local interrupts, returning the previous state
    fn irq_save(&self) -> IrqFlags;

    /// Restore a state returned by `irq_save`
    fn irq_restore(&self, flags: IrqFlags);

    /// Wait for the next interrupt in the given mode
    fn cpu_do_idle(&self, mode: IdleMode);

    /// Busy-wait hint
    fn cpu_relax(&self) {
        std::hint::spin_loop();
    }
}

/// Monotonic time source
pub trait Clock: Send + Sync {
    /// Current time in ticks
    fn now(&self) -> Ticks;

    /// Clock ticks per millisecond
    fn ticks_per_ms(&self) -> u64;
}

/// Per-CPU periodic timer
///
/// The timer subsystem calls `Scheduler::tick` for the CPU in interrupt
/// context on every expiry.
pub trait TickTimer: Send + Sync {
    /// Arm (or re-arm) the CPU's scheduler tick with the given period
    fn arm_tick(&self, pcpu_id: PcpuId, period: Ticks);

    /// Cancel the CPU's scheduler tick
    fn disarm_tick(&self, pcpu_id: PcpuId);
}

/// Cross-CPU notification
pub trait Notifier: Send + Sync {
    /// Force `pcpu_id` out of guest mode or idle so it re-evaluates scheduling
    fn kick_pcpu(&self, pcpu_id: PcpuId, mode: NotifyMode);
}

/// Architecture context switch
pub trait ContextSwitch: Send + Sync {
    /// Save the running context into `prev` and resume the one in `next`
    ///
    /// Returns when `prev` is switched back in.
    ///
    /// # Safety
    /// Must be called exactly once per switch decision, with the scheduler
    /// lock released, and with both handles belonging to live threads of the
    /// calling CPU.
    unsafe fn switch_to(&self, prev: &HostStack, next: &HostStack);
}

/// Everything the scheduling core needs from the platform
pub trait Platform: CpuLocal + Clock + TickTimer + Notifier + ContextSwitch + Send + Sync {}

// Blanket implementation for any type that implements all component traits
impl<T> Platform for T where T: CpuLocal + Clock + TickTimer + Notifier + ContextSwitch + Send + Sync {}
