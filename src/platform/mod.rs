/*!
 * Platform Module
 * Boundary between the scheduling core and architecture, timer and IPI code
 */

pub mod sim;
pub mod traits;

pub use sim::{SimPlatform, SwitchRecord};
pub use traits::{
    Clock, ContextSwitch, CpuLocal, HostStack, IrqFlags, Notifier, Platform, TickTimer,
};
