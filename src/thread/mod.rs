/*!
 * Thread Object
 *
 * The schedulable unit. A thread object is bound to one physical CPU for its
 * whole life; the payload owner (VCPU layer, idle loop) supplies the entry
 * point and switch hooks, and the policy active on that CPU owns the
 * scheduling data block.
 */

mod status;

pub use status::ThreadStatus;
pub(crate) use status::AtomicStatus;

use crate::core::types::{NotifyMode, PcpuId, ThreadId, THREAD_NAME_LEN};
use crate::platform::HostStack;
use crate::scheduler::policy::SchedData;
use parking_lot::{Mutex, MutexGuard};
use smartstring::alias::String as InlineString;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Entry point, run once on the first dispatch
pub type ThreadEntry = Arc<dyn Fn(&Arc<ThreadObject>) + Send + Sync>;

/// Hook run right before (`switch_out`) or after (`switch_in`) a switch
pub type SwitchHook = Arc<dyn Fn(&ThreadObject) + Send + Sync>;

/// Schedulable execution context
pub struct ThreadObject {
    id: ThreadId,
    name: InlineString,
    pcpu_id: PcpuId,
    is_idle: bool,
    notify_mode: NotifyMode,
    pub(crate) status: AtomicStatus,
    /// Sleep requested while the thread was still current
    pub(crate) be_blocking: AtomicBool,
    started: AtomicBool,
    host_sp: HostStack,
    entry: Option<ThreadEntry>,
    switch_out: Option<SwitchHook>,
    switch_in: Option<SwitchHook>,
    data: Mutex<SchedData>,
}

impl ThreadObject {
    /// Start building a thread bound to `pcpu_id`
    pub fn builder(name: &str, pcpu_id: PcpuId) -> ThreadBuilder {
        ThreadBuilder::new(name, pcpu_id)
    }

    #[inline]
    pub fn id(&self) -> ThreadId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// CPU this thread is permanently bound to
    #[inline]
    pub fn pcpu_id(&self) -> PcpuId {
        self.pcpu_id
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        self.is_idle
    }

    #[inline]
    pub fn notify_mode(&self) -> NotifyMode {
        self.notify_mode
    }

    /// Current status (lock-free read)
    #[inline]
    pub fn status(&self) -> ThreadStatus {
        self.status.load()
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.status() == ThreadStatus::Running
    }

    #[inline]
    pub fn is_runnable(&self) -> bool {
        self.status() == ThreadStatus::Runnable
    }

    #[inline]
    pub fn is_blocked(&self) -> bool {
        self.status() == ThreadStatus::Blocked
    }

    /// Whether a sleep is latched until the next switch-out
    #[inline]
    pub fn is_blocking(&self) -> bool {
        self.be_blocking.load(Ordering::Acquire)
    }

    /// Handle to the saved execution context
    #[inline]
    pub fn host_stack(&self) -> &HostStack {
        &self.host_sp
    }

    /// Whether the entry point has been invoked
    #[inline]
    pub fn has_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Run the entry point; the initial frame built by the payload owner
    /// lands here on a thread's first dispatch
    ///
    /// # Panics
    /// If the thread was already entered.
    pub fn enter(self: &Arc<Self>) {
        assert!(
            !self.started.swap(true, Ordering::AcqRel),
            "thread {} entered twice",
            self
        );
        if let Some(entry) = &self.entry {
            entry(self);
        }
    }

    pub(crate) fn run_switch_out(&self) {
        if let Some(hook) = &self.switch_out {
            hook(self);
        }
    }

    pub(crate) fn run_switch_in(&self) {
        if let Some(hook) = &self.switch_in {
            hook(self);
        }
    }

    /// Policy data block; caller holds the owning CPU's scheduler lock
    pub(crate) fn data(&self) -> MutexGuard<'_, SchedData> {
        self.data.lock()
    }
}

impl fmt::Display for ThreadObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}@pcpu{}", self.name, self.id, self.pcpu_id)
    }
}

impl fmt::Debug for ThreadObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadObject")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("pcpu_id", &self.pcpu_id)
            .field("status", &self.status())
            .field("be_blocking", &self.is_blocking())
            .field("is_idle", &self.is_idle)
            .finish()
    }
}

/// Builder for thread objects
pub struct ThreadBuilder {
    name: InlineString,
    pcpu_id: PcpuId,
    is_idle: bool,
    notify_mode: NotifyMode,
    stack: usize,
    entry: Option<ThreadEntry>,
    switch_out: Option<SwitchHook>,
    switch_in: Option<SwitchHook>,
}

impl ThreadBuilder {
    fn new(name: &str, pcpu_id: PcpuId) -> Self {
        Self {
            name: truncate_name(name),
            pcpu_id,
            is_idle: false,
            notify_mode: NotifyMode::default(),
            stack: 0,
            entry: None,
            switch_out: None,
            switch_in: None,
        }
    }

    pub fn entry<F>(mut self, entry: F) -> Self
    where
        F: Fn(&Arc<ThreadObject>) + Send + Sync + 'static,
    {
        self.entry = Some(Arc::new(entry));
        self
    }

    pub fn switch_out<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ThreadObject) + Send + Sync + 'static,
    {
        self.switch_out = Some(Arc::new(hook));
        self
    }

    pub fn switch_in<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ThreadObject) + Send + Sync + 'static,
    {
        self.switch_in = Some(Arc::new(hook));
        self
    }

    pub fn notify_mode(mut self, mode: NotifyMode) -> Self {
        self.notify_mode = mode;
        self
    }

    /// Initial saved stack pointer, prepared by the payload owner
    pub fn stack(mut self, sp: usize) -> Self {
        self.stack = sp;
        self
    }

    pub(crate) fn idle(mut self) -> Self {
        self.is_idle = true;
        self
    }

    pub fn build(self) -> Arc<ThreadObject> {
        Arc::new(ThreadObject {
            id: ThreadId::allocate(),
            name: self.name,
            pcpu_id: self.pcpu_id,
            is_idle: self.is_idle,
            notify_mode: self.notify_mode,
            status: AtomicStatus::new(ThreadStatus::Blocked),
            be_blocking: AtomicBool::new(false),
            started: AtomicBool::new(false),
            host_sp: HostStack::new(self.stack),
            entry: self.entry,
            switch_out: self.switch_out,
            switch_in: self.switch_in,
            data: Mutex::new(SchedData::Unset),
        })
    }
}

/// Clamp to the diagnostic label length on a char boundary
fn truncate_name(name: &str) -> InlineString {
    let mut end = name.len().min(THREAD_NAME_LEN - 1);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    InlineString::from(&name[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_new_thread_is_blocked() {
        let obj = ThreadObject::builder("vcpu0", 1).stack(0x8000).build();
        assert_eq!(obj.status(), ThreadStatus::Blocked);
        assert_eq!(obj.pcpu_id(), 1);
        assert_eq!(obj.host_stack().get(), 0x8000);
        assert!(!obj.is_idle());
        assert!(!obj.has_started());
    }

    #[test]
    fn test_name_is_truncated() {
        let obj = ThreadObject::builder("a-very-long-thread-name", 0).build();
        assert_eq!(obj.name().len(), THREAD_NAME_LEN - 1);

        let utf8 = ThreadObject::builder("vcpu-ééééééééé", 0).build();
        assert!(utf8.name().len() < THREAD_NAME_LEN);
    }

    #[test]
    fn test_enter_runs_entry_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let obj = ThreadObject::builder("vcpu0", 0)
            .entry(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .build();

        obj.enter();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(obj.has_started());
    }

    #[test]
    #[should_panic(expected = "entered twice")]
    fn test_enter_twice_panics() {
        let obj = ThreadObject::builder("vcpu0", 0).build();
        obj.enter();
        obj.enter();
    }

    #[test]
    fn test_hooks_receive_thread() {
        let seen = Arc::new(AtomicUsize::new(0));
        let out_seen = Arc::clone(&seen);
        let in_seen = Arc::clone(&seen);
        let obj = ThreadObject::builder("vcpu0", 0)
            .switch_out(move |_| {
                out_seen.fetch_add(1, Ordering::SeqCst);
            })
            .switch_in(move |_| {
                in_seen.fetch_add(10, Ordering::SeqCst);
            })
            .build();

        obj.run_switch_out();
        obj.run_switch_in();
        assert_eq!(seen.load(Ordering::SeqCst), 11);
    }
}
