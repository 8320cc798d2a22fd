//! `Mutex` and `Event` kernel objects (spec §3 Kernel Object types).
//!
//! Both are plain [`KernelObject`] bodies with no subsystem of their own:
//! grounded in the teacher's spin-based synchronization idiom (the same
//! busy-wait/yield shape `sched::scheduler` already uses), rather than a
//! wait-queue-per-object design, since nothing else in this kernel blocks
//! a thread by parking it off the runnable queue.

use core::sync::atomic::{AtomicBool, Ordering};

use super::{
    handle::ObjectType,
    object::{KernelObject, ObjectName, ObjectRefCounts},
};

/// A kernel-level mutual-exclusion object. `lock`/`try_lock`/`unlock` are
/// the primitive operations; [`crate::process::wait_on_handle`] drives the
/// spin-and-yield loop used by `OS_MUTEX_ACQUIRE`.
pub struct KernelMutex {
    locked: AtomicBool,
    name: Option<ObjectName>,
    counts: ObjectRefCounts,
}

impl KernelMutex {
    pub fn new(name: Option<ObjectName>) -> Self {
        Self {
            locked: AtomicBool::new(false),
            name,
            counts: ObjectRefCounts::new(),
        }
    }

    /// Attempt to acquire the mutex without blocking.
    pub fn try_lock(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Release a previously acquired mutex.
    pub fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }
}

impl KernelObject for KernelMutex {
    fn object_type(&self) -> ObjectType {
        ObjectType::Mutex
    }

    fn name(&self) -> Option<&ObjectName> {
        self.name.as_ref()
    }

    fn ref_counts(&self) -> &ObjectRefCounts {
        &self.counts
    }

    fn as_any(&self) -> &dyn core::any::Any {
        self
    }
}

/// A kernel-level manual-reset event. Waiters observe [`is_signaled`]
/// through [`crate::process::wait_on_handle`]'s spin-and-yield loop.
pub struct KernelEvent {
    signaled: AtomicBool,
    name: Option<ObjectName>,
    counts: ObjectRefCounts,
}

impl KernelEvent {
    pub fn new(name: Option<ObjectName>) -> Self {
        Self {
            signaled: AtomicBool::new(false),
            name,
            counts: ObjectRefCounts::new(),
        }
    }

    pub fn signal(&self) {
        self.signaled.store(true, Ordering::Release);
    }

    pub fn reset(&self) {
        self.signaled.store(false, Ordering::Release);
    }

    pub fn is_signaled(&self) -> bool {
        self.signaled.load(Ordering::Acquire)
    }
}

impl KernelObject for KernelEvent {
    fn object_type(&self) -> ObjectType {
        ObjectType::Event
    }

    fn name(&self) -> Option<&ObjectName> {
        self.name.as_ref()
    }

    fn ref_counts(&self) -> &ObjectRefCounts {
        &self.counts
    }

    fn as_any(&self) -> &dyn core::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutex_try_lock_is_exclusive() {
        let m = KernelMutex::new(None);
        assert!(m.try_lock());
        assert!(!m.try_lock());
        m.unlock();
        assert!(m.try_lock());
    }

    #[test]
    fn event_starts_unsignaled_and_latches() {
        let e = KernelEvent::new(None);
        assert!(!e.is_signaled());
        e.signal();
        assert!(e.is_signaled());
        e.reset();
        assert!(!e.is_signaled());
    }
}
