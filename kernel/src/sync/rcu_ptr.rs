//! RCU-guarded shared pointers.
//!
//! `RcuShared<T>` is an `Arc`-shaped handle whose control block release path
//! goes through the RCU domain (`super::rcu`) instead of an immediate
//! synchronous free. Readers dereference without taking any lock, paying
//! only the cost of an RCU read-side critical section; writers drop the
//! last strong or weak reference and let the next grace period reclaim the
//! storage.
//!
//! The release path is grounded on the joint strong/weak encoding used by
//! the reference implementation's `RcuReleaseStrong`/`RcuReleaseWeak`: a
//! single CAS on the combined refcount reports, in one step, whether this
//! release was the last strong reference, the last weak reference, or both
//! at once (a weak count of exactly one dropping to zero alongside the
//! final strong release). Reporting both in one step means the control
//! block is retired exactly once even when both counts hit zero together.

use alloc::boxed::Box;
use core::{
    marker::PhantomData,
    ops::Deref,
    ptr::NonNull,
    sync::atomic::{AtomicUsize, Ordering},
};

use super::rcu::{call_rcu, rcu_read_lock, rcu_read_unlock};

/// One-word encoding of "what just hit zero" returned by a joint release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct JointCount {
    bits: u8,
}

impl JointCount {
    const NONE: u8 = 0;
    const STRONG: u8 = 1 << 0;
    const WEAK: u8 = 1 << 1;

    fn strong_hit_zero(self) -> bool {
        self.bits & Self::STRONG != 0
    }

    fn weak_hit_zero(self) -> bool {
        self.bits & Self::WEAK != 0
    }
}

/// Packs strong and weak counts into one `AtomicUsize` so both can be
/// decremented and tested for zero in a single atomic op.
struct JointRefCount {
    /// High half: strong count. Low half: weak count. Each half is
    /// `usize::BITS / 2` wide, ample headroom for a kernel object's
    /// reference count.
    packed: AtomicUsize,
}

const HALF_BITS: u32 = usize::BITS / 2;
const HALF_MASK: usize = (1 << HALF_BITS) - 1;

impl JointRefCount {
    fn new() -> Self {
        // One strong, one weak (the weak implied by the strong, per the
        // Arc convention of a single "weak from strong" reference).
        Self {
            packed: AtomicUsize::new((1 << HALF_BITS) | 1),
        }
    }

    fn strong(&self) -> usize {
        self.packed.load(Ordering::Relaxed) >> HALF_BITS
    }

    fn weak(&self) -> usize {
        self.packed.load(Ordering::Relaxed) & HALF_MASK
    }

    fn strong_retain(&self) -> bool {
        let prev = self.packed.fetch_add(1 << HALF_BITS, Ordering::Relaxed);
        (prev >> HALF_BITS) > 0
    }

    /// Atomic compare-increment: bump the strong count only if it is
    /// currently nonzero. Used by [`RcuWeak::upgrade`], where an
    /// unconditional fetch-add-then-undo would let a concurrent upgrade
    /// observe the transient nonzero count and wrongly resurrect a value
    /// whose last strong reference has already been retired.
    fn try_strong_retain(&self) -> bool {
        let mut cur = self.packed.load(Ordering::Relaxed);
        loop {
            if (cur >> HALF_BITS) == 0 {
                return false;
            }
            match self.packed.compare_exchange_weak(
                cur,
                cur + (1 << HALF_BITS),
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => cur = actual,
            }
        }
    }

    fn weak_retain(&self) -> bool {
        let prev = self.packed.fetch_add(1, Ordering::Relaxed);
        (prev & HALF_MASK) > 0
    }

    /// Release one strong reference. Returns which count(s) hit zero.
    fn strong_release(&self) -> JointCount {
        let prev = self.packed.fetch_sub(1 << HALF_BITS, Ordering::Release);
        let prev_strong = prev >> HALF_BITS;
        let weak = prev & HALF_MASK;
        let mut bits = JointCount::NONE;
        if prev_strong == 1 {
            bits |= JointCount::STRONG;
            // The strong side holds one implicit weak reference; dropping
            // the last strong reference releases it too.
            let prev2 = self.packed.fetch_sub(1, Ordering::Release);
            if (prev2 & HALF_MASK) == 1 {
                bits |= JointCount::WEAK;
            }
        }
        let _ = weak;
        JointCount { bits }
    }

    fn weak_release(&self) -> bool {
        let prev = self.packed.fetch_sub(1, Ordering::Release);
        (prev & HALF_MASK) == 1
    }
}

struct ControlBlock<T> {
    count: JointRefCount,
    value: T,
}

/// A strong, RCU-reclaimed shared pointer.
pub struct RcuShared<T: Send + Sync + 'static> {
    inner: NonNull<ControlBlock<T>>,
    _marker: PhantomData<ControlBlock<T>>,
}

unsafe impl<T: Send + Sync> Send for RcuShared<T> {}
unsafe impl<T: Send + Sync> Sync for RcuShared<T> {}

/// A weak reference; does not keep `T` alive, only the control block's
/// storage, and only while the count has not yet reached zero.
pub struct RcuWeak<T: Send + Sync + 'static> {
    inner: NonNull<ControlBlock<T>>,
    _marker: PhantomData<ControlBlock<T>>,
}

unsafe impl<T: Send + Sync> Send for RcuWeak<T> {}
unsafe impl<T: Send + Sync> Sync for RcuWeak<T> {}

/// Construct a new RCU-guarded shared value with one strong reference.
pub fn rcu_make_shared<T: Send + Sync + 'static>(value: T) -> RcuShared<T> {
    let boxed = Box::new(ControlBlock {
        count: JointRefCount::new(),
        value,
    });
    let inner = NonNull::new(Box::into_raw(boxed)).expect("Box::into_raw never null");
    RcuShared {
        inner,
        _marker: PhantomData,
    }
}

impl<T: Send + Sync + 'static> RcuShared<T> {
    pub fn downgrade(this: &Self) -> RcuWeak<T> {
        let block = unsafe { this.inner.as_ref() };
        block.count.weak_retain();
        RcuWeak {
            inner: this.inner,
            _marker: PhantomData,
        }
    }

    pub fn strong_count(this: &Self) -> usize {
        unsafe { this.inner.as_ref() }.count.strong()
    }

    pub fn weak_count(this: &Self) -> usize {
        unsafe { this.inner.as_ref() }.count.weak()
    }

    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        a.inner == b.inner
    }
}

impl<T: Send + Sync + 'static> Deref for RcuShared<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Readers are expected to be inside an rcu_read_lock section; a
        // strong reference additionally keeps the value alive directly,
        // so dereferencing is always sound regardless.
        &unsafe { self.inner.as_ref() }.value
    }
}

impl<T: Send + Sync + 'static> Clone for RcuShared<T> {
    fn clone(&self) -> Self {
        let block = unsafe { self.inner.as_ref() };
        block.count.strong_retain();
        Self {
            inner: self.inner,
            _marker: PhantomData,
        }
    }
}

impl<T: Send + Sync + 'static> Drop for RcuShared<T> {
    fn drop(&mut self) {
        let inner = self.inner;
        let block = unsafe { inner.as_ref() };
        let joint = block.count.strong_release();
        if joint.bits == JointCount::NONE {
            return;
        }
        if joint.strong_hit_zero() {
            // Defer dropping `T` in place and, if the weak count also hit
            // zero, freeing the control block's storage, until the next
            // grace period: readers that observed the pointer before this
            // release may still be dereferencing it.
            let weak_also_zero = joint.weak_hit_zero();
            call_rcu(move || {
                let ptr = inner.as_ptr();
                unsafe {
                    core::ptr::drop_in_place(core::ptr::addr_of_mut!((*ptr).value));
                    if weak_also_zero {
                        drop(Box::from_raw(ptr));
                    }
                }
            });
        }
    }
}

impl<T: Send + Sync + 'static> RcuWeak<T> {
    /// Attempt to upgrade to a strong reference; fails if the strong count
    /// has already reached zero.
    pub fn upgrade(&self) -> Option<RcuShared<T>> {
        let block = unsafe { self.inner.as_ref() };
        if block.count.try_strong_retain() {
            Some(RcuShared {
                inner: self.inner,
                _marker: PhantomData,
            })
        } else {
            None
        }
    }
}

impl<T: Send + Sync + 'static> Clone for RcuWeak<T> {
    fn clone(&self) -> Self {
        let block = unsafe { self.inner.as_ref() };
        block.count.weak_retain();
        Self {
            inner: self.inner,
            _marker: PhantomData,
        }
    }
}

impl<T: Send + Sync + 'static> Drop for RcuWeak<T> {
    fn drop(&mut self) {
        let inner = self.inner;
        if unsafe { inner.as_ref() }.count.weak_release() {
            call_rcu(move || unsafe {
                drop(Box::from_raw(inner.as_ptr()));
            });
        }
    }
}

/// RAII guard marking an RCU read-side critical section.
pub struct RcuReadGuard {
    _private: (),
}

impl RcuReadGuard {
    pub fn new() -> Self {
        rcu_read_lock();
        Self { _private: () }
    }
}

impl Default for RcuReadGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RcuReadGuard {
    fn drop(&mut self) {
        rcu_read_unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicUsize as StdAtomicUsize, Ordering as StdOrdering};

    #[test]
    fn strong_clone_and_drop_balance() {
        let shared = rcu_make_shared(42u64);
        assert_eq!(RcuShared::strong_count(&shared), 1);
        let clone = shared.clone();
        assert_eq!(RcuShared::strong_count(&shared), 2);
        drop(clone);
        assert_eq!(RcuShared::strong_count(&shared), 1);
    }

    #[test]
    fn weak_upgrade_succeeds_while_strong_alive() {
        let shared = rcu_make_shared(7i32);
        let weak = RcuShared::downgrade(&shared);
        let upgraded = weak.upgrade().expect("strong ref still alive");
        assert_eq!(*upgraded, 7);
    }

    #[test]
    fn weak_upgrade_fails_after_last_strong_drop() {
        static DROPPED: StdAtomicUsize = StdAtomicUsize::new(0);
        struct Noisy;
        impl Drop for Noisy {
            fn drop(&mut self) {
                DROPPED.fetch_add(1, StdOrdering::SeqCst);
            }
        }
        unsafe impl Send for Noisy {}
        unsafe impl Sync for Noisy {}

        let shared = rcu_make_shared(Noisy);
        let weak = RcuShared::downgrade(&shared);
        drop(shared);
        assert!(weak.upgrade().is_none());
    }
}
