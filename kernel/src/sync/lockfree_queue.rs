//! Lock-free MPMC queue.
//!
//! A wait-free-on-the-fast-path multi-producer, multi-consumer queue built
//! on a Michael-Scott linked list. Used as the runnable-thread queue
//! (`crate::sched::queue`): any CPU's scheduler may enqueue a thread that
//! becomes runnable, and any CPU's scheduler may dequeue the next thread to
//! run, so both ends need CAS-based concurrent access rather than the
//! single-consumer restriction of a classic MPSC variant.
//!
//! Memory reclamation for popped nodes goes through the RCU domain
//! (`super::rcu::call_rcu`): a node removed by `pop()` may still be
//! referenced by a concurrent `pop()` that read its `next` pointer before
//! the CAS that unlinked it, so freeing is deferred to the next grace
//! period rather than done inline.

use alloc::boxed::Box;
use core::{
    ptr,
    sync::atomic::{AtomicPtr, AtomicUsize, Ordering},
};

use super::rcu::call_rcu;

struct Node<T> {
    value: Option<T>,
    next: AtomicPtr<Node<T>>,
}

impl<T> Node<T> {
    fn new(value: T) -> *mut Self {
        Box::into_raw(Box::new(Self {
            value: Some(value),
            next: AtomicPtr::new(ptr::null_mut()),
        }))
    }

    fn sentinel() -> *mut Self {
        Box::into_raw(Box::new(Self {
            value: None,
            next: AtomicPtr::new(ptr::null_mut()),
        }))
    }
}

/// A lock-free multi-producer, multi-consumer queue.
pub struct LockFreeQueue<T: Send + 'static> {
    head: AtomicPtr<Node<T>>,
    tail: AtomicPtr<Node<T>>,
    len: AtomicUsize,
}

unsafe impl<T: Send> Send for LockFreeQueue<T> {}
unsafe impl<T: Send> Sync for LockFreeQueue<T> {}

impl<T: Send + 'static> LockFreeQueue<T> {
    pub fn new() -> Self {
        let sentinel = Node::<T>::sentinel();
        Self {
            head: AtomicPtr::new(sentinel),
            tail: AtomicPtr::new(sentinel),
            len: AtomicUsize::new(0),
        }
    }

    /// Push a value onto the tail. Safe to call from any number of
    /// concurrent producers.
    pub fn push(&self, value: T) {
        let new_node = Node::new(value);

        loop {
            let tail = self.tail.load(Ordering::Acquire);
            let next = unsafe { (*tail).next.load(Ordering::Acquire) };

            if next.is_null() {
                if unsafe {
                    (*tail)
                        .next
                        .compare_exchange(
                            ptr::null_mut(),
                            new_node,
                            Ordering::Release,
                            Ordering::Relaxed,
                        )
                        .is_ok()
                } {
                    let _ = self.tail.compare_exchange(
                        tail,
                        new_node,
                        Ordering::Release,
                        Ordering::Relaxed,
                    );
                    self.len.fetch_add(1, Ordering::Relaxed);
                    return;
                }
            } else {
                let _ =
                    self.tail
                        .compare_exchange(tail, next, Ordering::Release, Ordering::Relaxed);
            }
        }
    }

    /// Pop a value from the head. Safe to call from any number of
    /// concurrent consumers: the head advance is itself a CAS, so two
    /// racing poppers never both observe success for the same node.
    pub fn pop(&self) -> Option<T> {
        loop {
            let head = self.head.load(Ordering::Acquire);
            let tail = self.tail.load(Ordering::Acquire);
            let next = unsafe { (*head).next.load(Ordering::Acquire) };

            if head == tail {
                if next.is_null() {
                    return None;
                }
                let _ =
                    self.tail
                        .compare_exchange(tail, next, Ordering::Release, Ordering::Relaxed);
                continue;
            }

            if next.is_null() {
                continue;
            }

            // Snapshot the value before racing on the head CAS: if we lose
            // the race, another popper already claimed `next` and may have
            // taken the value first, so re-read next time around instead
            // of reusing this snapshot.
            if self
                .head
                .compare_exchange(head, next, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                let value = unsafe { (*next).value.take() };
                self.len.fetch_sub(1, Ordering::Relaxed);
                // `head` (the old sentinel) may still be reachable from a
                // concurrent popper that read `next` from it before losing
                // the CAS race above; defer the free past the next grace
                // period rather than freeing inline.
                let old_head = head;
                call_rcu(move || unsafe {
                    drop(Box::from_raw(old_head));
                });
                return value;
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        let next = unsafe { (*head).next.load(Ordering::Acquire) };
        head == tail && next.is_null()
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }
}

impl<T: Send + 'static> Default for LockFreeQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> Drop for LockFreeQueue<T> {
    fn drop(&mut self) {
        while self.pop().is_some() {}
        let sentinel = self.head.load(Ordering::Relaxed);
        if !sentinel.is_null() {
            unsafe {
                let _ = Box::from_raw(sentinel);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_single_threaded() {
        let q = LockFreeQueue::new();
        q.push(1);
        q.push(2);
        q.push(3);
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), Some(3));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn empty_after_drain() {
        let q = LockFreeQueue::new();
        assert!(q.is_empty());
        q.push(10);
        assert!(!q.is_empty());
        assert_eq!(q.pop(), Some(10));
        assert!(q.is_empty());
    }

    #[test]
    fn len_tracks_pushes_and_pops() {
        let q = LockFreeQueue::new();
        for i in 0..5 {
            q.push(i);
        }
        assert_eq!(q.len(), 5);
        q.pop();
        q.pop();
        assert_eq!(q.len(), 3);
    }
}
