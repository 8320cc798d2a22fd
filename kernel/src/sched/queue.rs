//! The global runnable-thread queue.
//!
//! A single [`crate::sync::LockFreeQueue`] of [`ThreadId`], shared by every
//! CPU: going runnable pushes a thread's id onto the tail, and picking the
//! next thread to run pops one off the head. `LockFreeQueue::new` heap
//! allocates its sentinel node, so it cannot back a plain `static` item
//! directly; [`LazyLock`](crate::sync::LazyLock) defers that allocation to
//! first use, after the heap is up.

use crate::{
    process::thread::ThreadId,
    sync::{LazyLock, LockFreeQueue},
};

static RUN_QUEUE: LazyLock<LockFreeQueue<ThreadId>> = LazyLock::new(LockFreeQueue::new);

/// Make `tid` runnable by pushing it onto the tail of the queue.
pub fn add_work_item(tid: ThreadId) {
    RUN_QUEUE.push(tid);
}

/// Pop the next runnable thread, if any.
pub fn get_work_item() -> Option<ThreadId> {
    RUN_QUEUE.pop()
}

pub fn is_empty() -> bool {
    RUN_QUEUE.is_empty()
}

pub fn len() -> usize {
    RUN_QUEUE.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_ordering_across_tids() {
        while get_work_item().is_some() {}
        add_work_item(ThreadId(1));
        add_work_item(ThreadId(2));
        add_work_item(ThreadId(3));
        assert_eq!(get_work_item(), Some(ThreadId(1)));
        assert_eq!(get_work_item(), Some(ThreadId(2)));
        assert_eq!(get_work_item(), Some(ThreadId(3)));
        assert!(is_empty());
    }
}
