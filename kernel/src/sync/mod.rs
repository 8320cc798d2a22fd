//! Synchronization primitives shared across the kernel.
//!
//! `once_lock` provides safe one-shot global initialization. `rcu` is the
//! epoch-based grace-period domain; `rcu_ptr` builds RCU-reclaimed shared
//! pointers on top of it. `lockfree_queue` is the lock-free MPMC queue used
//! by the scheduler's runnable-thread queue.

pub mod lockfree_queue;
pub mod once_lock;
pub mod rcu;
pub mod rcu_ptr;

pub use lockfree_queue::LockFreeQueue;
pub use once_lock::{GlobalState, LazyLock, OnceLock};
pub use rcu_ptr::{rcu_make_shared, RcuReadGuard, RcuShared, RcuWeak};
