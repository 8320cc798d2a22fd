//! Process and thread objects.
//!
//! A [`process::Process`] owns one [`crate::mm::PageTables`] root, one user
//! [`crate::mm::VirtualAllocator`], a per-process [`crate::cap::HandleTable`],
//! and the set of [`thread::Thread`]s running inside it. A process's parent
//! is held by weak reference (`RcuWeak`); the process table holds the
//! canonical strong reference for every live process, keyed by
//! [`ProcessId`], mirroring how the VFS keeps a node alive by its parent
//! directory's strong child-table entry rather than by a strong pointer
//! running the other way.

pub mod process;
pub mod table;
pub mod thread;

use core::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

pub use process::Process;
pub use thread::{ScheduleState, Thread, ThreadId};

use crate::{
    cap::{handle::ObjectType, registry, sync_objects::{KernelEvent, KernelMutex}, Handle},
    error::{KernelError, KernelResult},
    process::process::ProcessState,
};

/// Process identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(pub u64);

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub const MAX_PROCESSES: usize = 4096;
pub const MAX_THREADS_PER_PROCESS: usize = 256;

static NEXT_PID: AtomicU64 = AtomicU64::new(1);

pub fn alloc_pid() -> ProcessId {
    ProcessId(NEXT_PID.fetch_add(1, Ordering::Relaxed))
}

/// Bring up the process table and create process 1 (`init`), parentless
/// and with no threads of its own yet.
pub fn init() {
    table::init();
    let pid = process::create_root_process().expect("failed to create init process");
    log::info!("process: table online, init process is pid {}", pid.0);
}

/// The currently running process/thread, as tracked by the per-CPU
/// scheduler. Returns `None` before the scheduler has started running
/// anything (e.g. during early boot).
pub fn current_thread_id() -> Option<ThreadId> {
    crate::sched::current_thread_id()
}

/// The process owning the thread currently running on this CPU. Every
/// syscall handler that needs "my own handle table" or "my own address
/// space" goes through this rather than threading a process reference
/// through the syscall ABI.
pub fn current_process() -> KernelResult<crate::sync::RcuShared<process::Process>> {
    let tid = current_thread_id().ok_or(KernelError::NotInitialized {
        subsystem: "scheduler has not started a thread yet",
    })?;
    let thread = thread::lookup(tid)?;
    table::lookup(thread.pid())
}

/// A wait deadline, in the units spec §5's `OsInstant` describes: an
/// absolute uptime in milliseconds, `OS_TIMEOUT_INFINITE` (never times
/// out), or zero (poll once, never block).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitTimeout {
    Infinite,
    Poll,
    Deadline(u64),
}

impl WaitTimeout {
    fn has_expired(self, now_ms: u64) -> bool {
        match self {
            Self::Infinite => false,
            Self::Poll => true,
            Self::Deadline(deadline_ms) => now_ms >= deadline_ms,
        }
    }
}

/// `Thread.waitOnHandle(obj, timeout)` (spec §4.7): dispatches on the
/// handle's object type. Waiting on a process or thread spins on
/// `isComplete()` with yields; waiting on an event blocks on the event's
/// signal; waiting on a mutex acquires it. Unsupported handle types yield
/// `InvalidHandle`. A timed-out wait returns `Timeout` without consuming
/// the wait target's state (the mutex is left unlocked, the event
/// unconsumed).
pub fn wait_on_handle(handle: Handle, timeout: WaitTimeout) -> KernelResult<()> {
    let object_type = handle
        .object_type()
        .ok_or(KernelError::InvalidHandle { handle: handle.as_u64() })?;
    let object = registry::lookup(handle)?;

    loop {
        let satisfied = match object_type {
            ObjectType::Process => object
                .as_any()
                .downcast_ref::<process::ProcessHandle>()
                .map(|p| {
                    matches!(
                        p.process().state(),
                        ProcessState::Zombie | ProcessState::Dead
                    )
                })
                .unwrap_or(false),
            ObjectType::Thread => object
                .as_any()
                .downcast_ref::<thread::ThreadHandle>()
                .map(|t| t.thread().state() == ScheduleState::Done)
                .unwrap_or(false),
            ObjectType::Event => object
                .as_any()
                .downcast_ref::<KernelEvent>()
                .map(KernelEvent::is_signaled)
                .unwrap_or(false),
            ObjectType::Mutex => object
                .as_any()
                .downcast_ref::<KernelMutex>()
                .map(KernelMutex::try_lock)
                .unwrap_or(false),
            _ => return Err(KernelError::InvalidHandle { handle: handle.as_u64() }),
        };

        if satisfied {
            return Ok(());
        }

        let now_ms = crate::timer::get_uptime_ms();
        if timeout.has_expired(now_ms) {
            return Err(KernelError::Timeout {
                operation: "wait_on_handle",
                duration_ms: now_ms,
            });
        }

        crate::sched::yield_now();
    }
}

#[cfg(test)]
mod wait_tests {
    use super::*;
    use alloc::boxed::Box;

    #[test]
    fn poll_on_unsignaled_event_times_out_without_consuming_it() {
        registry::init();
        let event = KernelEvent::new(None);
        let handle = registry::register(Box::new(event));
        assert!(wait_on_handle(handle, WaitTimeout::Poll).is_err());
        assert!(wait_on_handle(handle, WaitTimeout::Poll).is_err());
    }

    #[test]
    fn signaled_event_satisfies_wait() {
        registry::init();
        let event = KernelEvent::new(None);
        event.signal();
        let handle = registry::register(Box::new(event));
        assert!(wait_on_handle(handle, WaitTimeout::Poll).is_ok());
    }

    #[test]
    fn waiting_on_a_free_mutex_acquires_it() {
        registry::init();
        let handle = registry::register(Box::new(KernelMutex::new(None)));
        assert!(wait_on_handle(handle, WaitTimeout::Poll).is_ok());
        // Second waiter sees it locked and times out without blocking forever.
        assert!(wait_on_handle(handle, WaitTimeout::Poll).is_err());
    }

    #[test]
    fn invalid_handle_is_rejected() {
        registry::init();
        assert!(wait_on_handle(crate::cap::OS_HANDLE_INVALID, WaitTimeout::Poll).is_err());
    }
}
