//! Thread objects.
//!
//! A [`Thread`] owns its kernel-stack mapping, its saved register/FPU state
//! (`X86_64Context`/`FpuState`, reused unmodified from [`crate::arch`]), a
//! TLS base, and a [`ScheduleState`] the scheduler drives through
//! `Ready -> Running -> {Waiting, Done}`. Grounded on the teacher's
//! `sched::task::Task` (state machine, kernel/user stack fields), stripped
//! of the priority/affinity/vruntime bookkeeping that belonged to the
//! teacher's CFS-style scheduler and replaced by the plain runnable-queue
//! model this kernel uses instead.

use alloc::{boxed::Box, sync::Arc};
use core::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use spin::RwLock;

use crate::{
    arch::x86_64::context::{FpuState, X86_64Context},
    cap::{
        handle::ObjectType,
        object::{KernelObject, ObjectRefCounts},
        registry, Handle,
    },
    error::{KernelError, KernelResult},
};

use super::ProcessId;

/// Thread identifier, unique kernel-wide (not just per-process).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub u64);

static NEXT_TID: AtomicU64 = AtomicU64::new(1);

pub fn alloc_tid() -> ThreadId {
    ThreadId(NEXT_TID.fetch_add(1, Ordering::Relaxed))
}

/// Where a thread sits in the scheduler's view of the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ScheduleState {
    /// Runnable, sitting in (or about to be pushed onto) the runnable queue.
    Ready = 0,
    /// Currently executing on some CPU.
    Running = 1,
    /// Blocked on a wait object; not on the runnable queue.
    Waiting = 2,
    /// Exited; resources are eligible for teardown once joined.
    Done = 3,
}

impl ScheduleState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Ready,
            1 => Self::Running,
            2 => Self::Waiting,
            _ => Self::Done,
        }
    }
}

/// Atomic wrapper around [`ScheduleState`] so the scheduler can transition a
/// thread's state without taking any other lock on it.
pub struct ScheduleStateCell(AtomicU8);

impl ScheduleStateCell {
    pub fn new(initial: ScheduleState) -> Self {
        Self(AtomicU8::new(initial as u8))
    }

    pub fn get(&self) -> ScheduleState {
        ScheduleState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, state: ScheduleState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Move `Ready -> Running`, reporting whether the transition happened
    /// (another CPU may have grabbed this thread first).
    pub fn try_start_running(&self) -> bool {
        self.0
            .compare_exchange(
                ScheduleState::Ready as u8,
                ScheduleState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

impl Default for ScheduleStateCell {
    fn default() -> Self {
        Self::new(ScheduleState::Ready)
    }
}

/// Per-thread kernel-stack mapping, register state, and TLS base.
pub struct Thread {
    tid: ThreadId,
    pid: ProcessId,
    state: ScheduleStateCell,
    context: RwLock<X86_64Context>,
    /// Extended FPU/SSE/AVX save area, allocated only when the CPU
    /// advertises XSAVE support; threads on CPUs without it fall back to
    /// whatever FXSAVE state `X86_64Context` itself tracks.
    fpu_state: RwLock<Option<Box<FpuState>>>,
    kernel_stack_top: u64,
    tls_base: AtomicU64,
    counts: ObjectRefCounts,
}

impl Thread {
    pub fn new(pid: ProcessId, kernel_stack_top: u64, entry_point: u64, user_stack: u64) -> Self {
        let context = X86_64Context::new_user(entry_point as usize, user_stack as usize);
        Self {
            tid: alloc_tid(),
            pid,
            state: ScheduleStateCell::default(),
            context: RwLock::new(context),
            fpu_state: RwLock::new(
                crate::arch::x86_64::context::has_xsave().then(|| {
                    Box::new(FpuState {
                        fxsave: [0u8; 512],
                        xsave: [0u8; 2048],
                    })
                }),
            ),
            kernel_stack_top,
            tls_base: AtomicU64::new(0),
            counts: ObjectRefCounts::new(),
        }
    }

    pub fn tid(&self) -> ThreadId {
        self.tid
    }

    pub fn pid(&self) -> ProcessId {
        self.pid
    }

    pub fn state(&self) -> ScheduleState {
        self.state.get()
    }

    pub fn schedule_state(&self) -> &ScheduleStateCell {
        &self.state
    }

    pub fn kernel_stack_top(&self) -> u64 {
        self.kernel_stack_top
    }

    pub fn tls_base(&self) -> u64 {
        self.tls_base.load(Ordering::Acquire)
    }

    pub fn set_tls_base(&self, base: u64) {
        self.tls_base.store(base, Ordering::Release);
    }

    pub fn with_context<R>(&self, f: impl FnOnce(&X86_64Context) -> R) -> R {
        f(&self.context.read())
    }

    pub fn with_context_mut<R>(&self, f: impl FnOnce(&mut X86_64Context) -> R) -> R {
        f(&mut self.context.write())
    }

    /// Run `f` against this thread's FPU save area, if the CPU has one
    /// allocated. Returns `None` on a CPU without XSAVE support, in which
    /// case there is nothing beyond the base register context to save or
    /// restore.
    pub fn with_fpu_state_mut<R>(&self, f: impl FnOnce(&mut FpuState) -> R) -> Option<R> {
        self.fpu_state.write().as_deref_mut().map(f)
    }
}

/// A kernel object wrapping a live thread, the object type behind any
/// `Handle` returned by a thread-creation syscall.
pub struct ThreadHandle {
    thread: Arc<Thread>,
    counts: ObjectRefCounts,
}

impl ThreadHandle {
    pub fn new(thread: Arc<Thread>) -> Self {
        Self {
            thread,
            counts: ObjectRefCounts::new(),
        }
    }

    pub fn thread(&self) -> &Arc<Thread> {
        &self.thread
    }
}

impl KernelObject for ThreadHandle {
    fn object_type(&self) -> ObjectType {
        ObjectType::Thread
    }

    fn ref_counts(&self) -> &ObjectRefCounts {
        &self.counts
    }

    fn as_any(&self) -> &dyn core::any::Any {
        self
    }
}

static THREAD_TABLE: RwLock<Option<alloc::collections::BTreeMap<ThreadId, Arc<Thread>>>> =
    RwLock::new(None);

pub fn init() {
    *THREAD_TABLE.write() = Some(alloc::collections::BTreeMap::new());
}

/// Create a thread owned by `pid` and register it in the global thread
/// table, returning a `Handle` a caller can bind into that process's
/// `HandleTable`.
pub fn spawn(pid: ProcessId, kernel_stack_top: u64, entry_point: u64, user_stack: u64) -> KernelResult<(Arc<Thread>, Handle)> {
    let thread = Arc::new(Thread::new(pid, kernel_stack_top, entry_point, user_stack));
    THREAD_TABLE
        .write()
        .as_mut()
        .ok_or(KernelError::NotInitialized { subsystem: "process::thread" })?
        .insert(thread.tid(), thread.clone());
    let handle = registry::register(Box::new(ThreadHandle::new(thread.clone())));
    Ok((thread, handle))
}

pub fn lookup(tid: ThreadId) -> KernelResult<Arc<Thread>> {
    THREAD_TABLE
        .read()
        .as_ref()
        .ok_or(KernelError::NotInitialized { subsystem: "process::thread" })?
        .get(&tid)
        .cloned()
        .ok_or(KernelError::ThreadNotFound { tid: tid.0 })
}

pub fn remove(tid: ThreadId) -> KernelResult<()> {
    THREAD_TABLE
        .write()
        .as_mut()
        .ok_or(KernelError::NotInitialized { subsystem: "process::thread" })?
        .remove(&tid)
        .map(|_| ())
        .ok_or(KernelError::ThreadNotFound { tid: tid.0 })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_thread_starts_ready() {
        let t = Thread::new(ProcessId(1), 0xffff_8000_0010_0000, 0x1000, 0x7fff_0000);
        assert_eq!(t.state(), ScheduleState::Ready);
    }

    #[test]
    fn try_start_running_transitions_once() {
        let t = Thread::new(ProcessId(1), 0xffff_8000_0010_0000, 0x1000, 0x7fff_0000);
        assert!(t.schedule_state().try_start_running());
        assert_eq!(t.state(), ScheduleState::Running);
        assert!(!t.schedule_state().try_start_running());
    }

    #[test]
    fn tls_base_roundtrips() {
        let t = Thread::new(ProcessId(1), 0xffff_8000_0010_0000, 0x1000, 0x7fff_0000);
        t.set_tls_base(0xdead_beef);
        assert_eq!(t.tls_base(), 0xdead_beef);
    }
}
