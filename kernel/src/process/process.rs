//! The [`Process`] object: one page-table root, one user virtual-address
//! allocator, one handle table, and the set of threads running inside it.
//!
//! Grounded on the teacher's `process::pcb::ProcessControlBlock` (owned
//! page table + address space + per-process handle/fd table + parent/child
//! links), with the parent link narrowed to a weak pointer so a child
//! outliving its parent never keeps the parent's address space alive, and
//! the strong direction running from the process table down to each
//! process and from each process down to its own threads.

use alloc::{
    boxed::Box,
    collections::BTreeMap,
    string::{String, ToString},
    sync::Arc,
    vec::Vec,
};
use core::sync::atomic::{AtomicI32, AtomicU8, Ordering};

use spin::Mutex;

use crate::{
    cap::{
        handle::ObjectType,
        object::{KernelObject, ObjectRefCounts},
        registry, AccessMask, Handle, HandleTable,
    },
    error::{KernelError, KernelResult},
    mm::{PageTables, VirtualAllocator},
    sync::{rcu_make_shared, RcuShared, RcuWeak},
};

use super::{
    table,
    thread::{self, Thread, ThreadId},
    alloc_pid, ProcessId,
};

/// Default number of PTE-pool slots reserved for a fresh process's page
/// tables (the same budget the teacher's boot-time identity map uses).
const DEFAULT_PTE_BUDGET: usize = 512;

/// Top of the per-process user address space (lower half of canonical
/// 48-bit addressing, leaving the upper half for the kernel).
const USER_ADDRESS_LIMIT: u64 = 0x0000_7fff_ffff_f000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ProcessState {
    Running = 0,
    Zombie = 1,
    Dead = 2,
}

impl ProcessState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Running,
            1 => Self::Zombie,
            _ => Self::Dead,
        }
    }
}

pub struct Process {
    pid: ProcessId,
    name: String,
    state: AtomicU8,
    exit_code: AtomicI32,
    parent: Option<RcuWeak<Process>>,
    children: Mutex<Vec<ProcessId>>,
    threads: Mutex<Vec<ThreadId>>,
    page_tables: PageTables,
    address_space: VirtualAllocator,
    handles: HandleTable,
    counts: ObjectRefCounts,
}

impl Process {
    fn new(name: &str, parent: Option<RcuWeak<Process>>) -> KernelResult<Self> {
        let page_tables = PageTables::new(DEFAULT_PTE_BUDGET)?;
        // Spec §4.7 step 4: share the kernel's higher-half mappings so this
        // process can take syscalls/interrupts without losing access to
        // kernel code and data once its own page tables are live.
        if let Some(system) = crate::mm::system_page_tables() {
            page_tables.copy_higher_half_mappings(system);
        }
        Ok(Self {
            pid: alloc_pid(),
            name: name.to_string(),
            state: AtomicU8::new(ProcessState::Running as u8),
            exit_code: AtomicI32::new(0),
            parent,
            children: Mutex::new(Vec::new()),
            threads: Mutex::new(Vec::new()),
            page_tables,
            address_space: VirtualAllocator::new_user(USER_ADDRESS_LIMIT),
            handles: HandleTable::new(),
            counts: ObjectRefCounts::new(),
        })
    }

    pub fn pid(&self) -> ProcessId {
        self.pid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ProcessState {
        ProcessState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code.load(Ordering::Acquire)
    }

    pub fn parent(&self) -> Option<RcuShared<Process>> {
        self.parent.as_ref().and_then(RcuWeak::upgrade)
    }

    pub fn children(&self) -> Vec<ProcessId> {
        self.children.lock().clone()
    }

    pub fn threads(&self) -> Vec<ThreadId> {
        self.threads.lock().clone()
    }

    pub fn page_tables(&self) -> &PageTables {
        &self.page_tables
    }

    pub fn address_space(&self) -> &VirtualAllocator {
        &self.address_space
    }

    pub fn handles(&self) -> &HandleTable {
        &self.handles
    }

    /// Create a thread in this process and bind its handle into the
    /// process's own handle table with full rights.
    pub fn spawn_thread(
        self: &RcuShared<Process>,
        kernel_stack_top: u64,
        entry_point: u64,
        user_stack: u64,
    ) -> KernelResult<ThreadId> {
        let (thread, handle) = thread::spawn(self.pid, kernel_stack_top, entry_point, user_stack)?;
        self.handles.insert(handle, AccessMask::all())?;
        self.threads.lock().push(thread.tid());
        Ok(thread.tid())
    }

    /// Mark this process a zombie with the given exit code. Threads are
    /// left for the caller (typically the scheduler) to reap.
    pub fn exit(&self, code: i32) {
        self.exit_code.store(code, Ordering::Release);
        self.state.store(ProcessState::Zombie as u8, Ordering::Release);
    }

    fn mark_dead(&self) {
        self.state.store(ProcessState::Dead as u8, Ordering::Release);
    }

    fn add_child(&self, pid: ProcessId) {
        self.children.lock().push(pid);
    }
}

/// A kernel object wrapping a live process, the object type behind any
/// `Handle` returned by a process-creation syscall.
pub struct ProcessHandle {
    process: RcuShared<Process>,
    counts: ObjectRefCounts,
}

impl ProcessHandle {
    pub fn new(process: RcuShared<Process>) -> Self {
        Self {
            process,
            counts: ObjectRefCounts::new(),
        }
    }

    pub fn process(&self) -> &RcuShared<Process> {
        &self.process
    }
}

impl KernelObject for ProcessHandle {
    fn object_type(&self) -> ObjectType {
        ObjectType::Process
    }

    fn ref_counts(&self) -> &ObjectRefCounts {
        &self.counts
    }

    fn as_any(&self) -> &dyn core::any::Any {
        self
    }
}

/// Create process 1, the root of the process tree. Has no parent.
pub fn create_root_process() -> KernelResult<ProcessId> {
    let process = rcu_make_shared(Process::new("init", None)?);
    let pid = process.pid();
    table::insert(pid, process)?;
    Ok(pid)
}

/// Create a child process of `parent_pid`, holding only a weak reference
/// back to the parent.
pub fn spawn(parent_pid: ProcessId, name: &str) -> KernelResult<(ProcessId, Handle)> {
    let parent = table::lookup(parent_pid)?;
    let child = rcu_make_shared(Process::new(name, Some(RcuShared::downgrade(&parent)))?);
    let pid = child.pid();
    table::insert(pid, child.clone())?;
    parent.add_child(pid);
    let handle = registry::register(Box::new(ProcessHandle::new(child)));
    Ok((pid, handle))
}

/// Tear down a zombie process: free its object-registry footprint and
/// remove it from the process table. The caller is responsible for having
/// already reaped every thread.
pub fn reap(pid: ProcessId) -> KernelResult<()> {
    let process = table::lookup(pid)?;
    if process.state() != ProcessState::Zombie {
        return Err(KernelError::InvalidState {
            expected: "zombie",
            actual: "running",
        });
    }
    process.mark_dead();
    table::remove(pid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_process_has_no_parent() {
        table::init();
        let pid = create_root_process().unwrap();
        let process = table::lookup(pid).unwrap();
        assert!(process.parent().is_none());
    }

    #[test]
    fn spawned_child_reports_parent_and_is_listed() {
        table::init();
        let root_pid = create_root_process().unwrap();
        let (child_pid, _handle) = spawn(root_pid, "child").unwrap();
        let child = table::lookup(child_pid).unwrap();
        assert_eq!(child.parent().unwrap().pid(), root_pid);
        let root = table::lookup(root_pid).unwrap();
        assert_eq!(root.children(), alloc::vec![child_pid]);
    }

    #[test]
    fn reap_requires_zombie_state() {
        table::init();
        let pid = create_root_process().unwrap();
        assert!(reap(pid).is_err());
        let process = table::lookup(pid).unwrap();
        process.exit(0);
        assert!(reap(pid).is_ok());
        assert!(table::lookup(pid).is_err());
    }
}
