//! The global process table: the canonical strong reference to every live
//! [`Process`](super::Process), keyed by [`ProcessId`].

use alloc::collections::BTreeMap;

use spin::RwLock;

use crate::{
    error::{KernelError, KernelResult},
    sync::RcuShared,
};

use super::{process::Process, ProcessId};

static PROCESS_TABLE: RwLock<Option<BTreeMap<ProcessId, RcuShared<Process>>>> = RwLock::new(None);

pub fn init() {
    *PROCESS_TABLE.write() = Some(BTreeMap::new());
}

pub fn insert(pid: ProcessId, process: RcuShared<Process>) -> KernelResult<()> {
    PROCESS_TABLE
        .write()
        .as_mut()
        .ok_or(KernelError::NotInitialized { subsystem: "process::table" })?
        .insert(pid, process);
    Ok(())
}

pub fn lookup(pid: ProcessId) -> KernelResult<RcuShared<Process>> {
    PROCESS_TABLE
        .read()
        .as_ref()
        .ok_or(KernelError::NotInitialized { subsystem: "process::table" })?
        .get(&pid)
        .cloned()
        .ok_or(KernelError::ProcessNotFound { pid: pid.0 })
}

pub fn remove(pid: ProcessId) -> KernelResult<()> {
    PROCESS_TABLE
        .write()
        .as_mut()
        .ok_or(KernelError::NotInitialized { subsystem: "process::table" })?
        .remove(&pid)
        .map(|_| ())
        .ok_or(KernelError::ProcessNotFound { pid: pid.0 })
}

pub fn count() -> usize {
    PROCESS_TABLE.read().as_ref().map(BTreeMap::len).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::process::create_root_process;

    #[test]
    fn lookup_after_insert_succeeds() {
        init();
        let pid = create_root_process().unwrap();
        assert!(lookup(pid).is_ok());
    }

    #[test]
    fn remove_then_lookup_fails() {
        init();
        let pid = create_root_process().unwrap();
        remove(pid).unwrap();
        assert!(lookup(pid).is_err());
    }
}
