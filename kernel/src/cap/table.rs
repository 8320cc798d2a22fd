//! Per-process handle table ([`HandleTable`]) and the [`AccessMask`] rights
//! it attaches to each entry.
//!
//! Grounded on the teacher's `cap::types::CapabilitySpace` (`BTreeMap`
//! behind a lock) and `cap::token::Rights` bitflags idiom, generalized so
//! a table entry references an object through the shared
//! [`super::registry`] rather than owning a capability struct inline.

use alloc::{boxed::Box, collections::BTreeMap};

use spin::RwLock;

use crate::{
    error::{KernelError, KernelResult},
    sync::RcuShared,
};

use super::{handle::Handle, object::KernelObject, registry};

bitflags::bitflags! {
    /// Rights a handle table entry grants over the object it names.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AccessMask: u32 {
        const READ      = 1 << 0;
        const WRITE     = 1 << 1;
        const EXECUTE   = 1 << 2;
        const DELETE    = 1 << 3;
        const WAIT      = 1 << 4;
    }
}

struct TableEntry {
    object: RcuShared<Box<dyn KernelObject>>,
    rights: AccessMask,
}

/// One process's view of the objects it holds handles to.
pub struct HandleTable {
    entries: RwLock<BTreeMap<Handle, TableEntry>>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Bind `handle` (already registered in the global registry) into this
    /// table with the given rights.
    pub fn insert(&self, handle: Handle, rights: AccessMask) -> KernelResult<()> {
        let object = registry::lookup(handle)?;
        self.entries
            .write()
            .insert(handle, TableEntry { object, rights });
        Ok(())
    }

    /// Resolve a handle held by this process, checking it carries at least
    /// `required` rights.
    pub fn get(
        &self,
        handle: Handle,
        required: AccessMask,
    ) -> KernelResult<RcuShared<Box<dyn KernelObject>>> {
        let guard = self.entries.read();
        let entry = guard.get(&handle).ok_or(KernelError::InvalidHandle {
            handle: handle.as_u64(),
        })?;
        if !entry.rights.contains(required) {
            return Err(KernelError::InsufficientRights {
                required: required.bits(),
                actual: entry.rights.bits(),
            });
        }
        Ok(entry.object.clone())
    }

    /// Remove a handle from this table. Does not affect the global
    /// registry entry; other processes' tables may still reference it.
    pub fn close(&self, handle: Handle) -> KernelResult<()> {
        self.entries
            .write()
            .remove(&handle)
            .map(|_| ())
            .ok_or(KernelError::InvalidHandle {
                handle: handle.as_u64(),
            })
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cap::{handle::ObjectType, object::ObjectRefCounts, registry};

    struct Dummy(ObjectRefCounts);

    impl KernelObject for Dummy {
        fn object_type(&self) -> ObjectType {
            ObjectType::Mutex
        }

        fn ref_counts(&self) -> &ObjectRefCounts {
            &self.0
        }

        fn as_any(&self) -> &dyn core::any::Any {
            self
        }
    }

    #[test]
    fn insert_get_close_roundtrip() {
        registry::init();
        let handle = registry::register(Box::new(Dummy(ObjectRefCounts::new())));
        let table = HandleTable::new();
        table.insert(handle, AccessMask::READ | AccessMask::WRITE).unwrap();
        assert!(table.get(handle, AccessMask::READ).is_ok());
        assert!(table.get(handle, AccessMask::EXECUTE).is_err());
        table.close(handle).unwrap();
        assert!(table.get(handle, AccessMask::READ).is_err());
    }

    #[test]
    fn insufficient_rights_reports_masks() {
        registry::init();
        let handle = registry::register(Box::new(Dummy(ObjectRefCounts::new())));
        let table = HandleTable::new();
        table.insert(handle, AccessMask::READ).unwrap();
        match table.get(handle, AccessMask::WRITE) {
            Err(KernelError::InsufficientRights { required, actual }) => {
                assert_eq!(required, AccessMask::WRITE.bits());
                assert_eq!(actual, AccessMask::READ.bits());
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
