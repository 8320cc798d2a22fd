//! Global system object registry ([`SystemObjects`]).
//!
//! Assigns the `id` half of every [`Handle`] and holds a `rawPointer ->
//! Handle` reverse map so a kernel object can be looked up by identity.
//! Grounded on the teacher's `cap::token::{GLOBAL_CAP_ID, alloc_cap_id}`
//! atomic-id allocator and `cap::types::CapabilitySpace`'s `BTreeMap`
//! storage, with the capability-token payload replaced by a
//! `KernelObject` trait object behind `RcuShared`.

use alloc::{boxed::Box, collections::BTreeMap};
use core::sync::atomic::{AtomicU64, Ordering};

use spin::RwLock;

use crate::{
    error::{KernelError, KernelResult},
    sync::{rcu_make_shared, RcuShared},
};

use super::{
    handle::Handle,
    object::KernelObject,
};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

struct Entry {
    object: RcuShared<Box<dyn KernelObject>>,
}

/// The system-wide table of live kernel objects, keyed by handle id.
pub struct SystemObjects {
    objects: BTreeMap<u64, Entry>,
    by_pointer: BTreeMap<usize, Handle>,
}

impl SystemObjects {
    const fn new() -> Self {
        Self {
            objects: BTreeMap::new(),
            by_pointer: BTreeMap::new(),
        }
    }
}

static REGISTRY: RwLock<Option<SystemObjects>> = RwLock::new(None);

/// Bring up the registry. Idempotent-unsafe: calling twice replaces the
/// table and orphans every previously issued handle, so this is only ever
/// called once from `bootstrap`.
pub fn init() {
    *REGISTRY.write() = Some(SystemObjects::new());
}

fn raw_pointer_of(shared: &RcuShared<Box<dyn KernelObject>>) -> usize {
    let reference: &Box<dyn KernelObject> = shared;
    let inner: &dyn KernelObject = &**reference;
    inner as *const dyn KernelObject as *const () as usize
}

/// Register a new kernel object, returning the handle that now refers to
/// it. The handle's `id` half is freshly allocated; the type half comes
/// from the object's own `object_type()`.
pub fn register(object: Box<dyn KernelObject>) -> Handle {
    let object_type = object.object_type();
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    let shared = rcu_make_shared(object);
    let raw_pointer = raw_pointer_of(&shared);
    let handle = Handle::new(object_type, id);

    let mut guard = REGISTRY.write();
    let registry = guard
        .as_mut()
        .expect("cap::init must run before registry::register");
    registry.objects.insert(id, Entry { object: shared });
    registry.by_pointer.insert(raw_pointer, handle);
    handle
}

/// Look up the live object behind a handle.
pub fn lookup(handle: Handle) -> KernelResult<RcuShared<Box<dyn KernelObject>>> {
    let guard = REGISTRY.read();
    let registry = guard.as_ref().ok_or(KernelError::NotInitialized {
        subsystem: "cap registry",
    })?;
    registry
        .objects
        .get(&handle.id())
        .map(|entry| entry.object.clone())
        .ok_or(KernelError::InvalidHandle {
            handle: handle.as_u64(),
        })
}

/// Find the handle that was issued for a given live object, if any process
/// still holds the registry's copy of it.
pub fn handle_for_pointer(raw_pointer: usize) -> Option<Handle> {
    REGISTRY
        .read()
        .as_ref()
        .and_then(|r| r.by_pointer.get(&raw_pointer).copied())
}

/// Remove the registry's own reference to an object. The object itself may
/// still be kept alive by outstanding `RcuShared` clones held elsewhere
/// (per-process handle table entries) until those are dropped too — this
/// only stops new lookups of the handle from succeeding.
pub fn unregister(handle: Handle) -> KernelResult<()> {
    let mut guard = REGISTRY.write();
    let registry = guard.as_mut().ok_or(KernelError::NotInitialized {
        subsystem: "cap registry",
    })?;
    let entry = registry
        .objects
        .remove(&handle.id())
        .ok_or(KernelError::InvalidHandle {
            handle: handle.as_u64(),
        })?;
    let raw_pointer = raw_pointer_of(&entry.object);
    registry.by_pointer.remove(&raw_pointer);
    Ok(())
}

/// Number of live objects in the registry (diagnostics only).
pub fn object_count() -> usize {
    REGISTRY.read().as_ref().map_or(0, |r| r.objects.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cap::{handle::ObjectType, object::ObjectRefCounts};

    struct Dummy(ObjectRefCounts);

    impl KernelObject for Dummy {
        fn object_type(&self) -> ObjectType {
            ObjectType::Event
        }

        fn ref_counts(&self) -> &ObjectRefCounts {
            &self.0
        }

        fn as_any(&self) -> &dyn core::any::Any {
            self
        }
    }

    #[test]
    fn register_then_lookup_roundtrips() {
        init();
        let handle = register(Box::new(Dummy(ObjectRefCounts::new())));
        assert!(lookup(handle).is_ok());
        assert!(unregister(handle).is_ok());
        assert!(lookup(handle).is_err());
    }

    #[test]
    fn unregister_unknown_handle_errs() {
        init();
        let bogus = Handle::new(ObjectType::Event, 0xffff_ffff);
        assert!(unregister(bogus).is_err());
    }
}
