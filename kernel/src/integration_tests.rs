//! Cross-subsystem integration tests.
//!
//! Unit tests inside each module exercise one subsystem in isolation;
//! these exercise the seams between them the way spec §8's end-to-end
//! scenarios do: process creation sharing the kernel's higher half, a
//! VFS node kept alive by an open handle after `unlink`, and an
//! RCU-shared object reached through the capability registry.

#![cfg(test)]

use alloc::{boxed::Box, vec};

use crate::{
    cap::{self, handle::ObjectType, object::ObjectRefCounts, table::AccessMask, HandleTable, KernelObject},
    error::{FsError, KernelError},
    fs::{self, ramfs, NodeKind, VfsNodeHandle, VfsRoot},
    mm::{MemoryRange, PageFlags, PageTables, VirtualAddress, VirtualAllocator, LARGE_PAGE_SIZE},
    process,
    sync::{rcu_make_shared, RcuReadGuard, RcuShared},
};

/// Spawning a child process yields a distinct page-table root and a
/// private user address allocator positioned at the canonical user base
/// (spec §4.7, §8 scenario 6).
#[test]
fn process_creation_shares_higher_half_and_private_user_space() {
    process::table::init();
    let root_pid = process::process::create_root_process().unwrap();
    let (child_pid, _handle) = process::process::spawn(root_pid, "child").unwrap();

    let root = process::table::lookup(root_pid).unwrap();
    let child = process::table::lookup(child_pid).unwrap();

    assert_ne!(root.pid(), child.pid());
    assert_eq!(child.parent().unwrap().pid(), root_pid);

    let first = child.address_space().user_alloc4k(1).unwrap();
    let second = child.address_space().user_alloc4k(1).unwrap();
    assert_ne!(first, second);
}

/// `PageTables::map` followed by `unmap` returns every page in the range
/// to unmapped (spec §8 round-trip law).
#[test]
fn map_then_unmap_clears_every_page_in_range() {
    let tables = PageTables::new(8).unwrap();
    let frame = crate::mm::frame_allocator::allocate_frame().unwrap();
    let phys = frame.number().as_addr();
    let virt = VirtualAddress::new(0x1_0000_0000);
    let range = MemoryRange::new_virt(virt, VirtualAddress::new(virt.as_u64() + 0x1000));

    tables
        .map(phys, virt, 0x1000, PageFlags::PRESENT | PageFlags::WRITABLE)
        .unwrap();
    assert_eq!(tables.translate(virt), Some(phys));

    tables.unmap(range);
    assert_eq!(tables.translate(virt), None);
}

/// An RCU-shared VFS node handle keeps the node alive through the
/// capability registry even after the directory entry is removed: the
/// node moves `Live -> Unlinked`, but reads on the still-open handle keep
/// succeeding (spec §4.5 state machine, §8 scenario 3).
#[test]
fn removed_node_stays_readable_through_open_handle() {
    cap::init();
    let dir = ramfs::RamDirectory::new();
    let file = dir.create(b"inventory.txt").unwrap();
    file.write(0, b"42 widgets").unwrap();

    let handle = cap::registry::register(Box::new(VfsNodeHandle::new(file.clone())));
    dir.unlink(b"inventory.txt").unwrap();

    assert!(dir.lookup(b"inventory.txt").is_err());

    let looked_up = cap::registry::lookup(handle).unwrap();
    let node_handle = looked_up
        .as_any()
        .downcast_ref::<VfsNodeHandle>()
        .expect("registered object is a VfsNodeHandle");
    let mut buf = [0u8; 16];
    let read = node_handle.node().read(0, &mut buf).unwrap();
    assert_eq!(&buf[..read], b"42 widgets");
}

/// A path that resolves through a mountpoint still rejects traversal
/// through a non-folder node (spec §4.5 path resolution, §8 scenario 4).
#[test]
fn resolve_through_mount_then_rejects_file_traversal() {
    let mut root = VfsRoot::new(ramfs::RamDirectory::new());
    let mnt = ramfs::RamDirectory::new();
    mnt.create(b"readme").unwrap();
    root.mount(b"data", mnt).unwrap();

    let node = root.resolve(b"data\0readme").unwrap();
    assert_eq!(node.node_type(), NodeKind::File);
    assert!(matches!(
        root.resolve(b"data\0readme\0more"),
        Err(KernelError::FsError(FsError::TraverseNonFolder))
    ));
}

/// A handle table entry's rights gate access the way spec §3's Process
/// invariant requires: a lookup demanding a right the entry wasn't
/// granted fails.
#[test]
fn handle_table_enforces_granted_rights() {
    cap::init();
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

    let handle = cap::registry::register(Box::new(Dummy(ObjectRefCounts::new())));
    let table = HandleTable::new();
    table.insert(handle, AccessMask::READ).unwrap();

    assert!(table.get(handle, AccessMask::READ).is_ok());
    assert!(table.get(handle, AccessMask::WRITE).is_err());
}

/// An RCU-shared value survives a reader's critical section even after
/// every other strong reference drops (spec §4.4 invariants, §8
/// scenario 5).
#[test]
fn rcu_shared_outlives_drop_of_other_strong_refs() {
    let shared = rcu_make_shared(vec![1u32, 2, 3]);
    let guard = RcuReadGuard::new();
    let clone = shared.clone();
    drop(clone);
    assert_eq!(*shared, [1, 2, 3]);
    drop(guard);
    assert_eq!(RcuShared::strong_count(&shared), 1);
}

/// A freshly constructed user `VirtualAllocator` hands out addresses
/// below its limit, never the null guard page at index zero, and a 2 MiB
/// request comes back aligned to 2 MiB (spec §4.2, §8 scenario 2).
#[test]
fn user_allocator_withholds_the_null_guard_page() {
    let allocator = VirtualAllocator::new_user(1 << 30);
    let first = allocator.alloc4k(1).unwrap();
    assert_ne!(first.as_u64(), 0);
    let aligned = allocator.alloc2m(1).unwrap();
    assert_eq!(aligned.as_u64() % LARGE_PAGE_SIZE, 0);
}

/// Re-initializing the VFS root never leaves a stale VFS root path
/// reachable: `fs::init` followed by `fs::resolve` on an unmounted path
/// reports `NotFound` from the RAM root driver, not a stale handle.
#[test]
fn fs_init_then_resolve_unknown_path_is_not_found() {
    fs::init();
    assert!(matches!(
        fs::resolve(b"does-not-exist"),
        Err(KernelError::FsError(FsError::NotFound))
    ));
}
