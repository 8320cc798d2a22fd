//! Virtual filesystem: node/mount/driver abstraction over GUID-keyed
//! interfaces, backed by the [`ramfs`] RAM filesystem driver.
//!
//! Layering: [`node::VfsNode`] is the per-node interface-query trait;
//! [`guid`] names the well-known interfaces (`Identify`, `Stream`,
//! `Folder`, `Device`); [`path`] validates and segments NUL-separated path
//! text; [`VfsRoot`] composes a root driver with zero or more mounts and
//! resolves paths across that composition, grounded on the teacher's
//! `fs::Vfs` (`root_fs` + `mounts: BTreeMap<String, Arc<dyn Filesystem>>`).

pub mod guid;
pub mod node;
pub mod path;
pub mod ramfs;

use alloc::{boxed::Box, string::String, sync::Arc, vec::Vec};

use spin::RwLock;

use crate::{
    cap::{
        handle::ObjectType,
        object::{KernelObject, ObjectRefCounts},
        registry, Handle,
    },
    error::{FsError, KernelError, KernelResult},
};

pub use guid::Guid;
pub use node::{NodeKind, NodeState, VfsNode};

/// One additional filesystem grafted onto the tree at `mount_path`.
struct Mount {
    mount_path: String,
    root: Arc<dyn VfsNode>,
}

/// The composed view of every mounted filesystem, rooted at a single
/// driver (normally the ram filesystem).
pub struct VfsRoot {
    root: Arc<dyn VfsNode>,
    mounts: Vec<Mount>,
}

impl VfsRoot {
    pub fn new(root: Arc<dyn VfsNode>) -> Self {
        Self {
            root,
            mounts: Vec::new(),
        }
    }

    /// Mount `root` at `mount_path` (a validated NUL-separated path below
    /// this `VfsRoot`'s own root).
    pub fn mount(&mut self, mount_path: &[u8], root: Arc<dyn VfsNode>) -> KernelResult<()> {
        path::verify_path_text(mount_path)?;
        let mount_path = String::from_utf8(mount_path.to_vec()).map_err(|_| {
            KernelError::InvalidArgument {
                name: "mount_path",
                value: "not valid UTF-8",
            }
        })?;
        if self.mounts.iter().any(|m| m.mount_path == mount_path) {
            return Err(KernelError::FsError(FsError::AlreadyMounted));
        }
        self.mounts.push(Mount { mount_path, root });
        Ok(())
    }

    /// Resolve a validated path to the node it names, choosing the
    /// longest-matching mount prefix and then walking the remainder
    /// through that mount's `Folder` interface (or the root driver's, if
    /// no mount matches).
    pub fn resolve(&self, path_text: &[u8]) -> KernelResult<Arc<dyn VfsNode>> {
        path::verify_path_text(path_text)?;

        let (mut current, remaining): (Arc<dyn VfsNode>, &[u8]) =
            match self.best_mount(path_text) {
                Some((mount, rest)) => (mount.root.clone(), rest),
                None => (self.root.clone(), path_text),
            };

        if remaining.is_empty() {
            return Ok(current);
        }

        for segment in path::segments(remaining) {
            if current.node_type() != NodeKind::Directory {
                return Err(KernelError::FsError(FsError::TraverseNonFolder));
            }
            current = current.lookup(segment)?;
        }
        Ok(current)
    }

    fn best_mount<'a>(&'a self, path_text: &'a [u8]) -> Option<(&'a Mount, &'a [u8])> {
        let mut best: Option<(&Mount, &[u8])> = None;
        for mount in &self.mounts {
            let prefix = mount.mount_path.as_bytes();
            if path_text == prefix {
                return Some((mount, &path_text[path_text.len()..]));
            }
            if path_text.starts_with(prefix) && path_text.get(prefix.len()) == Some(&path::PATH_SEPARATOR) {
                let candidate = (mount, &path_text[prefix.len() + 1..]);
                best = match best {
                    Some((current_best, _)) if current_best.mount_path.len() >= prefix.len() => best,
                    _ => Some(candidate),
                };
            }
        }
        best
    }
}

static VFS_ROOT: RwLock<Option<VfsRoot>> = RwLock::new(None);

/// Bring up the VFS: a RAM filesystem directory as the sole root driver.
/// No other backing store is part of this kernel's core scope.
pub fn init() {
    let root = ramfs::RamDirectory::new();
    *VFS_ROOT.write() = Some(VfsRoot::new(root));
    log::info!("fs: ram filesystem mounted at root");
}

/// Resolve a NUL-separated path against the global VFS composition.
pub fn resolve(path_text: &[u8]) -> KernelResult<Arc<dyn VfsNode>> {
    VFS_ROOT
        .read()
        .as_ref()
        .ok_or(KernelError::NotInitialized { subsystem: "fs" })?
        .resolve(path_text)
}

/// A kernel object wrapping a resolved VFS node, the object type behind
/// any `Handle` returned by a node-open syscall.
pub struct VfsNodeHandle {
    node: Arc<dyn VfsNode>,
    counts: ObjectRefCounts,
}

impl VfsNodeHandle {
    pub fn new(node: Arc<dyn VfsNode>) -> Self {
        Self {
            node,
            counts: ObjectRefCounts::new(),
        }
    }

    pub fn node(&self) -> &Arc<dyn VfsNode> {
        &self.node
    }
}

impl KernelObject for VfsNodeHandle {
    fn object_type(&self) -> ObjectType {
        if self.node.node_type() == NodeKind::Device {
            ObjectType::Device
        } else {
            ObjectType::VfsNodeHandle
        }
    }

    fn ref_counts(&self) -> &ObjectRefCounts {
        &self.counts
    }

    fn as_any(&self) -> &dyn core::any::Any {
        self
    }
}

/// Resolve a path and register the resulting node as a fresh handle in the
/// global object registry. Binding that handle into a particular process's
/// `HandleTable` is the caller's responsibility (the syscall layer does
/// this with the rights requested by the open call).
pub fn open(path_text: &[u8]) -> KernelResult<Handle> {
    let node = resolve(path_text)?;
    Ok(registry::register(Box::new(VfsNodeHandle::new(node))))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_root() -> VfsRoot {
        VfsRoot::new(ramfs::RamDirectory::new())
    }

    #[test]
    fn resolve_root_path_segment() {
        let root = fresh_root();
        root.root.create(b"a.txt").unwrap();
        let node = root.resolve(b"a.txt").unwrap();
        assert_eq!(node.node_type(), NodeKind::File);
    }

    #[test]
    fn resolve_through_nested_directories() {
        let root = fresh_root();
        root.root.mkdir(b"usr").unwrap();
        let usr = root.root.lookup(b"usr").unwrap();
        usr.create(b"bin").unwrap();
        let node = root.resolve(b"usr\0bin").unwrap();
        assert_eq!(node.node_type(), NodeKind::File);
    }

    #[test]
    fn resolve_through_non_folder_fails() {
        let root = fresh_root();
        root.root.create(b"a.txt").unwrap();
        assert!(matches!(
            root.resolve(b"a.txt\0b"),
            Err(KernelError::FsError(FsError::TraverseNonFolder))
        ));
    }

    #[test]
    fn mount_composition_routes_to_mounted_root() {
        let mut root = fresh_root();
        let mnt = ramfs::RamDirectory::new();
        mnt.create(b"hello").unwrap();
        root.mount(b"mnt", mnt).unwrap();
        let node = root.resolve(b"mnt\0hello").unwrap();
        assert_eq!(node.node_type(), NodeKind::File);
    }

    #[test]
    fn duplicate_mount_path_rejected() {
        let mut root = fresh_root();
        root.mount(b"mnt", ramfs::RamDirectory::new()).unwrap();
        assert!(root.mount(b"mnt", ramfs::RamDirectory::new()).is_err());
    }
}
