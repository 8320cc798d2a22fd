//! RAM-backed filesystem driver.
//!
//! The only concrete VFS driver this kernel ships; every other backing
//! store (block devices, networked filesystems) is out of core scope.
//! Grounded on the teacher's `fs::ramfs::RamNode` (`RwLock<Vec<u8>>` for
//! file data, `RwLock<BTreeMap<String, Arc<RamNode>>>` for directory
//! children), adapted to the GUID-keyed [`VfsNode`] trait.

use alloc::{
    collections::BTreeMap,
    string::{String, ToString},
    sync::Arc,
    vec::Vec,
};

use spin::RwLock;

use crate::error::{FsError, KernelError, KernelResult};

use super::{
    guid::{Guid, GUID_FOLDER, GUID_IDENTIFY, GUID_STREAM, GUID_SYMBOLIC_LINK},
    node::{NodeKind, NodeLifecycle, VfsNode},
};

/// A RAM-backed file: an in-memory byte buffer behind the `Stream`
/// interface.
pub struct RamFile {
    lifecycle: NodeLifecycle,
    data: RwLock<Vec<u8>>,
}

impl RamFile {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            lifecycle: NodeLifecycle::new(),
            data: RwLock::new(Vec::new()),
        })
    }
}

impl VfsNode for RamFile {
    fn node_type(&self) -> NodeKind {
        NodeKind::File
    }

    fn lifecycle(&self) -> &NodeLifecycle {
        &self.lifecycle
    }

    fn supports(&self, guid: Guid) -> bool {
        guid == GUID_IDENTIFY || guid == GUID_STREAM
    }

    fn read(&self, offset: u64, buf: &mut [u8]) -> KernelResult<usize> {
        let data = self.data.read();
        let offset = offset as usize;
        if offset >= data.len() {
            return Err(KernelError::FsError(FsError::EndOfFile));
        }
        let available = &data[offset..];
        let count = available.len().min(buf.len());
        buf[..count].copy_from_slice(&available[..count]);
        Ok(count)
    }

    fn write(&self, offset: u64, input: &[u8]) -> KernelResult<usize> {
        let mut data = self.data.write();
        let offset = offset as usize;
        let end = offset
            .checked_add(input.len())
            .ok_or(KernelError::InvalidArgument {
                name: "offset",
                value: "overflows when added to write length",
            })?;
        if data.len() < end {
            data.resize(end, 0);
        }
        data[offset..end].copy_from_slice(input);
        Ok(input.len())
    }

    fn stream_size(&self) -> KernelResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn truncate(&self, size: u64) -> KernelResult<()> {
        self.data.write().resize(size as usize, 0);
        Ok(())
    }
}

/// A RAM-backed symbolic link: an immutable target path behind the
/// `SymbolicLink` interface.
pub struct RamSymlink {
    lifecycle: NodeLifecycle,
    target: Vec<u8>,
}

impl RamSymlink {
    pub fn new(target: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            lifecycle: NodeLifecycle::new(),
            target,
        })
    }
}

impl VfsNode for RamSymlink {
    fn node_type(&self) -> NodeKind {
        NodeKind::Symlink
    }

    fn lifecycle(&self) -> &NodeLifecycle {
        &self.lifecycle
    }

    fn supports(&self, guid: Guid) -> bool {
        guid == GUID_IDENTIFY || guid == GUID_SYMBOLIC_LINK
    }

    fn read_link(&self) -> KernelResult<Vec<u8>> {
        Ok(self.target.clone())
    }
}

/// A RAM-backed directory: a name-keyed child table behind the `Folder`
/// interface.
pub struct RamDirectory {
    lifecycle: NodeLifecycle,
    children: RwLock<BTreeMap<String, Arc<dyn VfsNode>>>,
}

impl RamDirectory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            lifecycle: NodeLifecycle::new(),
            children: RwLock::new(BTreeMap::new()),
        })
    }

    fn name_key(name: &[u8]) -> KernelResult<String> {
        core::str::from_utf8(name)
            .map(ToString::to_string)
            .map_err(|_| KernelError::InvalidArgument {
                name: "name",
                value: "not valid UTF-8",
            })
    }
}

impl VfsNode for RamDirectory {
    fn node_type(&self) -> NodeKind {
        NodeKind::Directory
    }

    fn lifecycle(&self) -> &NodeLifecycle {
        &self.lifecycle
    }

    fn supports(&self, guid: Guid) -> bool {
        guid == GUID_IDENTIFY || guid == GUID_FOLDER
    }

    fn lookup(&self, name: &[u8]) -> KernelResult<Arc<dyn VfsNode>> {
        let key = Self::name_key(name)?;
        self.children
            .read()
            .get(&key)
            .cloned()
            .ok_or(KernelError::FsError(FsError::NotFound))
    }

    fn create(&self, name: &[u8]) -> KernelResult<Arc<dyn VfsNode>> {
        let key = Self::name_key(name)?;
        let mut children = self.children.write();
        if children.contains_key(&key) {
            return Err(KernelError::FsError(FsError::AlreadyExists));
        }
        let file: Arc<dyn VfsNode> = RamFile::new();
        children.insert(key, file.clone());
        Ok(file)
    }

    fn mkdir(&self, name: &[u8]) -> KernelResult<Arc<dyn VfsNode>> {
        let key = Self::name_key(name)?;
        let mut children = self.children.write();
        if children.contains_key(&key) {
            return Err(KernelError::FsError(FsError::AlreadyExists));
        }
        let dir: Arc<dyn VfsNode> = RamDirectory::new();
        children.insert(key, dir.clone());
        Ok(dir)
    }

    /// Create a symbolic link named `name` pointing at `target`.
    fn symlink(&self, name: &[u8], target: &[u8]) -> KernelResult<Arc<dyn VfsNode>> {
        let key = Self::name_key(name)?;
        let mut children = self.children.write();
        if children.contains_key(&key) {
            return Err(KernelError::FsError(FsError::AlreadyExists));
        }
        let link: Arc<dyn VfsNode> = RamSymlink::new(target.to_vec());
        children.insert(key, link.clone());
        Ok(link)
    }

    fn unlink(&self, name: &[u8]) -> KernelResult<()> {
        let key = Self::name_key(name)?;
        let mut children = self.children.write();
        let removed = children.remove(&key).ok_or(KernelError::FsError(FsError::NotFound))?;
        removed.lifecycle().unlink();
        Ok(())
    }

    fn readdir(&self) -> KernelResult<Vec<String>> {
        Ok(self.children.read().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn create_then_lookup_finds_file() {
        let root = RamDirectory::new();
        root.create(b"a.txt").unwrap();
        let found = root.lookup(b"a.txt").unwrap();
        assert_eq!(found.node_type(), NodeKind::File);
    }

    #[test]
    fn duplicate_create_fails() {
        let root = RamDirectory::new();
        root.create(b"a.txt").unwrap();
        assert!(matches!(
            root.create(b"a.txt"),
            Err(KernelError::FsError(FsError::AlreadyExists))
        ));
    }

    #[test]
    fn write_then_read_roundtrips() {
        let file = RamFile::new();
        file.write(0, b"hello").unwrap();
        let mut buf = [0u8; 5];
        let n = file.read(0, &mut buf).unwrap();
        assert_eq!(n, 5);
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn read_at_or_past_end_yields_end_of_file() {
        let file = RamFile::new();
        file.write(0, b"hi").unwrap();
        let mut buf = [0u8; 4];
        assert!(matches!(
            file.read(10, &mut buf),
            Err(KernelError::FsError(FsError::EndOfFile))
        ));
        assert!(matches!(
            file.read(2, &mut buf),
            Err(KernelError::FsError(FsError::EndOfFile))
        ));
    }

    #[test]
    fn unlink_transitions_node_to_unlinked() {
        let root = RamDirectory::new();
        let file = root.create(b"a.txt").unwrap();
        root.unlink(b"a.txt").unwrap();
        assert_eq!(file.lifecycle().state(), super::super::node::NodeState::Unlinked);
        assert!(root.lookup(b"a.txt").is_err());
    }

    #[test]
    fn symlink_reports_its_target() {
        let root = RamDirectory::new();
        let link = root.symlink(b"l", b"/a.txt").unwrap();
        assert_eq!(link.node_type(), NodeKind::Symlink);
        assert_eq!(link.read_link().unwrap(), b"/a.txt".to_vec());
        assert!(matches!(
            root.symlink(b"l", b"/other"),
            Err(KernelError::FsError(FsError::AlreadyExists))
        ));
    }

    #[test]
    fn readdir_lists_children() {
        let root = RamDirectory::new();
        root.create(b"a.txt").unwrap();
        root.mkdir(b"sub").unwrap();
        let mut names = root.readdir().unwrap();
        names.sort();
        assert_eq!(names, vec!["a.txt".to_string(), "sub".to_string()]);
    }
}
