//! Read-only filesystem surface consumed by the kernel bridge
//!
//! The adapter knows nothing about FUSE; it answers root/attr/lookup/readdir/
//! read in terms of namespace nodes and rejects every mutating operation.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::FsError;
use crate::namespace::{Directory, Entry, File, Node};
use crate::state::State;

/// Directory permissions (r-xr-xr-x)
pub const DIR_PERM: u16 = 0o555;

/// File permissions (r--r--r--)
pub const FILE_PERM: u16 = 0o444;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Directory,
    RegularFile,
}

/// Attributes reported for a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeAttr {
    pub kind: NodeKind,
    pub perm: u16,
    pub size: u64,
    pub mtime: SystemTime,
    /// False while the size is an estimate (or unknown) rather than the real length
    pub size_is_exact: bool,
}

/// Mutating operations, all of which are refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    Create,
    Mknod,
    Mkdir,
    Unlink,
    Rmdir,
    Rename,
    Link,
    Symlink,
    Setattr,
    Setxattr,
    Removexattr,
    Write,
    Fsync,
}

impl fmt::Display for WriteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WriteOp::Create => "create",
            WriteOp::Mknod => "mknod",
            WriteOp::Mkdir => "mkdir",
            WriteOp::Unlink => "unlink",
            WriteOp::Rmdir => "rmdir",
            WriteOp::Rename => "rename",
            WriteOp::Link => "link",
            WriteOp::Symlink => "symlink",
            WriteOp::Setattr => "setattr",
            WriteOp::Setxattr => "setxattr",
            WriteOp::Removexattr => "removexattr",
            WriteOp::Write => "write",
            WriteOp::Fsync => "fsync",
        };
        f.write_str(name)
    }
}

/// An open file; the content is fetched once, on the first read
#[derive(Debug)]
struct OpenFile {
    file: File,
    content: Option<Bytes>,
}

#[derive(Debug, Clone)]
pub struct MountAdapter {
    state: State,
    mounted_at: SystemTime,
    handles: Arc<Mutex<HashMap<u64, OpenFile>>>,
    next_handle: Arc<AtomicU64>,
}

impl MountAdapter {
    pub fn new(state: State) -> Self {
        Self {
            state,
            mounted_at: SystemTime::now(),
            handles: Arc::new(Mutex::new(HashMap::new())),
            next_handle: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn root(&self) -> Directory {
        self.state.namespace().root()
    }

    pub fn attr(&self, node: &Node) -> NodeAttr {
        match node {
            Node::Directory(_) => NodeAttr {
                kind: NodeKind::Directory,
                perm: DIR_PERM,
                size: 0,
                mtime: self.mounted_at,
                size_is_exact: true,
            },
            Node::File(file) => {
                let realized = self.state.cache().realized_size(&file.key());
                NodeAttr {
                    kind: NodeKind::RegularFile,
                    perm: FILE_PERM,
                    size: realized.unwrap_or(file.size),
                    mtime: file.created,
                    size_is_exact: realized.is_some() || file.size_is_exact,
                }
            }
        }
    }

    /// Resolve `name` in the latest listing of `dir`
    pub fn lookup(&self, dir: &Directory, name: &str) -> Result<Node, FsError> {
        self.state.namespace().lookup(dir, name)
    }

    /// List `dir`, replacing its name table
    pub async fn read_dir(&self, dir: &Directory) -> Result<Vec<Entry>, FsError> {
        self.state.namespace().list_directory(dir).await
    }

    /// Open `file` for reading and return its handle
    pub fn open(&self, file: File) -> u64 {
        let fh = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.handles.lock().insert(fh, OpenFile { file, content: None });
        fh
    }

    /// Read up to `size` bytes at `offset` through an open handle; empty past the end
    ///
    /// The first read fetches the whole content and keeps it on the handle, so
    /// later reads are slices of the same buffer.
    pub async fn read(
        &self,
        fh: u64,
        offset: u64,
        size: u32,
        cancel: &CancellationToken,
    ) -> Result<Bytes, FsError> {
        let (file, buffered) = {
            let handles = self.handles.lock();
            let open = handles.get(&fh).ok_or(FsError::BadHandle(fh))?;
            (open.file.clone(), open.content.clone())
        };

        let data = match buffered {
            Some(data) => data,
            None => {
                let data = self.read_all(&file, cancel).await?;
                // The handle may have been released while the fetch was running
                if let Some(open) = self.handles.lock().get_mut(&fh) {
                    open.content.get_or_insert_with(|| data.clone());
                }
                data
            }
        };

        let len = data.len() as u64;
        let start = offset.min(len);
        let end = offset.saturating_add(size as u64).min(len);
        Ok(data.slice(start as usize..end as usize))
    }

    /// Drop a handle and its buffered content
    pub fn release(&self, fh: u64) {
        self.handles.lock().remove(&fh);
    }

    pub fn open_handles(&self) -> usize {
        self.handles.lock().len()
    }

    pub async fn read_all(&self, file: &File, cancel: &CancellationToken) -> Result<Bytes, FsError> {
        self.state.cache().fetch(file, cancel).await
    }

    /// Refuse a mutating operation
    pub fn reject(&self, op: WriteOp) -> FsError {
        tracing::debug!(op = %op, "Rejected write operation on read-only filesystem");
        FsError::ReadOnly
    }
}
