//! `fuser::Filesystem` implementation over the mount adapter

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyWrite, Request, TimeOrNow,
};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use super::{errno, InodeTable};
use crate::adapter::{MountAdapter, NodeAttr, NodeKind, WriteOp};
use crate::namespace::{Directory, File, Node};

/// Attribute TTL for entries whose size will not change
const TTL: Duration = Duration::from_secs(1);

const BLOCK_SIZE: u32 = 512;

/// One row of a directory snapshot taken at `opendir`
#[derive(Debug, Clone)]
struct DirRow {
    ino: u64,
    kind: FileType,
    name: String,
}

pub struct SubFs {
    adapter: MountAdapter,
    runtime: Handle,
    /// Parent of every read's cancellation token; cancelled at shutdown
    session: CancellationToken,
    inodes: Arc<Mutex<InodeTable>>,
    dir_handles: Arc<Mutex<HashMap<u64, Vec<DirRow>>>>,
    next_fh: Arc<AtomicU64>,
    uid: u32,
    gid: u32,
}

impl SubFs {
    pub fn new(adapter: MountAdapter, runtime: Handle, session: CancellationToken) -> Self {
        Self {
            adapter,
            runtime,
            session,
            inodes: Arc::new(Mutex::new(InodeTable::new())),
            dir_handles: Arc::new(Mutex::new(HashMap::new())),
            next_fh: Arc::new(AtomicU64::new(1)),
            uid: unsafe { libc::getuid() },
            gid: unsafe { libc::getgid() },
        }
    }

    fn node(&self, ino: u64) -> Option<Node> {
        self.inodes.lock().get(ino).cloned()
    }

    fn directory(&self, ino: u64) -> Result<Directory, i32> {
        match self.node(ino) {
            Some(Node::Directory(dir)) => Ok(dir),
            Some(Node::File(_)) => Err(libc::ENOTDIR),
            None => Err(libc::ENOENT),
        }
    }

    fn file(&self, ino: u64) -> Result<File, i32> {
        match self.node(ino) {
            Some(Node::File(file)) => Ok(file),
            Some(Node::Directory(_)) => Err(libc::EISDIR),
            None => Err(libc::ENOENT),
        }
    }

    fn to_file_attr(&self, ino: u64, attr: &NodeAttr) -> FileAttr {
        let kind = file_type(attr.kind);
        FileAttr {
            ino,
            size: attr.size,
            blocks: attr.size.div_ceil(BLOCK_SIZE as u64),
            atime: attr.mtime,
            mtime: attr.mtime,
            ctime: attr.mtime,
            crtime: UNIX_EPOCH,
            kind,
            perm: attr.perm,
            nlink: if kind == FileType::Directory { 2 } else { 1 },
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: BLOCK_SIZE,
            flags: 0,
        }
    }

    fn reject(&self, op: WriteOp) -> i32 {
        errno(&self.adapter.reject(op))
    }
}

fn file_type(kind: NodeKind) -> FileType {
    match kind {
        NodeKind::Directory => FileType::Directory,
        NodeKind::RegularFile => FileType::RegularFile,
    }
}

/// Estimated sizes are re-read on every stat so the realized size shows up
fn ttl(attr: &NodeAttr) -> Duration {
    if attr.size_is_exact {
        TTL
    } else {
        Duration::ZERO
    }
}

impl Filesystem for SubFs {
    fn destroy(&mut self) {
        tracing::debug!("FUSE session destroyed");
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let dir = match self.directory(parent) {
            Ok(dir) => dir,
            Err(code) => return reply.error(code),
        };
        let Some(name) = name.to_str() else {
            return reply.error(libc::ENOENT);
        };

        match self.adapter.lookup(&dir, name) {
            Ok(node) => {
                let attr = self.adapter.attr(&node);
                let ino = self.inodes.lock().upsert(node);
                reply.entry(&ttl(&attr), &self.to_file_attr(ino, &attr), 0);
            }
            Err(e) => {
                tracing::trace!(parent = %dir.path, name, error = %e, "Lookup failed");
                reply.error(errno(&e));
            }
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        match self.node(ino) {
            Some(node) => {
                let attr = self.adapter.attr(&node);
                reply.attr(&ttl(&attr), &self.to_file_attr(ino, &attr));
            }
            None => reply.error(libc::ENOENT),
        }
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        let dir = match self.directory(ino) {
            Ok(dir) => dir,
            Err(code) => return reply.error(code),
        };

        let adapter = self.adapter.clone();
        let inodes = Arc::clone(&self.inodes);
        let dir_handles = Arc::clone(&self.dir_handles);
        let fh = self.next_fh.fetch_add(1, Ordering::Relaxed);

        self.runtime.spawn(async move {
            let entries = match adapter.read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) => return reply.error(errno(&e)),
            };

            let rows = {
                let mut inodes = inodes.lock();
                let mut rows = Vec::with_capacity(entries.len() + 2);
                rows.push(DirRow {
                    ino,
                    kind: FileType::Directory,
                    name: ".".to_string(),
                });
                rows.push(DirRow {
                    ino: inodes.parent_inode(&dir.path),
                    kind: FileType::Directory,
                    name: "..".to_string(),
                });
                for entry in entries {
                    let kind = if entry.node.is_dir() {
                        FileType::Directory
                    } else {
                        FileType::RegularFile
                    };
                    rows.push(DirRow {
                        ino: inodes.upsert(entry.node),
                        kind,
                        name: entry.name,
                    });
                }
                rows
            };

            dir_handles.lock().insert(fh, rows);
            reply.opened(fh, 0);
        });
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let handles = self.dir_handles.lock();
        let Some(rows) = handles.get(&fh) else {
            return reply.error(libc::EBADF);
        };

        for (i, row) in rows.iter().enumerate().skip(offset.max(0) as usize) {
            if reply.add(row.ino, (i + 1) as i64, row.kind, &row.name) {
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(&mut self, _req: &Request<'_>, _ino: u64, fh: u64, _flags: i32, reply: ReplyEmpty) {
        self.dir_handles.lock().remove(&fh);
        reply.ok();
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let file = match self.file(ino) {
            Ok(file) => file,
            Err(code) => return reply.error(code),
        };

        if flags & libc::O_ACCMODE != libc::O_RDONLY {
            return reply.error(self.reject(WriteOp::Write));
        }

        // Reads must not be clipped at an estimated size
        let attr = self.adapter.attr(&Node::File(file.clone()));
        let open_flags = if attr.size_is_exact {
            0
        } else {
            fuser::consts::FOPEN_DIRECT_IO
        };
        let fh = self.adapter.open(file);
        reply.opened(fh, open_flags);
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        if offset < 0 {
            return reply.error(libc::EINVAL);
        }

        let adapter = self.adapter.clone();
        let cancel = self.session.child_token();

        self.runtime.spawn(async move {
            match adapter.read(fh, offset as u64, size, &cancel).await {
                Ok(data) => reply.data(&data),
                Err(e) => reply.error(errno(&e)),
            }
        });
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        self.adapter.release(fh);
        reply.ok();
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        _size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        reply.error(self.reject(WriteOp::Setattr));
    }

    fn mknod(
        &mut self,
        _req: &Request<'_>,
        _parent: u64,
        _name: &OsStr,
        _mode: u32,
        _umask: u32,
        _rdev: u32,
        reply: ReplyEntry,
    ) {
        reply.error(self.reject(WriteOp::Mknod));
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        _parent: u64,
        _name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        reply.error(self.reject(WriteOp::Mkdir));
    }

    fn unlink(&mut self, _req: &Request<'_>, _parent: u64, _name: &OsStr, reply: ReplyEmpty) {
        reply.error(self.reject(WriteOp::Unlink));
    }

    fn rmdir(&mut self, _req: &Request<'_>, _parent: u64, _name: &OsStr, reply: ReplyEmpty) {
        reply.error(self.reject(WriteOp::Rmdir));
    }

    fn symlink(
        &mut self,
        _req: &Request<'_>,
        _parent: u64,
        _link_name: &OsStr,
        _target: &Path,
        reply: ReplyEntry,
    ) {
        reply.error(self.reject(WriteOp::Symlink));
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        _parent: u64,
        _name: &OsStr,
        _newparent: u64,
        _newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        reply.error(self.reject(WriteOp::Rename));
    }

    fn link(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _newparent: u64,
        _newname: &OsStr,
        reply: ReplyEntry,
    ) {
        reply.error(self.reject(WriteOp::Link));
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _offset: i64,
        _data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        reply.error(self.reject(WriteOp::Write));
    }

    fn fsync(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _datasync: bool, reply: ReplyEmpty) {
        reply.error(self.reject(WriteOp::Fsync));
    }

    fn setxattr(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _name: &OsStr,
        _value: &[u8],
        _flags: i32,
        _position: u32,
        reply: ReplyEmpty,
    ) {
        reply.error(self.reject(WriteOp::Setxattr));
    }

    fn removexattr(&mut self, _req: &Request<'_>, _ino: u64, _name: &OsStr, reply: ReplyEmpty) {
        reply.error(self.reject(WriteOp::Removexattr));
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        _parent: u64,
        _name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        reply.error(self.reject(WriteOp::Create));
    }
}
