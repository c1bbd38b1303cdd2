//! FUSE bridge for the mount adapter
//!
//! # Architecture
//!
//! - `SubFs`: `fuser::Filesystem` implementation that forwards to the adapter
//! - `InodeTable`: inode ↔ path mapping plus the latest node per inode
//! - `FuseMounter`: mounts a session in the background and unmounts it
//!
//! Calls that may reach the network (directory opens and reads) run as tokio
//! tasks and reply from the task, so a slow fetch never blocks the session.

mod inode_table;
mod mount;
mod subfs_fs;

pub use inode_table::InodeTable;
pub use mount::{FuseMount, FuseMounter};
pub use subfs_fs::SubFs;

use libc::c_int;

use crate::error::FsError;

/// Map a filesystem error onto the errno returned to the kernel
pub fn errno(err: &FsError) -> c_int {
    match err {
        FsError::NotFound(_) | FsError::UpstreamUnavailable(_) => libc::ENOENT,
        FsError::ReadOnly => libc::EROFS,
        FsError::Interrupted => libc::EINTR,
        FsError::CacheIo(_) => libc::EIO,
        FsError::BadHandle(_) => libc::EBADF,
    }
}
