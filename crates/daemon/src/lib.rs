//! subfs: a read-only FUSE filesystem over a Subsonic media library
//!
//! The namespace and stream cache are transport-free; the `fuse` feature adds
//! the kernel bridge built on `fuser`.

pub mod adapter;
pub mod cli;
pub mod config;
pub mod error;
#[cfg(feature = "fuse")]
pub mod fuse;
pub mod lifecycle;
pub mod namespace;
pub mod state;
pub mod stream_cache;

pub use adapter::{MountAdapter, NodeAttr, NodeKind, WriteOp};
pub use config::{Config, ConfigError};
pub use error::FsError;
pub use lifecycle::{Controller, LifecycleError, MountHandle, Mounter, Phase, RetryPolicy};
pub use state::State;
