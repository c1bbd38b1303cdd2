//! Per-request filesystem errors
//!
//! None of these are fatal to the process; each one degrades the single call
//! that produced it. The FUSE bridge maps them onto errno values.

use catalog::CatalogError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FsError {
    #[error("No such entry: {0}")]
    NotFound(String),
    #[error("Read-only filesystem")]
    ReadOnly,
    #[error("Interrupted")]
    Interrupted,
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("Cache I/O error: {0}")]
    CacheIo(String),
    #[error("Bad file handle: {0}")]
    BadHandle(u64),
}

impl FsError {
    pub fn not_found(name: impl Into<String>) -> Self {
        FsError::NotFound(name.into())
    }
}

impl From<CatalogError> for FsError {
    fn from(err: CatalogError) -> Self {
        FsError::UpstreamUnavailable(err.to_string())
    }
}
