//! Stream cache engine
//!
//! Serves file content through a byte-budgeted disk cache and collapses
//! concurrent fetches of the same content into a single upstream request.
//!
//! # Architecture
//!
//! - `disk`: admitted entries, aggregate usage and the admission policy
//! - `in_flight`: one shared future per content key while its fetch runs;
//!   every reader of that key awaits the same future
//! - `realized`: byte sizes learned from completed fetches
//! - `tasks`: background fetches, which outlive the reads that started them
//!
//! All maps sit behind short-lived `parking_lot` locks that are never held
//! across an await point. Lock order is `in_flight` before `disk`.

mod disk;
mod fetch;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use catalog::Catalog;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::FsError;
use crate::namespace::{ContentKey, File};

pub use disk::{Admission, CacheEntry, DiskCache};

/// Largest item admitted to the disk cache (50 MiB)
pub const MAX_CACHEABLE_BYTES: u64 = 50 * 1024 * 1024;

/// How long a reader waits on someone else's fetch before retrying from the top
pub const JOIN_WINDOW: Duration = Duration::from_secs(10);

/// How long shutdown waits for background fetches before purging
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Default server-side video transcode resolution
pub const DEFAULT_VIDEO_RESOLUTION: &str = "1280x720";

const MB: f64 = 1024.0 * 1024.0;

/// Result shared with every reader of one fetch
type FetchResult = Result<Bytes, FsError>;

/// Shared future for coordinating concurrent fetches of the same key.
type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;

/// Configuration for the stream cache
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Disk cache budget in bytes
    pub budget_bytes: u64,
    /// Per-item ceiling in bytes
    pub max_item_bytes: u64,
    /// Directory holding the cache's temp files
    pub dir: PathBuf,
    /// Temp file name prefix, scoped to this process
    pub file_prefix: String,
    /// Bounded wait for joined fetches
    pub join_window: Duration,
    /// Resolution hint passed to the stream endpoint for videos
    pub video_resolution: String,
    /// Bounded wait for background fetches at shutdown
    pub shutdown_grace: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            budget_bytes: 100 * 1024 * 1024,
            max_item_bytes: MAX_CACHEABLE_BYTES,
            dir: std::env::temp_dir(),
            file_prefix: format!("subfs-{}-", std::process::id()),
            join_window: JOIN_WINDOW,
            video_resolution: DEFAULT_VIDEO_RESOLUTION.to_string(),
            shutdown_grace: SHUTDOWN_GRACE,
        }
    }
}

impl CacheConfig {
    /// Default configuration with a budget given in megabytes
    pub fn with_budget_mb(budget_mb: u64) -> Self {
        Self {
            budget_bytes: budget_mb.saturating_mul(1024 * 1024),
            ..Default::default()
        }
    }

    pub fn budget_mb(&self) -> f64 {
        self.budget_bytes as f64 / MB
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub usage_bytes: u64,
    pub budget_bytes: u64,
    pub in_flight: usize,
    /// Upstream fetches started since creation
    pub upstream_fetches: u64,
}

/// Outcome of a shutdown purge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub removed: usize,
    pub failed: usize,
}

struct Inner {
    catalog: Arc<dyn Catalog>,
    config: CacheConfig,
    disk: Mutex<DiskCache>,
    in_flight: Mutex<HashMap<ContentKey, SharedFetch>>,
    realized: Mutex<HashMap<ContentKey, u64>>,
    tasks: TaskTracker,
    upstream_fetches: AtomicU64,
}

/// What a reader should do after consulting the in-flight table
enum Step {
    /// The content was admitted meanwhile; read it from disk
    Cached,
    Join(SharedFetch),
    Fetch(SharedFetch),
}

/// Content fetcher with request deduplication and a disk cache
#[derive(Clone)]
pub struct StreamCache {
    inner: Arc<Inner>,
}

impl StreamCache {
    pub fn new(catalog: Arc<dyn Catalog>, config: CacheConfig) -> Self {
        let disk = DiskCache::new(config.budget_bytes, config.max_item_bytes);
        Self {
            inner: Arc::new(Inner {
                catalog,
                config,
                disk: Mutex::new(disk),
                in_flight: Mutex::new(HashMap::new()),
                realized: Mutex::new(HashMap::new()),
                tasks: TaskTracker::new(),
                upstream_fetches: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Return the full content of `file`.
    ///
    /// Serves from the disk cache when possible, otherwise joins or starts the
    /// single upstream fetch for the file's content key. Cancelling `cancel`
    /// abandons the wait with [`FsError::Interrupted`]; the fetch itself keeps
    /// running in the background.
    pub async fn fetch(&self, file: &File, cancel: &CancellationToken) -> Result<Bytes, FsError> {
        let key = file.key();

        loop {
            if let Some(data) = self.read_cached(&key).await {
                return Ok(data);
            }

            let (shared, joined) = match self.join_or_start(file, &key) {
                Step::Cached => continue,
                Step::Join(shared) => (shared, true),
                Step::Fetch(shared) => (shared, false),
            };

            let join_window = self.inner.config.join_window;
            let wait = async move {
                if joined {
                    tokio::time::timeout(join_window, shared).await.ok()
                } else {
                    Some(shared.await)
                }
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!(key = %key, "Read interrupted while awaiting fetch");
                    return Err(FsError::Interrupted);
                }
                outcome = wait => match outcome {
                    Some(result) => return result,
                    None => {
                        tracing::debug!(key = %key, "Join window elapsed, retrying");
                    }
                }
            }
        }
    }

    /// Byte size learned from a completed fetch, if any
    pub fn realized_size(&self, key: &ContentKey) -> Option<u64> {
        self.inner.realized.lock().get(key).copied()
    }

    /// Path of the temp file backing a cached entry
    pub fn cached_path(&self, key: &ContentKey) -> Option<PathBuf> {
        self.inner.disk.lock().get(key).map(|entry| entry.path.clone())
    }

    /// Current aggregate size of all cached entries
    pub fn usage(&self) -> u64 {
        self.inner.disk.lock().usage()
    }

    pub fn stats(&self) -> CacheStats {
        let in_flight = self.inner.in_flight.lock().len();
        let disk = self.inner.disk.lock();
        CacheStats {
            entries: disk.len(),
            usage_bytes: disk.usage(),
            budget_bytes: disk.budget(),
            in_flight,
            upstream_fetches: self.inner.upstream_fetches.load(Ordering::Relaxed),
        }
    }

    /// Wait up to the configured grace period for background fetches, then
    /// purge the cache.
    ///
    /// Fetches still running after the grace period are abandoned; the purge
    /// closes the cache so they can no longer admit anything.
    pub async fn shutdown(&self) -> PurgeReport {
        let grace = self.inner.config.shutdown_grace;
        self.inner.tasks.close();
        if tokio::time::timeout(grace, self.inner.tasks.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                pending = self.inner.tasks.len(),
                "Abandoning background fetches"
            );
        }
        self.purge()
    }

    /// Remove every cached file and reset usage to zero
    pub fn purge(&self) -> PurgeReport {
        let entries = self.inner.disk.lock().drain();
        let mut report = PurgeReport::default();

        for entry in entries {
            match std::fs::remove_file(&entry.path) {
                Ok(()) => report.removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => report.removed += 1,
                Err(e) => {
                    tracing::warn!(path = %entry.path.display(), error = %e, "Failed to remove cached file");
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            removed = report.removed,
            failed = report.failed,
            "Purged cached file(s)"
        );
        report
    }

    async fn read_cached(&self, key: &ContentKey) -> Option<Bytes> {
        let entry = self.inner.disk.lock().get(key).cloned()?;

        match tokio::fs::read(&entry.path).await {
            Ok(data) => {
                tracing::trace!(key = %key, bytes = data.len(), "Cache hit");
                Some(Bytes::from(data))
            }
            Err(e) => {
                if e.kind() == std::io::ErrorKind::NotFound {
                    tracing::info!(key = %key, path = %entry.path.display(), "Cache missing");
                } else {
                    let err = FsError::CacheIo(e.to_string());
                    tracing::warn!(key = %key, error = %err, "Evicting unreadable cache entry");
                    if let Err(e) = tokio::fs::remove_file(&entry.path).await {
                        tracing::warn!(path = %entry.path.display(), error = %e, "Failed to remove cached file");
                    }
                }
                self.inner.evict(key, &entry);
                None
            }
        }
    }

    fn join_or_start(&self, file: &File, key: &ContentKey) -> Step {
        let mut in_flight = self.inner.in_flight.lock();

        if let Some(existing) = in_flight.get(key) {
            tracing::debug!(key = %key, "Joining in-flight fetch");
            return Step::Join(existing.clone());
        }

        // The previous fetch may have been admitted after our cache check
        if self.inner.disk.lock().contains(key) {
            return Step::Cached;
        }

        let (tx, rx) = oneshot::channel::<FetchResult>();
        let shared: SharedFetch = async move {
            rx.await
                .unwrap_or_else(|_| Err(FsError::UpstreamUnavailable("fetch abandoned".into())))
        }
        .boxed()
        .shared();

        in_flight.insert(key.clone(), shared.clone());
        drop(in_flight);

        self.inner.upstream_fetches.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::clone(&self.inner);
        let file = file.clone();
        self.inner.tasks.spawn(async move {
            inner.run_fetch(file, tx).await;
        });

        Step::Fetch(shared)
    }
}

impl Inner {
    /// Drop `entry` from the table if it is still the registered one for `key`
    fn evict(&self, key: &ContentKey, entry: &CacheEntry) {
        let mut disk = self.disk.lock();
        if disk.get(key) != Some(entry) {
            return;
        }
        disk.evict(key);
        tracing::info!(
            key = %key,
            "Cache use: {:.3} / {:.3} MB (-{:.3} MB)",
            disk.usage() as f64 / MB,
            self.config.budget_mb(),
            entry.size as f64 / MB
        );
    }
}

impl std::fmt::Debug for StreamCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamCache")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}
