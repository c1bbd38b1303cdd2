//! In-process catalog used by the integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use catalog::{
    Artist, Catalog, CatalogError, CatalogId, Child, ContentStream, Index, MusicDirectory,
    StreamOptions,
};
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::Notify;

use subfs_daemon::namespace::{ContentKind, File};
use subfs_daemon::stream_cache::{CacheConfig, StreamCache};

#[derive(Debug, Default)]
pub struct Calls {
    pub ping: AtomicUsize,
    pub indexes: AtomicUsize,
    pub directory: AtomicUsize,
    pub stream: AtomicUsize,
    pub download: AtomicUsize,
    pub cover_art: AtomicUsize,
}

impl Calls {
    /// Content requests of any kind
    pub fn content(&self) -> usize {
        self.stream.load(Ordering::SeqCst)
            + self.download.load(Ordering::SeqCst)
            + self.cover_art.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct FakeCatalog {
    pub calls: Calls,
    indexes: Mutex<Vec<Index>>,
    directories: Mutex<HashMap<CatalogId, MusicDirectory>>,
    content: Mutex<HashMap<CatalogId, Bytes>>,
    /// Delay before a content stream is returned
    delay: Mutex<Duration>,
    /// When set, content requests wait for a notification first
    gate: Mutex<Option<Arc<Notify>>>,
    pub last_stream_options: Mutex<Option<StreamOptions>>,
    pub download_forbidden: AtomicBool,
    pub offline: AtomicBool,
}

impl FakeCatalog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_indexes(&self, indexes: Vec<Index>) -> &Self {
        *self.indexes.lock() = indexes;
        self
    }

    pub fn with_directory(&self, dir: MusicDirectory) -> &Self {
        self.directories.lock().insert(dir.id.clone(), dir);
        self
    }

    pub fn with_content(&self, id: i64, data: impl Into<Bytes>) -> &Self {
        self.content.lock().insert(CatalogId::from(id), data.into());
        self
    }

    pub fn with_delay(&self, delay: Duration) -> &Self {
        *self.delay.lock() = delay;
        self
    }

    /// Hold every content request until the returned handle is notified
    pub fn gated(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock() = Some(Arc::clone(&gate));
        gate
    }

    fn check_online(&self) -> Result<(), CatalogError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(CatalogError::Api {
                code: 0,
                message: "server offline".to_string(),
            })
        } else {
            Ok(())
        }
    }

    async fn open(&self, id: &CatalogId) -> Result<ContentStream, CatalogError> {
        self.check_online()?;

        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let data = self
            .content
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::Api {
                code: 70,
                message: format!("no content for {}", id),
            })?;

        // Two chunks, so readers see a stream rather than a single buffer
        let mid = data.len() / 2;
        let chunks = vec![Ok(data.slice(..mid)), Ok(data.slice(mid..))];
        Ok(futures::stream::iter(chunks).boxed())
    }
}

#[async_trait]
impl Catalog for FakeCatalog {
    async fn ping(&self) -> Result<(), CatalogError> {
        self.calls.ping.fetch_add(1, Ordering::SeqCst);
        self.check_online()
    }

    async fn get_indexes(&self) -> Result<Vec<Index>, CatalogError> {
        self.calls.indexes.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        Ok(self.indexes.lock().clone())
    }

    async fn get_music_directory(&self, id: &CatalogId) -> Result<MusicDirectory, CatalogError> {
        self.calls.directory.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        self.directories
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::Api {
                code: 70,
                message: format!("directory {} not found", id),
            })
    }

    async fn stream(
        &self,
        id: &CatalogId,
        options: &StreamOptions,
    ) -> Result<ContentStream, CatalogError> {
        self.calls.stream.fetch_add(1, Ordering::SeqCst);
        *self.last_stream_options.lock() = Some(options.clone());
        self.open(id).await
    }

    async fn download(&self, id: &CatalogId) -> Result<ContentStream, CatalogError> {
        self.calls.download.fetch_add(1, Ordering::SeqCst);
        if self.download_forbidden.load(Ordering::SeqCst) {
            return Err(CatalogError::from_api(
                50,
                "User is not authorized for the given operation.",
            ));
        }
        self.open(id).await
    }

    async fn get_cover_art(&self, id: &CatalogId) -> Result<ContentStream, CatalogError> {
        self.calls.cover_art.fetch_add(1, Ordering::SeqCst);
        self.open(id).await
    }
}

pub fn index(name: &str, artists: &[(i64, &str)]) -> Index {
    Index {
        name: name.to_string(),
        artist: artists
            .iter()
            .map(|(id, name)| Artist {
                id: CatalogId::from(*id),
                name: name.to_string(),
            })
            .collect(),
    }
}

pub fn album(id: i64, title: &str) -> Child {
    Child {
        id: CatalogId::from(id),
        is_dir: true,
        title: title.to_string(),
        ..Default::default()
    }
}

pub fn track(id: i64, track: u32, title: &str, suffix: &str, size: u64) -> Child {
    Child {
        id: CatalogId::from(id),
        title: title.to_string(),
        track: Some(track),
        suffix: suffix.to_string(),
        size: Some(size),
        ..Default::default()
    }
}

pub fn file(id: i64, kind: ContentKind, size: u64) -> File {
    File {
        id: CatalogId::from(id),
        name: format!("{}-{}", kind, id),
        path: format!("/test/{}-{}", kind, id),
        size,
        size_is_exact: kind == ContentKind::AudioLossless,
        created: UNIX_EPOCH,
        kind,
    }
}

/// Cache configuration writing into `dir`
pub fn cache_config(dir: &std::path::Path) -> CacheConfig {
    CacheConfig {
        dir: dir.to_path_buf(),
        file_prefix: "subfs-test-".to_string(),
        ..Default::default()
    }
}

/// Wait until no fetch is in flight, i.e. every admission decision was made
pub async fn settle(cache: &StreamCache) {
    for _ in 0..500 {
        if cache.stats().in_flight == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("fetches did not settle: {:?}", cache.stats());
}
