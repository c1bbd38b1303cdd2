//! Background fetch task: open the right endpoint, read to completion,
//! broadcast to readers, then apply the admission policy.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use catalog::{CatalogError, ContentStream, StreamOptions};
use futures::TryStreamExt;
use tokio::sync::oneshot;
use tokio::time::Instant;

use super::disk::{self, Admission, CacheEntry};
use super::{FetchResult, Inner, MB};
use crate::error::FsError;
use crate::namespace::{ContentKey, ContentKind, File};

/// Minimum interval between download progress log lines
const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Cap on the up-front buffer reservation, since declared sizes may be estimates
const MAX_PREALLOC: u64 = 8 * 1024 * 1024;

impl Inner {
    pub(super) async fn run_fetch(&self, file: File, tx: oneshot::Sender<FetchResult>) {
        let key = file.key();

        let result = self.download(&file, &key).await.map_err(|e| {
            tracing::warn!(key = %key, name = %file.name, error = %e, "Fetch failed");
            FsError::from(e)
        });

        if let Ok(data) = &result {
            self.realized.lock().insert(key.clone(), data.len() as u64);
        }

        // Readers that already gave up dropped their handle; that is fine
        let _ = tx.send(result.clone());

        if let Ok(data) = result {
            self.admit(&key, &file, data).await;
        }

        self.in_flight.lock().remove(&key);
    }

    async fn open_stream(&self, file: &File) -> Result<ContentStream, CatalogError> {
        let catalog = &self.catalog;

        match file.kind {
            ContentKind::CoverArt => {
                tracing::info!(id = %file.id, name = %file.name, "Opening art stream");
                catalog.get_cover_art(&file.id).await
            }
            ContentKind::AudioLossless => match catalog.download(&file.id).await {
                Err(e) if e.is_not_authorized() => {
                    tracing::info!(
                        id = %file.id,
                        name = %file.name,
                        "Download not permitted, opening transcoded audio stream"
                    );
                    catalog.stream(&file.id, &StreamOptions::default()).await
                }
                other => {
                    tracing::info!(id = %file.id, name = %file.name, "Opening audio stream");
                    other
                }
            },
            ContentKind::AudioTranscoded => {
                tracing::info!(id = %file.id, name = %file.name, "Opening transcoded audio stream");
                catalog.stream(&file.id, &StreamOptions::default()).await
            }
            ContentKind::Video => {
                let options = StreamOptions::video(self.config.video_resolution.clone());
                tracing::info!(
                    id = %file.id,
                    name = %file.name,
                    resolution = %self.config.video_resolution,
                    "Opening video stream"
                );
                catalog.stream(&file.id, &options).await
            }
        }
    }

    async fn download(&self, file: &File, key: &ContentKey) -> Result<Bytes, CatalogError> {
        let mut stream = self.open_stream(file).await?;

        let mut buf = BytesMut::with_capacity(file.size.min(MAX_PREALLOC) as usize);
        let mut last_report = Instant::now();

        while let Some(chunk) = stream.try_next().await? {
            buf.extend_from_slice(&chunk);

            if last_report.elapsed() >= PROGRESS_INTERVAL {
                tracing::debug!(
                    key = %key,
                    received_mb = buf.len() as f64 / MB,
                    declared_mb = file.size as f64 / MB,
                    "Download progress"
                );
                last_report = Instant::now();
            }
        }

        tracing::info!(key = %key, name = %file.name, bytes = buf.len(), "Closing stream");
        Ok(buf.freeze())
    }

    async fn admit(&self, key: &ContentKey, file: &File, data: Bytes) {
        let size = data.len() as u64;

        let admission = self.disk.lock().admission(size);
        if admission != Admission::Admit {
            self.log_rejection(key, admission, size);
            return;
        }

        let dir = self.config.dir.clone();
        let prefix = self.config.file_prefix.clone();
        let written =
            tokio::task::spawn_blocking(move || disk::write_temp_file(&dir, &prefix, &data)).await;

        let path = match written {
            Ok(Ok(path)) => path,
            Ok(Err(e)) => {
                let err = FsError::CacheIo(e.to_string());
                tracing::warn!(key = %key, error = %err, "Skipping local cache");
                return;
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache write task failed");
                return;
            }
        };

        // Usage may have changed while writing; the table re-checks the policy
        let mut disk = self.disk.lock();
        match disk.insert(key.clone(), CacheEntry { path, size }) {
            Ok(()) => {
                let usage = disk.usage();
                drop(disk);
                tracing::info!(key = %key, name = %file.name, "Caching file");
                tracing::info!(
                    key = %key,
                    "Cache use: {:.3} / {:.3} MB (+{:.3} MB)",
                    usage as f64 / MB,
                    self.config.budget_mb(),
                    size as f64 / MB
                );
            }
            Err((admission, entry)) => {
                drop(disk);
                self.log_rejection(key, admission, size);
                if let Err(e) = std::fs::remove_file(&entry.path) {
                    tracing::warn!(path = %entry.path.display(), error = %e, "Failed to remove rejected cache file");
                }
            }
        }
    }

    fn log_rejection(&self, key: &ContentKey, admission: Admission, size: u64) {
        let size_mb = size as f64 / MB;
        match admission {
            Admission::Full => tracing::info!(
                key = %key,
                "Cache full ({:.0} MB), skipping local cache",
                self.config.budget_mb()
            ),
            Admission::WouldOverflow => tracing::info!(
                key = %key,
                "File will overflow cache ({:.3} MB), skipping local cache",
                size_mb
            ),
            Admission::TooLarge => tracing::info!(
                key = %key,
                "File too large ({:.3} > {:.0} MB), skipping local cache",
                size_mb,
                self.config.max_item_bytes as f64 / MB
            ),
            Admission::Present | Admission::Closed => {
                tracing::debug!(key = %key, ?admission, "Skipping local cache")
            }
            Admission::Admit => {}
        }
    }
}
