//! Stream cache behavior against an in-process catalog

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use bytes::Bytes;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use common::{cache_config, file, settle, FakeCatalog};
use subfs_daemon::namespace::ContentKind;
use subfs_daemon::stream_cache::{StreamCache, MAX_CACHEABLE_BYTES};
use subfs_daemon::FsError;

fn payload(len: usize) -> Bytes {
    Bytes::from((0..len).map(|i| (i % 251) as u8).collect::<Vec<u8>>())
}

#[tokio::test]
async fn test_concurrent_fetches_share_one_upstream_request() {
    let dir = TempDir::new().unwrap();
    let fake = FakeCatalog::new();
    fake.with_content(7, payload(4096))
        .with_delay(Duration::from_millis(100));
    let cache = StreamCache::new(fake.clone(), cache_config(dir.path()));
    let target = file(7, ContentKind::AudioLossless, 4096);

    let reads = (0..8).map(|_| {
        let cache = cache.clone();
        let target = target.clone();
        tokio::spawn(async move { cache.fetch(&target, &CancellationToken::new()).await })
    });
    let results = futures::future::join_all(reads).await;

    for result in results {
        assert_eq!(result.unwrap().unwrap(), payload(4096));
    }
    assert_eq!(fake.calls.download.load(Ordering::SeqCst), 1);

    settle(&cache).await;
    let again = cache
        .fetch(&target, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(again, payload(4096));
    assert_eq!(fake.calls.download.load(Ordering::SeqCst), 1);
    assert_eq!(cache.stats().upstream_fetches, 1);
    assert!(cache.cached_path(&target.key()).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_joined_reader_retries_after_join_window() {
    let dir = TempDir::new().unwrap();
    let fake = FakeCatalog::new();
    fake.with_content(3, payload(64))
        .with_delay(Duration::from_secs(25));
    let cache = StreamCache::new(fake.clone(), cache_config(dir.path()));
    let target = file(3, ContentKind::AudioTranscoded, 64);

    let start = tokio::time::Instant::now();
    let first = {
        let cache = cache.clone();
        let target = target.clone();
        tokio::spawn(async move { cache.fetch(&target, &CancellationToken::new()).await })
    };
    while cache.stats().in_flight == 0 {
        tokio::task::yield_now().await;
    }

    // Outlasts two join windows, then receives the original fetch's bytes
    let joined = cache
        .fetch(&target, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(joined, payload(64));
    assert_eq!(first.await.unwrap().unwrap(), payload(64));
    assert!(start.elapsed() >= Duration::from_secs(25));
    assert_eq!(fake.calls.stream.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cancelled_reader_leaves_fetch_running() {
    let dir = TempDir::new().unwrap();
    let fake = FakeCatalog::new();
    fake.with_content(9, payload(512));
    let gate = fake.gated();
    let cache = StreamCache::new(fake.clone(), cache_config(dir.path()));
    let target = file(9, ContentKind::AudioLossless, 512);

    let token = CancellationToken::new();
    let read = {
        let cache = cache.clone();
        let target = target.clone();
        let token = token.clone();
        tokio::spawn(async move { cache.fetch(&target, &token).await })
    };

    while cache.stats().in_flight == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    token.cancel();
    assert_eq!(read.await.unwrap(), Err(FsError::Interrupted));

    gate.notify_one();
    settle(&cache).await;

    assert!(cache.cached_path(&target.key()).is_some());
    let data = cache
        .fetch(&target, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(data, payload(512));
    assert_eq!(fake.calls.download.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cancelled_joined_reader_leaves_originator_served() {
    let dir = TempDir::new().unwrap();
    let fake = FakeCatalog::new();
    fake.with_content(10, payload(256));
    let gate = fake.gated();
    let cache = StreamCache::new(fake.clone(), cache_config(dir.path()));
    let target = file(10, ContentKind::AudioLossless, 256);

    let first = {
        let cache = cache.clone();
        let target = target.clone();
        tokio::spawn(async move { cache.fetch(&target, &CancellationToken::new()).await })
    };
    while cache.stats().in_flight == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let token = CancellationToken::new();
    let second = {
        let cache = cache.clone();
        let target = target.clone();
        let token = token.clone();
        tokio::spawn(async move { cache.fetch(&target, &token).await })
    };
    // Give the second reader time to join the gated fetch
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!second.is_finished());

    token.cancel();
    assert_eq!(second.await.unwrap(), Err(FsError::Interrupted));

    gate.notify_one();
    assert_eq!(first.await.unwrap().unwrap(), payload(256));
    assert_eq!(fake.calls.download.load(Ordering::SeqCst), 1);
    assert_eq!(cache.stats().upstream_fetches, 1);
}

#[tokio::test]
async fn test_vanished_cache_file_is_refetched() {
    let dir = TempDir::new().unwrap();
    let fake = FakeCatalog::new();
    fake.with_content(4, payload(300));
    let cache = StreamCache::new(fake.clone(), cache_config(dir.path()));
    let target = file(4, ContentKind::AudioLossless, 300);

    cache.fetch(&target, &CancellationToken::new()).await.unwrap();
    settle(&cache).await;

    let path = cache.cached_path(&target.key()).unwrap();
    std::fs::remove_file(&path).unwrap();

    let data = cache
        .fetch(&target, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(data, payload(300));
    assert_eq!(fake.calls.download.load(Ordering::SeqCst), 2);

    settle(&cache).await;
    assert_eq!(cache.usage(), 300);
    assert_eq!(cache.stats().entries, 1);
}

#[tokio::test]
async fn test_unreadable_cache_entry_is_evicted_and_refetched() {
    let dir = TempDir::new().unwrap();
    let fake = FakeCatalog::new();
    fake.with_content(6, payload(200));
    let cache = StreamCache::new(fake.clone(), cache_config(dir.path()));
    let target = file(6, ContentKind::AudioLossless, 200);

    cache.fetch(&target, &CancellationToken::new()).await.unwrap();
    settle(&cache).await;

    // A non-empty directory can be neither read nor removed as a file
    let path = cache.cached_path(&target.key()).unwrap();
    std::fs::remove_file(&path).unwrap();
    std::fs::create_dir(&path).unwrap();
    std::fs::write(path.join("stray"), b"x").unwrap();

    let data = cache
        .fetch(&target, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(data, payload(200));
    assert_eq!(fake.calls.download.load(Ordering::SeqCst), 2);
    assert!(path.is_dir());

    settle(&cache).await;
    assert_ne!(cache.cached_path(&target.key()), Some(path));
    assert_eq!(cache.usage(), 200);
}

#[tokio::test]
async fn test_oversized_content_is_served_but_not_cached() {
    let dir = TempDir::new().unwrap();
    let size = MAX_CACHEABLE_BYTES as usize + 1;
    let fake = FakeCatalog::new();
    fake.with_content(11, Bytes::from(vec![7u8; size]));
    let mut config = cache_config(dir.path());
    config.budget_bytes = 1024 * 1024 * 1024;
    let cache = StreamCache::new(fake.clone(), config);
    let target = file(11, ContentKind::Video, 0);

    let data = cache
        .fetch(&target, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(data.len(), size);

    settle(&cache).await;
    assert!(cache.cached_path(&target.key()).is_none());
    assert_eq!(cache.usage(), 0);
    assert_eq!(cache.realized_size(&target.key()), Some(size as u64));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_usage_never_exceeds_budget() {
    let dir = TempDir::new().unwrap();
    let fake = FakeCatalog::new();
    for id in 1..=3 {
        fake.with_content(id, payload(4));
    }
    let mut config = cache_config(dir.path());
    config.budget_bytes = 10;
    let cache = StreamCache::new(fake.clone(), config);

    for id in 1..=3 {
        let target = file(id, ContentKind::AudioLossless, 4);
        cache.fetch(&target, &CancellationToken::new()).await.unwrap();
        settle(&cache).await;
        assert!(cache.usage() <= 10);
    }

    let stats = cache.stats();
    assert_eq!(stats.entries, 2);
    assert_eq!(stats.usage_bytes, 8);
    assert!(cache
        .cached_path(&file(3, ContentKind::AudioLossless, 4).key())
        .is_none());
}

#[tokio::test]
async fn test_lossless_falls_back_to_stream_when_download_refused() {
    let dir = TempDir::new().unwrap();
    let fake = FakeCatalog::new();
    fake.with_content(5, payload(128));
    fake.download_forbidden.store(true, Ordering::SeqCst);
    let cache = StreamCache::new(fake.clone(), cache_config(dir.path()));

    let data = cache
        .fetch(
            &file(5, ContentKind::AudioLossless, 128),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(data, payload(128));
    assert_eq!(fake.calls.download.load(Ordering::SeqCst), 1);
    assert_eq!(fake.calls.stream.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_variants_of_one_id_are_cached_separately() {
    let dir = TempDir::new().unwrap();
    let fake = FakeCatalog::new();
    fake.with_content(6, payload(32));
    let cache = StreamCache::new(fake.clone(), cache_config(dir.path()));

    let lossless = file(6, ContentKind::AudioLossless, 32);
    let transcoded = file(6, ContentKind::AudioTranscoded, 0);
    cache.fetch(&lossless, &CancellationToken::new()).await.unwrap();
    cache.fetch(&transcoded, &CancellationToken::new()).await.unwrap();
    settle(&cache).await;

    assert_eq!(fake.calls.download.load(Ordering::SeqCst), 1);
    assert_eq!(fake.calls.stream.load(Ordering::SeqCst), 1);
    assert_eq!(cache.stats().entries, 2);
}

#[tokio::test]
async fn test_video_requests_configured_resolution() {
    let dir = TempDir::new().unwrap();
    let fake = FakeCatalog::new();
    fake.with_content(8, payload(16));
    let mut config = cache_config(dir.path());
    config.video_resolution = "640x480".to_string();
    let cache = StreamCache::new(fake.clone(), config);

    cache
        .fetch(&file(8, ContentKind::Video, 0), &CancellationToken::new())
        .await
        .unwrap();

    let options = fake.last_stream_options.lock().clone().unwrap();
    assert_eq!(options.size.as_deref(), Some("640x480"));
}

#[tokio::test]
async fn test_upstream_failure_is_not_cached() {
    let dir = TempDir::new().unwrap();
    let fake = FakeCatalog::new();
    fake.offline.store(true, Ordering::SeqCst);
    let cache = StreamCache::new(fake.clone(), cache_config(dir.path()));
    let target = file(2, ContentKind::CoverArt, 0);

    let err = cache
        .fetch(&target, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, FsError::UpstreamUnavailable(_)));

    settle(&cache).await;
    fake.offline.store(false, Ordering::SeqCst);
    fake.with_content(2, payload(10));
    let data = cache
        .fetch(&target, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(data, payload(10));
    assert_eq!(fake.calls.cover_art.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_shutdown_purges_every_file() {
    let dir = TempDir::new().unwrap();
    let fake = FakeCatalog::new();
    fake.with_content(1, payload(20)).with_content(2, payload(30));
    let cache = StreamCache::new(fake.clone(), cache_config(dir.path()));

    let mut paths = Vec::new();
    for id in 1..=2 {
        let target = file(id, ContentKind::AudioLossless, 0);
        cache.fetch(&target, &CancellationToken::new()).await.unwrap();
        settle(&cache).await;
        paths.push(cache.cached_path(&target.key()).unwrap());
    }
    assert_eq!(cache.usage(), 50);

    let report = cache.shutdown().await;

    assert_eq!(report.removed, 2);
    assert_eq!(report.failed, 0);
    assert_eq!(cache.usage(), 0);
    for path in paths {
        assert!(!path.exists());
    }

    // Content is still served after the purge, but never cached again
    let target = file(3, ContentKind::CoverArt, 0);
    fake.with_content(3, payload(5));
    cache.fetch(&target, &CancellationToken::new()).await.unwrap();
    settle(&cache).await;
    assert!(cache.cached_path(&target.key()).is_none());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}
