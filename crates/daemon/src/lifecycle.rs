//! Process lifecycle: connect, mount, serve, shut down
//!
//! The controller moves linearly through [`Phase`]s. Connect and mount
//! failures are fatal before anything is served; at shutdown in-flight reads
//! are cancelled, the cache is purged and the unmount is retried on a fixed
//! backoff.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use catalog::{Catalog, CatalogError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::adapter::MountAdapter;
use crate::config::Config;
use crate::state::State;
use crate::stream_cache::PurgeReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Starting,
    Mounted,
    ShuttingDown,
    Unmounted,
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("Could not connect to catalog: {0}")]
    Connect(#[source] CatalogError),

    #[error("Could not mount at {path}: {source}")]
    Mount {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not unmount {path} after {attempts} attempt(s): {source}")]
    Unmount {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },
}

/// Fixed-backoff retry schedule for unmounting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            backoff: Duration::from_secs(3),
        }
    }
}

/// Something that can attach the adapter to a mount point
pub trait Mounter: Send + Sync {
    fn mount(
        &self,
        adapter: MountAdapter,
        mount_point: &Path,
        session: CancellationToken,
    ) -> std::io::Result<Box<dyn MountHandle>>;
}

/// A live mount
pub trait MountHandle: Send {
    fn unmount(&mut self) -> std::io::Result<()>;
}

/// Unmount, retrying on failure per `policy`.
///
/// Returns the number of attempts made on success.
pub async fn unmount_with_retry(
    handle: &mut dyn MountHandle,
    mount_point: &Path,
    policy: &RetryPolicy,
) -> Result<u32, LifecycleError> {
    let mut attempt = 0;
    loop {
        if attempt > 0 {
            tokio::time::sleep(policy.backoff).await;
        }
        attempt += 1;

        match handle.unmount() {
            Ok(()) => return Ok(attempt),
            Err(source) if attempt > policy.retries => {
                tracing::error!(path = %mount_point.display(), "Could not unmount, halting");
                return Err(LifecycleError::Unmount {
                    path: mount_point.to_path_buf(),
                    attempts: attempt,
                    source,
                });
            }
            Err(e) => {
                tracing::warn!(
                    path = %mount_point.display(),
                    error = %e,
                    "Could not unmount, retrying {} of {}",
                    attempt,
                    policy.retries
                );
            }
        }
    }
}

pub struct Controller {
    config: Config,
    phase: watch::Sender<Phase>,
    session: CancellationToken,
}

impl Controller {
    pub fn new(config: Config) -> Self {
        let (phase, _) = watch::channel(Phase::Starting);
        Self {
            config,
            phase,
            session: CancellationToken::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// Observe phase transitions
    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    fn enter(&self, phase: Phase) {
        tracing::debug!(?phase, "Lifecycle transition");
        self.phase.send_replace(phase);
    }

    /// Run the filesystem until `shutdown` resolves.
    pub async fn run<F>(
        &self,
        catalog: Arc<dyn Catalog>,
        mounter: &dyn Mounter,
        shutdown: F,
    ) -> Result<PurgeReport, LifecycleError>
    where
        F: Future<Output = ()>,
    {
        let mount_point = self.config.mount_point.as_path();

        catalog.ping().await.map_err(LifecycleError::Connect)?;
        tracing::info!(host = %self.config.host, user = %self.config.user, "Connected to catalog");

        let state = State::new(catalog, self.config.cache.clone());
        let adapter = MountAdapter::new(state.clone());

        let mut handle = mounter
            .mount(adapter, mount_point, self.session.clone())
            .map_err(|source| LifecycleError::Mount {
                path: mount_point.to_path_buf(),
                source,
            })?;
        self.enter(Phase::Mounted);

        tracing::info!(
            "subfs: {}@{} -> {} [cache: {:.0} MB]",
            self.config.user,
            self.config.host,
            mount_point.display(),
            self.config.cache.budget_mb()
        );

        shutdown.await;

        self.enter(Phase::ShuttingDown);
        self.session.cancel();

        let report = state.cache().shutdown().await;
        tracing::info!("subfs: removed {} cached file(s)", report.removed);

        unmount_with_retry(handle.as_mut(), mount_point, &self.config.unmount).await?;
        self.enter(Phase::Unmounted);

        tracing::info!("subfs: done!");
        Ok(report)
    }
}
