use std::process::ExitCode;

use clap::Parser;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use subfs_daemon::cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("subfs: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(feature = "fuse")]
async fn run(cli: Cli) -> anyhow::Result<()> {
    use std::sync::Arc;

    use anyhow::Context;
    use catalog::SubsonicClient;
    use subfs_daemon::fuse::FuseMounter;
    use subfs_daemon::Controller;

    let config = cli.into_config().context("invalid configuration")?;
    let client = SubsonicClient::new(&config.host, &config.user, &config.password)
        .context("could not build Subsonic client")?;
    let mounter = FuseMounter::current()?;

    Controller::new(config)
        .run(Arc::new(client), &mounter, shutdown_signal())
        .await?;
    Ok(())
}

#[cfg(not(feature = "fuse"))]
async fn run(_cli: Cli) -> anyhow::Result<()> {
    anyhow::bail!("subfs was built without the `fuse` feature")
}

#[cfg_attr(not(feature = "fuse"), allow(dead_code))]
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("subfs: caught signal: interrupt"),
        _ = terminate => tracing::info!("subfs: caught signal: terminated"),
    }
}
