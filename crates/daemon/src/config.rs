//! Validated runtime configuration

use std::path::PathBuf;

use url::Url;

use crate::lifecycle::RetryPolicy;
use crate::stream_cache::CacheConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid host {host:?}: {source}")]
    InvalidHost {
        host: String,
        #[source]
        source: url::ParseError,
    },
    #[error("Host {0:?} must use http or https")]
    UnsupportedScheme(String),
    #[error("A mount point is required")]
    MissingMountPoint,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Server base URL, e.g. `http://music.example.com`
    pub host: Url,
    pub user: String,
    pub password: String,
    pub mount_point: PathBuf,
    pub cache: CacheConfig,
    pub unmount: RetryPolicy,
}

impl Config {
    pub fn new(
        host: &str,
        user: impl Into<String>,
        password: impl Into<String>,
        mount_point: impl Into<PathBuf>,
        cache: CacheConfig,
    ) -> Result<Self, ConfigError> {
        let mount_point = mount_point.into();
        if mount_point.as_os_str().is_empty() {
            return Err(ConfigError::MissingMountPoint);
        }

        Ok(Self {
            host: parse_host(host)?,
            user: user.into(),
            password: password.into(),
            mount_point,
            cache,
            unmount: RetryPolicy::default(),
        })
    }
}

/// Parse a server address, assuming `http://` when no scheme is given
pub fn parse_host(host: &str) -> Result<Url, ConfigError> {
    let host = host.trim();
    let candidate = if host.contains("://") {
        host.to_string()
    } else {
        format!("http://{}", host)
    };

    let url = Url::parse(&candidate).map_err(|source| ConfigError::InvalidHost {
        host: host.to_string(),
        source,
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(ConfigError::UnsupportedScheme(host.to_string())),
    }
}
