use std::path::PathBuf;

use clap::Parser;

use crate::config::{Config, ConfigError};
use crate::stream_cache::{CacheConfig, DEFAULT_VIDEO_RESOLUTION};

/// Mount a Subsonic media library as a read-only filesystem
#[derive(Parser, Debug, Clone)]
#[command(name = "subfs", version, about)]
pub struct Cli {
    /// Subsonic server address (scheme defaults to http)
    #[arg(long, env = "SUBFS_HOST")]
    pub host: String,

    /// Subsonic user name
    #[arg(long, env = "SUBFS_USER")]
    pub user: String,

    /// Subsonic password
    #[arg(long, env = "SUBFS_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Directory to mount the library at
    #[arg(long, env = "SUBFS_MOUNT")]
    pub mount: PathBuf,

    /// Disk cache budget in megabytes
    #[arg(long, env = "SUBFS_CACHE", default_value_t = 100)]
    pub cache: u64,

    /// Directory for cached files (default: the OS temp directory)
    #[arg(long, env = "SUBFS_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Resolution requested for transcoded video streams
    #[arg(long, env = "SUBFS_VIDEO_SIZE", default_value = DEFAULT_VIDEO_RESOLUTION)]
    pub video_size: String,
}

impl Cli {
    pub fn into_config(self) -> Result<Config, ConfigError> {
        let mut cache = CacheConfig::with_budget_mb(self.cache);
        if let Some(dir) = self.cache_dir {
            cache.dir = dir;
        }
        cache.video_resolution = self.video_size;

        Config::new(&self.host, self.user, self.password, self.mount, cache)
    }
}
