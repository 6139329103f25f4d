use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use super::error::{Error, Result};

/// Contents of the TOML config file. Every key is optional.
///
/// ```toml
/// check_interval = "10s"
/// read_timeout = "5s"
///
/// [[mounts]]
/// name = "data"
/// path = "/data"
/// failure_threshold = 5
///
/// [watchdog]
/// enabled = true
/// restart_delay = "1m"
/// ```
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub mounts: Vec<FileMount>,
    pub canary_file: Option<PathBuf>,
    #[serde(with = "humantime_opt")]
    pub check_interval: Option<Duration>,
    #[serde(with = "humantime_opt")]
    pub read_timeout: Option<Duration>,
    pub failure_threshold: Option<u32>,
    pub listen_addr: Option<SocketAddr>,
    pub watchdog: FileWatchdog,
}

#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileMount {
    pub name: Option<String>,
    pub path: PathBuf,
    pub canary_file: Option<PathBuf>,
    pub failure_threshold: Option<u32>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileWatchdog {
    pub enabled: Option<bool>,
    #[serde(with = "humantime_opt")]
    pub restart_delay: Option<Duration>,
    pub max_retries: Option<u32>,
    #[serde(with = "humantime_opt")]
    pub initial_backoff: Option<Duration>,
    #[serde(with = "humantime_opt")]
    pub max_backoff: Option<Duration>,
    pub grace_period: Option<u32>,
}

impl FileConfig {
    pub fn read(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| Error::Read {
            path: path.to_path_buf(),
            source,
        })?;
        contents.parse::<Self>().map_err(|err| match err {
            Error::Parse { source, .. } => Error::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }
}

impl FromStr for FileConfig {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|source| Error::Parse {
            path: PathBuf::new(),
            source,
        })
    }
}

/// Optional durations written in humantime syntax, e.g. `"1m 30s"`.
mod humantime_opt {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|s| humantime::parse_duration(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
