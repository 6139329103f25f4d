//! Runtime configuration.
//!
//! Values are layered: built-in defaults, then the optional TOML file, then
//! command-line flags and their environment variables.
mod cli;
mod error;
mod file;

use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub use cli::Args;
pub use error::{Error, Result};
pub use file::{FileConfig, FileMount, FileWatchdog};

use crate::health::Mount;

pub const DEFAULT_CANARY_FILE: &str = ".health-check";
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
pub const DEFAULT_LISTEN_ADDR: SocketAddr =
    SocketAddr::new(std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED), 8080);
pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub mounts: Vec<MountConfig>,
    pub canary_file: PathBuf,
    pub check_interval: Duration,
    pub read_timeout: Duration,
    pub failure_threshold: u32,
    pub listen_addr: SocketAddr,
    pub watchdog: WatchdogConfig,
    pub pod_name: Option<String>,
    pub pod_namespace: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountConfig {
    pub name: Option<String>,
    pub path: PathBuf,
    /// Overrides [`Config::canary_file`].
    pub canary_file: Option<PathBuf>,
    /// `0` inherits [`Config::failure_threshold`].
    pub failure_threshold: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchdogConfig {
    pub enabled: bool,
    pub restart_delay: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub grace_period: Option<u32>,
}

impl Config {
    /// Reads the config file named by `args`, if any, applies the flags and
    /// validates the result.
    pub fn load(args: &Args) -> Result<Self> {
        let file = match &args.config {
            Some(path) => FileConfig::read(path)?,
            None => FileConfig::default(),
        };
        let config = Self::merge(file, args);
        config.validate()?;
        Ok(config)
    }

    /// Layers `args` over `file` over the defaults. Mounts given as flags are
    /// appended to those from the file.
    pub fn merge(file: FileConfig, args: &Args) -> Self {
        let mut mounts: Vec<MountConfig> = file
            .mounts
            .into_iter()
            .map(|mount| MountConfig {
                name: mount.name,
                path: mount.path,
                canary_file: mount.canary_file,
                failure_threshold: mount.failure_threshold.unwrap_or(0),
            })
            .collect();
        mounts.extend(args.mounts.iter().map(|path| MountConfig {
            name: None,
            path: path.clone(),
            canary_file: None,
            failure_threshold: 0,
        }));

        let watchdog = WatchdogConfig {
            enabled: args.watchdog || file.watchdog.enabled.unwrap_or(false),
            restart_delay: args
                .restart_delay
                .or(file.watchdog.restart_delay)
                .unwrap_or(DEFAULT_RESTART_DELAY),
            max_retries: args
                .max_retries
                .or(file.watchdog.max_retries)
                .unwrap_or(DEFAULT_MAX_RETRIES),
            initial_backoff: args
                .initial_backoff
                .or(file.watchdog.initial_backoff)
                .unwrap_or(DEFAULT_INITIAL_BACKOFF),
            max_backoff: args
                .max_backoff
                .or(file.watchdog.max_backoff)
                .unwrap_or(DEFAULT_MAX_BACKOFF),
            grace_period: args.grace_period.or(file.watchdog.grace_period),
        };

        Self {
            mounts,
            canary_file: args
                .canary_file
                .clone()
                .or(file.canary_file)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CANARY_FILE)),
            check_interval: args
                .check_interval
                .or(file.check_interval)
                .unwrap_or(DEFAULT_CHECK_INTERVAL),
            read_timeout: args
                .read_timeout
                .or(file.read_timeout)
                .unwrap_or(DEFAULT_READ_TIMEOUT),
            failure_threshold: args
                .failure_threshold
                .or(file.failure_threshold)
                .unwrap_or(DEFAULT_FAILURE_THRESHOLD),
            listen_addr: args
                .listen_addr
                .or(file.listen_addr)
                .unwrap_or(DEFAULT_LISTEN_ADDR),
            watchdog,
            pod_name: non_empty(args.pod_name.clone()),
            pod_namespace: non_empty(args.pod_namespace.clone()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.mounts.is_empty() {
            return Err(Error::NoMounts);
        }
        let mut seen: Vec<&Path> = Vec::with_capacity(self.mounts.len());
        for mount in &self.mounts {
            if mount.path.as_os_str().is_empty() {
                return Err(Error::EmptyMountPath);
            }
            if seen.contains(&mount.path.as_path()) {
                return Err(Error::DuplicateMount(mount.path.clone()));
            }
            seen.push(&mount.path);
            if let Some(canary_file) = &mount.canary_file {
                validate_canary_file(canary_file)?;
            }
        }
        validate_canary_file(&self.canary_file)?;

        if self.failure_threshold == 0 {
            return Err(Error::InvalidFailureThreshold);
        }
        if self.check_interval.is_zero() {
            return Err(Error::ZeroDuration("check_interval"));
        }
        if self.read_timeout.is_zero() {
            return Err(Error::ZeroDuration("read_timeout"));
        }
        if self.read_timeout > self.check_interval {
            return Err(Error::ReadTimeoutTooLong {
                read_timeout: self.read_timeout,
                check_interval: self.check_interval,
            });
        }

        let watchdog = &self.watchdog;
        if watchdog.max_retries == 0 {
            return Err(Error::InvalidMaxRetries);
        }
        if watchdog.initial_backoff.is_zero() {
            return Err(Error::ZeroDuration("initial_backoff"));
        }
        if watchdog.initial_backoff > watchdog.max_backoff {
            return Err(Error::InvalidBackoff {
                initial: watchdog.initial_backoff,
                max: watchdog.max_backoff,
            });
        }
        Ok(())
    }

    /// Creates the mount state objects in configuration order.
    pub fn build_mounts(&self) -> Vec<Arc<Mount>> {
        self.mounts
            .iter()
            .map(|mount| {
                Arc::new(Mount::new(
                    mount.name.clone(),
                    mount.path.clone(),
                    mount.canary_file.as_deref().unwrap_or(&self.canary_file),
                    mount.failure_threshold,
                ))
            })
            .collect()
    }
}

fn validate_canary_file(path: &Path) -> Result<()> {
    let valid = !path.as_os_str().is_empty()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidCanaryFile(path.to_path_buf()))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}
