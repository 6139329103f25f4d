use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read config file `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file `{path}`: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("no mounts configured")]
    NoMounts,
    #[error("mount path must not be empty")]
    EmptyMountPath,
    #[error("mount `{0}` is configured more than once")]
    DuplicateMount(PathBuf),
    #[error("canary file `{0}` must be a relative path without `..`")]
    InvalidCanaryFile(PathBuf),
    #[error("failure threshold must be at least 1")]
    InvalidFailureThreshold,
    #[error("`{0}` must be greater than zero")]
    ZeroDuration(&'static str),
    #[error("read timeout {read_timeout:?} exceeds check interval {check_interval:?}")]
    ReadTimeoutTooLong {
        read_timeout: Duration,
        check_interval: Duration,
    },
    #[error("max retries must be at least 1")]
    InvalidMaxRetries,
    #[error("initial backoff {initial:?} exceeds max backoff {max:?}")]
    InvalidBackoff { initial: Duration, max: Duration },
}

pub type Result<T> = std::result::Result<T, Error>;
