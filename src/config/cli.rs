use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Watches volume mounts and restarts the pod when one stops responding.
///
/// Flags override values from the config file.
#[derive(Parser, Debug, Default)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Path to a TOML config file.
    #[arg(short, long, env = "MOUNT_SENTINEL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Mount path to watch. Repeatable; the environment variable takes a
    /// comma separated list.
    #[arg(long = "mount", env = "MOUNT_SENTINEL_MOUNTS", value_delimiter = ',')]
    pub mounts: Vec<PathBuf>,

    /// Canary file name, relative to each mount.
    #[arg(long, env = "MOUNT_SENTINEL_CANARY_FILE")]
    pub canary_file: Option<PathBuf>,

    /// Time between check passes, e.g. `10s`.
    #[arg(long, env = "MOUNT_SENTINEL_CHECK_INTERVAL", value_parser = humantime::parse_duration)]
    pub check_interval: Option<Duration>,

    /// Deadline for a single canary read.
    #[arg(long, env = "MOUNT_SENTINEL_READ_TIMEOUT", value_parser = humantime::parse_duration)]
    pub read_timeout: Option<Duration>,

    /// Consecutive failures before a mount is unhealthy.
    #[arg(long, env = "MOUNT_SENTINEL_FAILURE_THRESHOLD")]
    pub failure_threshold: Option<u32>,

    /// Address of the status API.
    #[arg(long, env = "MOUNT_SENTINEL_LISTEN_ADDR")]
    pub listen_addr: Option<SocketAddr>,

    /// Enable pod restarts through the Kubernetes API.
    #[arg(long, env = "MOUNT_SENTINEL_WATCHDOG")]
    pub watchdog: bool,

    /// How long a mount must stay unhealthy before the pod is restarted.
    #[arg(long, env = "MOUNT_SENTINEL_RESTART_DELAY", value_parser = humantime::parse_duration)]
    pub restart_delay: Option<Duration>,

    /// Pod deletion attempts before giving up.
    #[arg(long, env = "MOUNT_SENTINEL_MAX_RETRIES")]
    pub max_retries: Option<u32>,

    #[arg(long, env = "MOUNT_SENTINEL_INITIAL_BACKOFF", value_parser = humantime::parse_duration)]
    pub initial_backoff: Option<Duration>,

    #[arg(long, env = "MOUNT_SENTINEL_MAX_BACKOFF", value_parser = humantime::parse_duration)]
    pub max_backoff: Option<Duration>,

    /// Grace period in seconds sent with the pod deletion.
    #[arg(long, env = "MOUNT_SENTINEL_GRACE_PERIOD")]
    pub grace_period: Option<u32>,

    /// Name of the pod this process runs in, usually from the downward API.
    #[arg(long, env = "POD_NAME")]
    pub pod_name: Option<String>,

    /// Namespace of the pod. Defaults to the service account namespace.
    #[arg(long, env = "POD_NAMESPACE")]
    pub pod_namespace: Option<String>,
}
