//! Pod self-remediation.
//!
//! When a mount stays unhealthy for longer than the restart delay, the
//! [`Watchdog`] deletes its own pod through the Kubernetes API so the
//! controller recreates it with fresh mounts. It only arms when the crate is
//! built with the `watchdog` feature, runs inside a cluster and is allowed to
//! delete pods.
mod backoff;
mod machine;
mod state;
mod timer;

pub use backoff::Backoff;
pub use machine::{
    ExitHook, FALLBACK_EXIT_CODE, Watchdog, WatchdogSettings, WatchdogView, process_exit,
};
pub use state::{WatchdogPhase, WatchdogSnapshot};
pub use timer::RestartTimer;
