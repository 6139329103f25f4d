//! Mount health tracking.
//!
//! Every configured mount is probed by reading a small canary file inside it.
//! Results feed a debounced per-mount state machine:
//!
//! - [`Mount`]: holds the health state of one path behind a read/write lock.
//! - [`Checker`]: performs one canary read with a hard deadline.
//! - [`Monitor`]: runs the checker against all mounts on a fixed interval and
//!   reports [`StateTransition`]s to registered [`TransitionObserver`]s.
//!
//! A mount moves from `Unknown` to `Healthy` on the first successful read. Each
//! failed read increments a consecutive failure counter; below the failure
//! threshold the mount is `Degraded`, at or above it `Unhealthy`. One successful
//! read resets the counter and makes it `Healthy` again.
mod checker;
mod error;
mod monitor;
mod mount;
mod status;

pub use checker::{CanaryReader, CheckResult, Checker};
pub use error::CheckError;
pub use monitor::{Monitor, MonitorHandle, TransitionObserver};
pub use mount::{Mount, MountSnapshot, StateTransition};
pub use status::{HealthStatus, TransitionTrigger};
