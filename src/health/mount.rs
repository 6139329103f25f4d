use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use super::checker::CheckResult;
use super::error::CheckError;
use super::status::{HealthStatus, TransitionTrigger};

/// A monitored filesystem path and its debounced health state.
///
/// The identity fields are immutable. The state is guarded by a single
/// read/write lock: the monitor is the only writer, the status server and the
/// watchdog only read.
#[derive(Debug)]
pub struct Mount {
    name: Option<String>,
    path: PathBuf,
    canary_path: PathBuf,
    /// `0` means "use the global default".
    failure_threshold: u32,
    state: RwLock<MountState>,
}

#[derive(Debug, Default)]
struct MountState {
    status: HealthStatus,
    failure_count: u32,
    last_check: Option<DateTime<Utc>>,
    last_error: Option<CheckError>,
}

/// A change of a mount's [`HealthStatus`].
#[derive(Debug, Clone)]
pub struct StateTransition {
    pub mount: Arc<Mount>,
    pub timestamp: DateTime<Utc>,
    pub previous: HealthStatus,
    pub current: HealthStatus,
    pub trigger: TransitionTrigger,
}

/// Point-in-time copy of a mount's state, safe to format without holding locks.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct MountSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub path: PathBuf,
    pub status: HealthStatus,
    pub last_check: Option<DateTime<Utc>>,
    pub failure_count: u32,
    pub last_error: Option<String>,
}

impl Mount {
    /// Creates a mount in the `Unknown` state.
    ///
    /// # Arguments
    ///
    /// * `name` - Optional label used in logs and the status API.
    /// * `path` - Mount path.
    /// * `canary_file` - Canary file path relative to `path`.
    /// * `failure_threshold` - Consecutive failures before the mount is unhealthy, `0` to inherit.
    pub fn new(
        name: Option<String>,
        path: impl Into<PathBuf>,
        canary_file: impl AsRef<Path>,
        failure_threshold: u32,
    ) -> Self {
        let path = path.into();
        let canary_path = path.join(canary_file);
        Self {
            name,
            path,
            canary_path,
            failure_threshold,
            state: RwLock::default(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn canary_path(&self) -> &Path {
        &self.canary_path
    }

    /// Human readable identifier: the name if set, the path otherwise.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => self.path.display().to_string(),
        }
    }

    /// Returns the failure threshold, falling back to `default` when unset.
    pub fn effective_threshold(&self, default: u32) -> u32 {
        if self.failure_threshold == 0 {
            default
        } else {
            self.failure_threshold
        }
    }

    /// Applies a check result and returns the transition if the status changed.
    ///
    /// `failure_threshold` must be at least `1`; configuration validation
    /// guarantees this.
    pub fn update_state(
        &self,
        result: &CheckResult,
        failure_threshold: u32,
    ) -> Option<StateTransition> {
        let (previous, current) = {
            let mut state = self.write();
            let previous = state.status;

            state.last_check = Some(result.timestamp);
            if result.success {
                state.failure_count = 0;
                state.last_error = None;
            } else {
                state.failure_count = state.failure_count.saturating_add(1);
                state.last_error = result.error.clone();
            }
            state.status =
                HealthStatus::after_check(result.success, state.failure_count, failure_threshold);

            (previous, state.status)
        };

        if previous == current {
            return None;
        }

        Some(StateTransition {
            mount: Arc::clone(&result.mount),
            timestamp: result.timestamp,
            previous,
            current,
            trigger: TransitionTrigger::classify(previous, result.success),
        })
    }

    pub fn status(&self) -> HealthStatus {
        self.read().status
    }

    pub fn failure_count(&self) -> u32 {
        self.read().failure_count
    }

    pub fn last_check(&self) -> Option<DateTime<Utc>> {
        self.read().last_check
    }

    pub fn last_error(&self) -> Option<CheckError> {
        self.read().last_error.clone()
    }

    pub fn snapshot(&self) -> MountSnapshot {
        let state = self.read();
        MountSnapshot {
            name: self.name.clone(),
            path: self.path.clone(),
            status: state.status,
            last_check: state.last_check,
            failure_count: state.failure_count,
            last_error: state.last_error.as_ref().map(ToString::to_string),
        }
    }

    // Poisoning is ignored, no update leaves the state half-written.
    fn read(&self) -> RwLockReadGuard<'_, MountState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MountState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}
