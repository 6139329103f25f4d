use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::timer::RestartTimer;
use crate::health::{HealthStatus, Mount};

/// Phase of the watchdog state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchdogPhase {
    /// Remediation is unavailable; notifications are ignored.
    Disabled,
    /// Waiting for a mount to become unhealthy.
    Armed,
    /// A mount is unhealthy and the restart delay is running.
    PendingRestart,
    /// The pod restart is in progress or done.
    Triggered,
}

impl WatchdogPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            WatchdogPhase::Disabled => "disabled",
            WatchdogPhase::Armed => "armed",
            WatchdogPhase::PendingRestart => "pending_restart",
            WatchdogPhase::Triggered => "triggered",
        }
    }
}

impl fmt::Display for WatchdogPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable watchdog state. Only ever accessed through the watchdog's mutex.
#[derive(Debug)]
pub(crate) struct WatchdogState {
    pub phase: WatchdogPhase,
    pub pending_mount: Option<Arc<Mount>>,
    pub unhealthy_since: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub last_error: Option<String>,
    /// Bumped whenever a pending restart starts or is cancelled. A timer
    /// callback carrying an older generation must not act.
    pub generation: u64,
    pub timer: Option<RestartTimer>,
    /// Every mount whose last reported status is `Unhealthy`, with the time it
    /// became unhealthy. Kept up to date in all phases except `Disabled`.
    pub unhealthy: Vec<(Arc<Mount>, DateTime<Utc>)>,
}

impl WatchdogState {
    pub fn new(phase: WatchdogPhase) -> Self {
        Self {
            phase,
            pending_mount: None,
            unhealthy_since: None,
            retry_count: 0,
            last_error: None,
            generation: 0,
            timer: None,
            unhealthy: Vec::new(),
        }
    }

    /// Records the latest status of `mount`.
    pub fn track(&mut self, mount: &Arc<Mount>, status: HealthStatus, at: DateTime<Utc>) {
        let known = self
            .unhealthy
            .iter()
            .position(|(tracked, _)| tracked.path() == mount.path());
        match (status, known) {
            (HealthStatus::Unhealthy, None) => self.unhealthy.push((Arc::clone(mount), at)),
            (HealthStatus::Unhealthy, Some(_)) => {}
            (_, Some(index)) => {
                self.unhealthy.remove(index);
            }
            (_, None) => {}
        }
    }

    /// First tracked mount, other than the pending one, that is still unhealthy.
    pub fn next_unhealthy(&self) -> Option<(Arc<Mount>, DateTime<Utc>)> {
        self.unhealthy
            .iter()
            .find(|(mount, _)| {
                !self.is_pending_for(mount) && mount.status() == HealthStatus::Unhealthy
            })
            .map(|(mount, since)| (Arc::clone(mount), *since))
    }

    /// Returns to `Armed`, dropping any pending restart.
    pub fn rearm(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        self.phase = WatchdogPhase::Armed;
        self.pending_mount = None;
        self.unhealthy_since = None;
        self.generation = self.generation.wrapping_add(1);
    }

    pub fn is_pending_for(&self, mount: &Mount) -> bool {
        self.pending_mount
            .as_ref()
            .is_some_and(|pending| pending.path() == mount.path())
    }

    pub fn snapshot(&self) -> WatchdogSnapshot {
        WatchdogSnapshot {
            phase: self.phase,
            pending_mount: self
                .pending_mount
                .as_ref()
                .map(|mount| mount.path().to_path_buf()),
            unhealthy_since: self.unhealthy_since,
            retry_count: self.retry_count,
            last_error: self.last_error.clone(),
        }
    }
}

/// Point-in-time copy of the watchdog state for reporting.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct WatchdogSnapshot {
    pub phase: WatchdogPhase,
    pub pending_mount: Option<PathBuf>,
    pub unhealthy_since: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub last_error: Option<String>,
}
