use std::fmt;

/// Health classification of a single mount.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// No check has completed yet.
    #[default]
    Unknown,
    /// The last check succeeded.
    Healthy,
    /// At least one check failed, but fewer than the failure threshold.
    Degraded,
    /// The failure threshold has been reached.
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Unknown => "unknown",
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }

    /// Computes the status following a check.
    ///
    /// # Arguments
    ///
    /// * `success` - Whether the check succeeded.
    /// * `failure_count` - Consecutive failures including this check.
    /// * `failure_threshold` - Failures required before a mount is unhealthy.
    pub fn after_check(success: bool, failure_count: u32, failure_threshold: u32) -> Self {
        if success {
            HealthStatus::Healthy
        } else if failure_count >= failure_threshold {
            HealthStatus::Unhealthy
        } else {
            HealthStatus::Degraded
        }
    }

    /// Aggregates many mount statuses into one.
    ///
    /// The worst status wins; `Unknown` ranks below `Degraded` but above `Healthy`.
    /// An empty set is `Unknown`.
    pub fn overall<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = HealthStatus>,
    {
        let mut overall: Option<HealthStatus> = None;
        for status in statuses {
            overall = Some(match overall {
                None => status,
                Some(current) if status.severity() > current.severity() => status,
                Some(current) => current,
            });
        }
        overall.unwrap_or_default()
    }

    fn severity(&self) -> u8 {
        match self {
            HealthStatus::Healthy => 0,
            HealthStatus::Unknown => 1,
            HealthStatus::Degraded => 2,
            HealthStatus::Unhealthy => 3,
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a [`StateTransition`](super::StateTransition) happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionTrigger {
    CheckPassed,
    CheckFailed,
    Recovered,
}

impl TransitionTrigger {
    /// Labels a status change.
    ///
    /// `Recovered` is reserved for `Unhealthy -> Healthy`.
    pub fn classify(previous: HealthStatus, success: bool) -> Self {
        match (previous, success) {
            (HealthStatus::Unhealthy, true) => TransitionTrigger::Recovered,
            (_, true) => TransitionTrigger::CheckPassed,
            (_, false) => TransitionTrigger::CheckFailed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionTrigger::CheckPassed => "check_passed",
            TransitionTrigger::CheckFailed => "check_failed",
            TransitionTrigger::Recovered => "recovered",
        }
    }
}

impl fmt::Display for TransitionTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
