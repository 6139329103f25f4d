use crate::health::{HealthStatus, MountSnapshot};
use crate::watchdog::WatchdogSnapshot;

/// Body of the probe endpoints.
#[derive(Debug, serde::Serialize)]
pub struct ProbeResponse {
    pub status: HealthStatus,
}

/// Body of `GET /status`.
#[derive(Debug, serde::Serialize)]
pub struct StatusResponse {
    pub overall: HealthStatus,
    pub mounts: Vec<MountSnapshot>,
    pub watchdog: WatchdogSnapshot,
}
