use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};

/// Reason set on every event emitted for a watchdog restart.
pub const RESTART_EVENT_REASON: &str = "WatchdogRestart";
/// Component reported as the event source.
pub const EVENT_SOURCE_COMPONENT: &str = "mount-sentinel";

/// One remediation attempt, reported to Kubernetes as a `Warning` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartEvent {
    pub timestamp: DateTime<Utc>,
    pub pod_name: String,
    pub pod_namespace: String,
    pub mount_path: PathBuf,
    pub reason: String,
    pub failure_count: u32,
    pub unhealthy_for: Duration,
}

impl RestartEvent {
    /// Human readable event message.
    pub fn message(&self) -> String {
        format!(
            "Restarting pod: mount {} unhealthy for {}s after {} consecutive failed checks: {}",
            self.mount_path.display(),
            self.unhealthy_for.as_secs(),
            self.failure_count,
            self.reason
        )
    }
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SelfSubjectAccessReview<'a> {
    pub api_version: &'static str,
    pub kind: &'static str,
    pub spec: AccessReviewSpec<'a>,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AccessReviewSpec<'a> {
    pub resource_attributes: ResourceAttributes<'a>,
}

#[derive(Debug, serde::Serialize)]
pub(crate) struct ResourceAttributes<'a> {
    pub namespace: &'a str,
    pub verb: &'a str,
    pub resource: &'a str,
}

impl<'a> SelfSubjectAccessReview<'a> {
    pub fn new(namespace: &'a str, verb: &'a str, resource: &'a str) -> Self {
        Self {
            api_version: "authorization.k8s.io/v1",
            kind: "SelfSubjectAccessReview",
            spec: AccessReviewSpec {
                resource_attributes: ResourceAttributes {
                    namespace,
                    verb,
                    resource,
                },
            },
        }
    }
}

#[derive(Debug, Default, serde::Deserialize)]
pub(crate) struct AccessReviewResponse {
    #[serde(default)]
    pub status: AccessReviewStatus,
}

#[derive(Debug, Default, serde::Deserialize)]
pub(crate) struct AccessReviewStatus {
    #[serde(default)]
    pub allowed: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DeleteOptions {
    pub api_version: &'static str,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grace_period_seconds: Option<u32>,
}

impl DeleteOptions {
    pub fn new(grace_period_seconds: Option<u32>) -> Self {
        Self {
            api_version: "v1",
            kind: "DeleteOptions",
            grace_period_seconds,
        }
    }
}

/// The only part of a pod the client cares about.
#[derive(Debug, Default, serde::Deserialize)]
pub(crate) struct Pod {
    #[serde(default)]
    pub metadata: PodMetadata,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PodMetadata {
    #[serde(default)]
    pub deletion_timestamp: Option<String>,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Event {
    pub api_version: &'static str,
    pub kind: &'static str,
    pub metadata: EventMetadata,
    pub involved_object: ObjectReference,
    pub reason: &'static str,
    pub message: String,
    #[serde(rename = "type")]
    pub type_: &'static str,
    pub first_timestamp: String,
    pub last_timestamp: String,
    pub count: u32,
    pub source: EventSource,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EventMetadata {
    pub generate_name: String,
    pub namespace: String,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ObjectReference {
    pub api_version: &'static str,
    pub kind: &'static str,
    pub name: String,
    pub namespace: String,
}

#[derive(Debug, serde::Serialize)]
pub(crate) struct EventSource {
    pub component: &'static str,
}

impl From<&RestartEvent> for Event {
    fn from(event: &RestartEvent) -> Self {
        let timestamp = event.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true);
        Self {
            api_version: "v1",
            kind: "Event",
            metadata: EventMetadata {
                generate_name: format!("{}.", event.pod_name),
                namespace: event.pod_namespace.clone(),
            },
            involved_object: ObjectReference {
                api_version: "v1",
                kind: "Pod",
                name: event.pod_name.clone(),
                namespace: event.pod_namespace.clone(),
            },
            reason: RESTART_EVENT_REASON,
            message: event.message(),
            type_: "Warning",
            first_timestamp: timestamp.clone(),
            last_timestamp: timestamp,
            count: 1,
            source: EventSource {
                component: EVENT_SOURCE_COMPONENT,
            },
        }
    }
}
