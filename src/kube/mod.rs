//! Minimal in-cluster Kubernetes API client.
//!
//! Covers exactly what self-remediation needs: checking RBAC, inspecting and
//! deleting the owning pod, and emitting an event. No Kubernetes client library
//! is involved; requests are built by hand against the REST API.
mod classify;
mod client;
mod error;
mod incluster;
mod models;

use std::future::Future;

pub use classify::{ResponseClass, classify_delete, classify_request};
pub use client::K8sClient;
pub use error::{Error, Result};
pub use incluster::{
    SERVICE_ACCOUNT_DIR, ServiceAccount, api_server_url, api_server_url_from_env, is_in_cluster,
};
pub use models::{EVENT_SOURCE_COMPONENT, RESTART_EVENT_REASON, RestartEvent};

/// Result of a successful pod deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The API server accepted the deletion.
    Deleted,
    /// The pod was already gone or terminating.
    AlreadyGone,
}

/// The Kubernetes operations the watchdog depends on.
pub trait KubeApi: Send + Sync + 'static {
    /// Returns true if in-cluster credentials are available.
    fn is_in_cluster(&self) -> bool;

    /// Asks the API server whether this service account may delete pods in its
    /// namespace.
    fn can_delete_pods(&self) -> impl Future<Output = Result<bool>> + Send;

    /// Deletes a pod. 404 and 409 yield [`DeleteOutcome::AlreadyGone`].
    fn delete_pod(&self, name: &str) -> impl Future<Output = Result<DeleteOutcome>> + Send;

    /// Returns true if the pod has a deletion timestamp or no longer exists.
    fn is_pod_terminating(&self, name: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Records a `WatchdogRestart` warning event on the pod.
    fn create_event(&self, event: &RestartEvent) -> impl Future<Output = Result<()>> + Send;
}
