use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio_util::sync::CancellationToken;

use crate::health::{HealthStatus, Mount};
use crate::watchdog::WatchdogView;

mod models;

pub use models::{ProbeResponse, StatusResponse};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to bind status API to `{addr}`: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("status API failed: {0}")]
    Serve(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Shared, read-only view handed to every handler.
#[derive(Clone)]
pub struct AppState {
    mounts: Arc<[Arc<Mount>]>,
    watchdog: Arc<dyn WatchdogView>,
}

impl AppState {
    pub fn new(mounts: Vec<Arc<Mount>>, watchdog: Arc<dyn WatchdogView>) -> Self {
        Self {
            mounts: mounts.into(),
            watchdog,
        }
    }

    fn statuses(&self) -> impl Iterator<Item = HealthStatus> + '_ {
        self.mounts.iter().map(|mount| mount.status())
    }
}

/// Liveness fails only once a mount is unhealthy.
async fn live(State(state): State<AppState>) -> Response {
    let overall = HealthStatus::overall(state.statuses());
    let code = if state.statuses().any(|s| s == HealthStatus::Unhealthy) {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (code, Json(ProbeResponse { status: overall })).into_response()
}

/// Readiness requires every mount to be healthy.
async fn ready(State(state): State<AppState>) -> Response {
    let overall = HealthStatus::overall(state.statuses());
    let code = if overall == HealthStatus::Healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(ProbeResponse { status: overall })).into_response()
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let mounts: Vec<_> = state.mounts.iter().map(|mount| mount.snapshot()).collect();
    Json(StatusResponse {
        overall: HealthStatus::overall(mounts.iter().map(|mount| mount.status)),
        mounts,
        watchdog: state.watchdog.snapshot(),
    })
}

pub struct APIServer {
    router: axum::Router,
}

impl APIServer {
    pub fn new(state: AppState) -> Self {
        let router = axum::Router::new()
            .route("/healthz/live", get(live))
            .route("/healthz/ready", get(ready))
            .route("/status", get(status))
            .with_state(state);
        Self { router }
    }

    pub fn router(&self) -> axum::Router {
        self.router.clone()
    }

    /// Serves until `cancel` fires, then drains open connections.
    pub async fn listen(self, addr: SocketAddr, cancel: CancellationToken) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| Error::Bind { addr, source })?;
        log::info!(target: "api", "Status API listening: addr={}", addr);
        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(cancel.cancelled_owned())
            .await
            .map_err(Error::Serve)?;
        log::info!(target: "api", "Status API stopped");
        Ok(())
    }
}
