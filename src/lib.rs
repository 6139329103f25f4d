use std::sync::Arc;

use clap::Parser;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use config::Config;
use health::{Checker, Monitor};
use kube::K8sClient;
use watchdog::{Watchdog, WatchdogSettings};

/// Mount Sentinel: a sidecar that detects hung or broken volume mounts and
/// restarts its pod through the Kubernetes API.
///
/// Each configured mount is probed by reading a canary file with a hard
/// deadline. Consecutive failures make a mount unhealthy; if it stays that way
/// for the restart delay, the watchdog deletes the pod so the controller
/// recreates it with fresh mounts.
pub mod api;
pub mod config;
pub mod error;
pub mod fsutil;
pub mod health;
pub mod kube;
pub mod signals;
pub mod watchdog;

/// Runs mount-sentinel until SIGINT or SIGTERM.
///
/// Parses the configuration, arms the watchdog when possible, starts the status
/// API and the monitor, then waits for a shutdown signal.
///
/// # Errors
///
/// Possible errors include:
/// - An unreadable or invalid configuration.
/// - Failure to bind the status API address.
/// - Failure to install signal handlers.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = config::Args::parse();
    let config = Config::load(&args)?;
    log::debug!("Configuration: {:?}", config);

    let mounts = config.build_mounts();
    let watchdog = Arc::new(build_watchdog(&config).await);
    let cancel = CancellationToken::new();

    let server = api::APIServer::new(api::AppState::new(mounts.clone(), watchdog.clone()));
    let mut api = tokio::spawn(server.listen(config.listen_addr, cancel.child_token()));

    let checker = Checker::new(config.read_timeout);
    let monitor = Monitor::new(
        mounts,
        checker,
        config.check_interval,
        config.failure_threshold,
    )
    .with_observer(watchdog);
    log::info!(
        "Watching {} mount(s): interval={:?}, read_timeout={:?}, failure_threshold={}",
        monitor.mounts().len(),
        config.check_interval,
        config.read_timeout,
        config.failure_threshold
    );
    let monitor = monitor.start(cancel.child_token());

    let mut api_joined = false;
    let result: Result<(), Box<dyn std::error::Error>> = tokio::select! {
        result = signals::wait_for_shutdown() => result.map_err(Into::into),
        result = &mut api => {
            api_joined = true;
            match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(err)) => Err(err.into()),
                Err(err) => Err(err.into()),
            }
        }
    };

    cancel.cancel();
    if let Err(err) = monitor.wait().await {
        log::error!("Monitor task failed: {}", err);
    }
    if !api_joined {
        join_api(api).await;
    }
    log::info!("Shutdown complete");
    result
}

/// Waits for the status API task and logs how it ended. Returns true on a
/// clean exit.
async fn join_api(api: JoinHandle<api::Result<()>>) -> bool {
    match api.await {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            log::error!("Status API failed: {}", err);
            false
        }
        Err(err) => {
            log::error!("Status API task failed: {}", err);
            false
        }
    }
}

/// Builds the watchdog, falling back to a disabled one whenever remediation is
/// not possible.
async fn build_watchdog(config: &Config) -> Watchdog<K8sClient> {
    if !config.watchdog.enabled {
        return Watchdog::disabled("not enabled");
    }
    let Some(pod_name) = config.pod_name.clone() else {
        return Watchdog::disabled("POD_NAME is not set");
    };
    if !kube::is_in_cluster() {
        return Watchdog::disabled("not running inside a Kubernetes cluster");
    }
    let client = match K8sClient::in_cluster(config.pod_namespace.clone()) {
        Ok(client) => client.with_grace_period(config.watchdog.grace_period),
        Err(err) => {
            return Watchdog::disabled(format!("failed to create Kubernetes client: {err}"));
        }
    };

    let settings = WatchdogSettings {
        pod_name,
        pod_namespace: client.namespace().to_owned(),
        restart_delay: config.watchdog.restart_delay,
        max_retries: config.watchdog.max_retries,
        initial_backoff: config.watchdog.initial_backoff,
        max_backoff: config.watchdog.max_backoff,
    };
    Watchdog::arm(Arc::new(client), settings, watchdog::process_exit()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_join_api_reports_finished_failure() {
        let api = tokio::spawn(async {
            Err::<(), _>(api::Error::Serve(std::io::Error::other("listener closed")))
        });
        while !api.is_finished() {
            tokio::task::yield_now().await;
        }
        assert!(!join_api(api).await);
    }

    #[tokio::test]
    async fn test_join_api_clean_exit() {
        let api = tokio::spawn(async { Ok::<(), api::Error>(()) });
        assert!(join_api(api).await);
    }

    #[tokio::test]
    async fn test_build_watchdog_disabled_without_pod_name() {
        let args = config::Args {
            mounts: vec!["/data".into()],
            watchdog: true,
            ..config::Args::default()
        };
        let config = Config::merge(config::FileConfig::default(), &args);
        let config = Config {
            pod_name: None,
            ..config
        };
        let watchdog = build_watchdog(&config).await;
        assert_eq!(watchdog.phase(), watchdog::WatchdogPhase::Disabled);
    }
}
