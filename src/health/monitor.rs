use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::checker::{CheckResult, Checker};
use super::mount::{Mount, StateTransition};
use super::status::HealthStatus;

/// Receives every status change produced by the [`Monitor`].
///
/// Called synchronously from the monitor loop, in transition order.
/// Implementations must not block; slow work belongs on its own task.
pub trait TransitionObserver: Send + Sync {
    fn on_transition(&self, transition: &StateTransition);
}

/// Periodically checks every mount and applies the results.
pub struct Monitor {
    mounts: Vec<Arc<Mount>>,
    checker: Checker,
    interval: Duration,
    default_threshold: u32,
    observers: Vec<Arc<dyn TransitionObserver>>,
}

impl Monitor {
    /// Creates a monitor.
    ///
    /// # Arguments
    ///
    /// * `mounts` - Mounts in the order they are checked on every pass.
    /// * `checker` - Performs the individual canary reads.
    /// * `interval` - Time between the start of two passes.
    /// * `default_threshold` - Failure threshold for mounts without their own.
    pub fn new(
        mounts: Vec<Arc<Mount>>,
        checker: Checker,
        interval: Duration,
        default_threshold: u32,
    ) -> Self {
        Self {
            mounts,
            checker,
            interval,
            default_threshold,
            observers: Vec::default(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn TransitionObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn mounts(&self) -> &[Arc<Mount>] {
        &self.mounts
    }

    /// Spawns the check loop.
    ///
    /// The first pass runs immediately, then one pass every interval. Passes
    /// never overlap; a pass that outlasts the interval delays the next one.
    pub fn start(self, cancel: CancellationToken) -> MonitorHandle {
        let join = tokio::spawn({
            let cancel = cancel.clone();
            async move { self.run(cancel).await }
        });
        MonitorHandle { cancel, join }
    }

    async fn run(self, cancel: CancellationToken) {
        log::info!(
            target: "monitor",
            "Starting mount monitor: mounts={}, interval={:?}, timeout={:?}",
            self.mounts.len(),
            self.interval,
            self.checker.timeout()
        );
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }
            if !self.run_pass(&cancel).await {
                break;
            }
        }
        log::info!(target: "monitor", "Mount monitor stopped");
    }

    /// Checks every mount once, in order.
    ///
    /// Returns `false` if the pass was interrupted by cancellation. A check cut
    /// short by cancellation is not applied to the mount.
    pub async fn run_pass(&self, cancel: &CancellationToken) -> bool {
        for mount in &self.mounts {
            if cancel.is_cancelled() {
                return false;
            }
            let result = self.checker.check(mount, cancel).await;
            if cancel.is_cancelled() {
                return false;
            }
            self.apply(mount, &result);
        }
        true
    }

    fn apply(&self, mount: &Mount, result: &CheckResult) {
        match &result.error {
            None => log::trace!(
                target: "monitor",
                "Check passed: mount={}, duration={:?}",
                mount.label(),
                result.duration
            ),
            Some(err) => log::debug!(
                target: "monitor",
                "Check failed: mount={}, duration={:?}, error={}",
                mount.label(),
                result.duration,
                err
            ),
        }

        let threshold = mount.effective_threshold(self.default_threshold);
        if let Some(transition) = mount.update_state(result, threshold) {
            log_transition(&transition);
            for observer in &self.observers {
                observer.on_transition(&transition);
            }
        }
    }
}

fn log_transition(transition: &StateTransition) {
    let mount = &transition.mount;
    let level = match transition.current {
        HealthStatus::Degraded | HealthStatus::Unhealthy => log::Level::Warn,
        HealthStatus::Healthy | HealthStatus::Unknown => log::Level::Info,
    };
    log::log!(
        target: "monitor",
        level,
        "Mount status changed: mount={}, path={}, previous={}, current={}, trigger={}, failures={}, error={}",
        mount.label(),
        mount.path().display(),
        transition.previous,
        transition.current,
        transition.trigger,
        mount.failure_count(),
        mount
            .last_error()
            .map(|err| err.to_string())
            .unwrap_or_else(|| "none".to_owned())
    );
}

/// Handle to a running [`Monitor`] loop.
#[derive(Debug)]
pub struct MonitorHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl MonitorHandle {
    /// Requests the loop to stop. Returns immediately.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Waits until the loop has exited.
    pub async fn wait(self) -> Result<(), tokio::task::JoinError> {
        self.join.await
    }

    /// Stops the loop and waits for it to exit.
    pub async fn shutdown(self) -> Result<(), tokio::task::JoinError> {
        self.stop();
        self.wait().await
    }
}
