use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::backoff::Backoff;
use super::state::{WatchdogPhase, WatchdogSnapshot, WatchdogState};
use super::timer::RestartTimer;
use crate::error::ResultOkLogExt;
use crate::health::{HealthStatus, Mount, StateTransition, TransitionObserver};
use crate::kube::{self, DeleteOutcome, KubeApi, RestartEvent};

/// Exit status used when remediation failed for good.
pub const FALLBACK_EXIT_CODE: i32 = 1;

/// Called with [`FALLBACK_EXIT_CODE`] when the pod cannot be deleted.
pub type ExitHook = Arc<dyn Fn(i32) + Send + Sync>;

/// Exit hook terminating the process.
pub fn process_exit() -> ExitHook {
    Arc::new(|code| std::process::exit(code))
}

/// Remediation parameters.
#[derive(Debug, Clone)]
pub struct WatchdogSettings {
    pub pod_name: String,
    pub pod_namespace: String,
    /// Time a mount has to stay unhealthy before the pod is restarted.
    pub restart_delay: Duration,
    /// Total number of deletion attempts.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

/// Read-only view on the watchdog for status reporting.
pub trait WatchdogView: Send + Sync {
    fn snapshot(&self) -> WatchdogSnapshot;
}

/// Restarts the pod when a mount stays unhealthy.
///
/// Driven by [`StateTransition`]s from the monitor:
///
/// - `Armed` → `PendingRestart` when any mount becomes unhealthy. A timer of
///   `restart_delay` starts.
/// - `PendingRestart` → `Armed` when that mount becomes healthy before the
///   timer fires. Nothing is sent to the API server. If another mount is still
///   unhealthy, a new restart is scheduled for it with a fresh delay.
/// - `PendingRestart` → `Triggered` when the timer fires. Unless the pod is
///   already terminating, a `WatchdogRestart` event is emitted and the pod is
///   deleted, retrying transient failures with exponential backoff.
///
/// If deletion fails permanently or runs out of attempts, the process exits
/// with [`FALLBACK_EXIT_CODE`] so the container gets restarted instead.
///
/// There is no backoff between pod restarts. After the pod is recreated the
/// watchdog arms again and restarts right away if the mount is still broken;
/// the kubelet's crash loop backoff throttles this.
pub struct Watchdog<K> {
    inner: Arc<Inner<K>>,
}

struct Inner<K> {
    remediator: Option<Remediator<K>>,
    state: Mutex<WatchdogState>,
}

struct Remediator<K> {
    kube: Arc<K>,
    settings: WatchdogSettings,
    exit: ExitHook,
}

impl<K> Clone for Watchdog<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K: KubeApi> Watchdog<K> {
    /// Creates a watchdog that ignores all notifications.
    pub fn disabled(reason: impl fmt::Display) -> Self {
        log::info!(target: "watchdog", "Watchdog disabled: reason={}", reason);
        Self {
            inner: Arc::new(Inner {
                remediator: None,
                state: Mutex::new(WatchdogState::new(WatchdogPhase::Disabled)),
            }),
        }
    }

    /// Arms the watchdog if remediation is possible.
    ///
    /// Falls back to [`Watchdog::disabled`] when the crate was built without
    /// the `watchdog` feature, when not running in a cluster, or when the
    /// service account may not delete pods.
    pub async fn arm(kube: Arc<K>, settings: WatchdogSettings, exit: ExitHook) -> Self {
        if !cfg!(feature = "watchdog") {
            return Self::disabled("built without the `watchdog` feature");
        }
        if !kube.is_in_cluster() {
            return Self::disabled("not running inside a Kubernetes cluster");
        }
        match kube.can_delete_pods().await {
            Ok(true) => {}
            Ok(false) => {
                return Self::disabled(format!(
                    "service account may not delete pods in namespace `{}`",
                    settings.pod_namespace
                ));
            }
            Err(err) => {
                return Self::disabled(format!("access review failed: {err}"));
            }
        }

        log::info!(
            target: "watchdog",
            "Watchdog armed: pod={}/{}, restart_delay={:?}, max_retries={}",
            settings.pod_namespace,
            settings.pod_name,
            settings.restart_delay,
            settings.max_retries
        );
        Self {
            inner: Arc::new(Inner {
                remediator: Some(Remediator {
                    kube,
                    settings,
                    exit,
                }),
                state: Mutex::new(WatchdogState::new(WatchdogPhase::Armed)),
            }),
        }
    }

    pub fn phase(&self) -> WatchdogPhase {
        self.inner.lock().phase
    }

    /// Feeds a mount status change into the state machine.
    ///
    /// Never waits on the API server: delays and remediation run on their own
    /// tasks. Must be called from within a Tokio runtime.
    pub fn notify(&self, transition: &StateTransition) {
        self.inner.handle_transition(transition);
    }
}

impl<K: KubeApi> TransitionObserver for Watchdog<K> {
    fn on_transition(&self, transition: &StateTransition) {
        self.notify(transition);
    }
}

impl<K: KubeApi> WatchdogView for Watchdog<K> {
    fn snapshot(&self) -> WatchdogSnapshot {
        self.inner.lock().snapshot()
    }
}

impl<K: KubeApi> Inner<K> {
    fn lock(&self) -> MutexGuard<'_, WatchdogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle_transition(self: &Arc<Self>, transition: &StateTransition) {
        if self.remediator.is_none() {
            return;
        }
        let mount = &transition.mount;
        let mut state = self.lock();
        state.track(mount, transition.current, transition.timestamp);

        match state.phase {
            WatchdogPhase::Disabled => {}
            WatchdogPhase::Armed => {
                if transition.current == HealthStatus::Unhealthy {
                    self.begin_pending(&mut state, Arc::clone(mount), transition.timestamp);
                }
            }
            WatchdogPhase::PendingRestart => {
                if transition.current == HealthStatus::Healthy && state.is_pending_for(mount) {
                    state.rearm();
                    log::info!(
                        target: "watchdog",
                        "Mount recovered, pod restart cancelled: mount={}, path={}",
                        mount.label(),
                        mount.path().display()
                    );
                    self.pend_next(&mut state);
                } else {
                    log::debug!(
                        target: "watchdog",
                        "Ignoring transition while restart is pending: mount={}, status={}",
                        mount.label(),
                        transition.current
                    );
                }
            }
            WatchdogPhase::Triggered => {
                log::debug!(
                    target: "watchdog",
                    "Ignoring transition, pod restart in progress: mount={}, status={}",
                    mount.label(),
                    transition.current
                );
            }
        }
    }

    /// Enters `PendingRestart` for `mount` with a fresh delay, or `Triggered`
    /// right away when the delay is zero.
    fn begin_pending(
        self: &Arc<Self>,
        state: &mut WatchdogState,
        mount: Arc<Mount>,
        unhealthy_since: DateTime<Utc>,
    ) {
        let Some(remediator) = &self.remediator else {
            return;
        };
        state.phase = WatchdogPhase::PendingRestart;
        state.pending_mount = Some(Arc::clone(&mount));
        state.unhealthy_since = Some(unhealthy_since);
        state.retry_count = 0;
        state.last_error = None;
        state.generation = state.generation.wrapping_add(1);

        let delay = remediator.settings.restart_delay;
        if delay.is_zero() {
            state.phase = WatchdogPhase::Triggered;
            log::warn!(
                target: "watchdog",
                "Mount unhealthy, restarting pod now: mount={}, path={}",
                mount.label(),
                mount.path().display()
            );
            tokio::spawn(Arc::clone(self).remediate(mount));
        } else {
            log::warn!(
                target: "watchdog",
                "Mount unhealthy, pod restart scheduled: mount={}, path={}, delay={:?}",
                mount.label(),
                mount.path().display(),
                delay
            );
            let generation = state.generation;
            let inner = Arc::clone(self);
            state.timer = Some(RestartTimer::start(delay, move || {
                inner.on_timer_fired(generation)
            }));
        }
    }

    /// After a cancelled restart, moves on to another mount that is still
    /// unhealthy. Must be called in `Armed`.
    fn pend_next(self: &Arc<Self>, state: &mut WatchdogState) {
        if let Some((mount, since)) = state.next_unhealthy() {
            log::info!(
                target: "watchdog",
                "Another mount is still unhealthy: mount={}, path={}",
                mount.label(),
                mount.path().display()
            );
            self.begin_pending(state, mount, since);
        }
    }

    async fn on_timer_fired(self: Arc<Self>, generation: u64) {
        let mount = {
            let mut state = self.lock();
            if state.generation != generation || state.phase != WatchdogPhase::PendingRestart {
                log::debug!(target: "watchdog", "Stale restart timer fired, ignoring");
                return;
            }
            state.timer = None;
            let Some(mount) = state.pending_mount.clone() else {
                state.rearm();
                self.pend_next(&mut state);
                return;
            };
            if mount.status() == HealthStatus::Healthy {
                log::info!(
                    target: "watchdog",
                    "Mount healthy when restart delay elapsed, not restarting: mount={}",
                    mount.label()
                );
                state.rearm();
                self.pend_next(&mut state);
                return;
            }
            state.phase = WatchdogPhase::Triggered;
            mount
        };

        self.remediate(mount).await;
    }

    async fn remediate(self: Arc<Self>, mount: Arc<Mount>) {
        let Some(remediator) = &self.remediator else {
            return;
        };
        let pod_name = &remediator.settings.pod_name;

        match remediator.kube.is_pod_terminating(pod_name).await {
            Ok(true) => {
                log::info!(
                    target: "watchdog",
                    "Pod already terminating, nothing to do: pod={}",
                    pod_name
                );
                self.lock().rearm();
                return;
            }
            Ok(false) => {}
            Err(err) => log::warn!(
                target: "watchdog",
                "Failed to check pod termination, deleting anyway: pod={}, error={}",
                pod_name,
                err
            ),
        }

        let event = self.restart_event(&remediator.settings, &mount);
        log::warn!(
            target: "watchdog",
            "Restarting pod: pod={}/{}, mount={}, failures={}, unhealthy_for={:?}, reason={}",
            event.pod_namespace,
            event.pod_name,
            event.mount_path.display(),
            event.failure_count,
            event.unhealthy_for,
            event.reason
        );
        remediator
            .kube
            .create_event(&event)
            .await
            .ok_log("watchdog", "Failed to create restart event");

        match self.delete_with_retry(remediator).await {
            Ok(DeleteOutcome::Deleted) => log::info!(
                target: "watchdog",
                "Pod deletion accepted: pod={}",
                pod_name
            ),
            Ok(DeleteOutcome::AlreadyGone) => log::info!(
                target: "watchdog",
                "Pod already gone or terminating: pod={}",
                pod_name
            ),
            Err(err) => {
                log::error!(
                    target: "watchdog",
                    "Pod restart failed, exiting to force a container restart: pod={}, attempts={}, error={}",
                    pod_name,
                    self.lock().retry_count,
                    err
                );
                (remediator.exit)(FALLBACK_EXIT_CODE);
            }
        }
    }

    fn restart_event(&self, settings: &WatchdogSettings, mount: &Mount) -> RestartEvent {
        let now = Utc::now();
        let unhealthy_for = self
            .lock()
            .unhealthy_since
            .and_then(|since| (now - since).to_std().ok())
            .unwrap_or_default();
        RestartEvent {
            timestamp: now,
            pod_name: settings.pod_name.clone(),
            pod_namespace: settings.pod_namespace.clone(),
            mount_path: mount.path().to_path_buf(),
            reason: mount
                .last_error()
                .map(|err| err.to_string())
                .unwrap_or_else(|| "mount unhealthy".to_owned()),
            failure_count: mount.failure_count(),
            unhealthy_for,
        }
    }

    async fn delete_with_retry(&self, remediator: &Remediator<K>) -> kube::Result<DeleteOutcome> {
        let settings = &remediator.settings;
        let max_attempts = settings.max_retries.max(1);
        let mut backoff = Backoff::new(settings.initial_backoff, settings.max_backoff);
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.lock().retry_count = attempt;

            let err = match remediator.kube.delete_pod(&settings.pod_name).await {
                Ok(outcome) => {
                    self.lock().last_error = None;
                    return Ok(outcome);
                }
                Err(err) => err,
            };
            self.lock().last_error = Some(err.to_string());

            if !err.is_transient() || attempt >= max_attempts {
                return Err(err);
            }
            let delay = backoff.next_delay();
            log::warn!(
                target: "watchdog",
                "Pod deletion failed, retrying: attempt={}/{}, delay={:?}, error={}",
                attempt,
                max_attempts,
                delay,
                err
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::{CheckError, CheckResult, Checker, Monitor};
    use reqwest::{Method, StatusCode};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;
    use tokio_util::sync::CancellationToken;

    #[derive(Default)]
    struct FakeKube {
        in_cluster: bool,
        allowed: bool,
        terminating: bool,
        event_fails: bool,
        delete_results: Mutex<VecDeque<Result<DeleteOutcome, StatusCode>>>,
        delete_times: Mutex<Vec<Instant>>,
        events: AtomicUsize,
    }

    impl FakeKube {
        fn armed() -> Self {
            Self {
                in_cluster: true,
                allowed: true,
                ..Self::default()
            }
        }

        fn with_deletes(self, results: Vec<Result<DeleteOutcome, StatusCode>>) -> Self {
            *self.delete_results.lock().unwrap() = results.into();
            self
        }

        fn deletes(&self) -> usize {
            self.delete_times.lock().unwrap().len()
        }

        fn events(&self) -> usize {
            self.events.load(Ordering::SeqCst)
        }

        fn status_error(status: StatusCode) -> kube::Error {
            kube::Error::Status {
                method: Method::DELETE,
                url: "/api/v1/namespaces/storage/pods/app-0".into(),
                status,
                body: String::new(),
            }
        }
    }

    impl KubeApi for FakeKube {
        fn is_in_cluster(&self) -> bool {
            self.in_cluster
        }

        async fn can_delete_pods(&self) -> kube::Result<bool> {
            Ok(self.allowed)
        }

        async fn delete_pod(&self, _name: &str) -> kube::Result<DeleteOutcome> {
            self.delete_times.lock().unwrap().push(Instant::now());
            match self.delete_results.lock().unwrap().pop_front() {
                None => Ok(DeleteOutcome::Deleted),
                Some(Ok(outcome)) => Ok(outcome),
                Some(Err(status)) => Err(Self::status_error(status)),
            }
        }

        async fn is_pod_terminating(&self, _name: &str) -> kube::Result<bool> {
            Ok(self.terminating)
        }

        async fn create_event(&self, _event: &RestartEvent) -> kube::Result<()> {
            self.events.fetch_add(1, Ordering::SeqCst);
            if self.event_fails {
                return Err(Self::status_error(StatusCode::INTERNAL_SERVER_ERROR));
            }
            Ok(())
        }
    }

    fn settings(restart_delay: Duration) -> WatchdogSettings {
        WatchdogSettings {
            pod_name: "app-0".into(),
            pod_namespace: "storage".into(),
            restart_delay,
            max_retries: 4,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
        }
    }

    fn exit_recorder() -> (ExitHook, Arc<Mutex<Vec<i32>>>) {
        let codes = Arc::new(Mutex::new(Vec::new()));
        let hook: ExitHook = {
            let codes = Arc::clone(&codes);
            Arc::new(move |code| codes.lock().unwrap().push(code))
        };
        (hook, codes)
    }

    fn mount(path: &str) -> Arc<Mount> {
        Arc::new(Mount::new(None, path, ".health-check", 1))
    }

    fn unhealthy(mount: &Arc<Mount>) -> StateTransition {
        let result = CheckResult::failure(
            Arc::clone(mount),
            CheckError::DeadlineExceeded {
                path: mount.canary_path().to_path_buf(),
                timeout: Duration::from_secs(5),
            },
            Duration::from_secs(5),
        );
        mount.update_state(&result, 1).unwrap()
    }

    fn healthy(mount: &Arc<Mount>) -> StateTransition {
        let result = CheckResult::success(Arc::clone(mount), Duration::from_millis(1));
        mount.update_state(&result, 1).unwrap()
    }

    async fn armed(
        kube: FakeKube,
        restart_delay: Duration,
    ) -> (Watchdog<FakeKube>, Arc<FakeKube>, Arc<Mutex<Vec<i32>>>) {
        let kube = Arc::new(kube);
        let (exit, codes) = exit_recorder();
        let watchdog = Watchdog::arm(Arc::clone(&kube), settings(restart_delay), exit).await;
        assert_eq!(watchdog.phase(), WatchdogPhase::Armed);
        (watchdog, kube, codes)
    }

    /// Lets spawned remediation tasks run to completion under paused time.
    async fn settle() {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_outside_cluster() {
        let kube = Arc::new(FakeKube::default());
        let (exit, _) = exit_recorder();
        let watchdog = Watchdog::arm(Arc::clone(&kube), settings(Duration::ZERO), exit).await;
        assert_eq!(watchdog.phase(), WatchdogPhase::Disabled);

        watchdog.notify(&unhealthy(&mount("/data")));
        settle().await;
        assert_eq!(watchdog.phase(), WatchdogPhase::Disabled);
        assert_eq!(kube.deletes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_without_rbac() {
        let kube = Arc::new(FakeKube {
            in_cluster: true,
            allowed: false,
            ..FakeKube::default()
        });
        let (exit, _) = exit_recorder();
        let watchdog = Watchdog::arm(Arc::clone(&kube), settings(Duration::ZERO), exit).await;
        assert_eq!(watchdog.phase(), WatchdogPhase::Disabled);

        let data = mount("/data");
        watchdog.notify(&unhealthy(&data));
        watchdog.notify(&healthy(&data));
        watchdog.notify(&unhealthy(&data));
        settle().await;

        assert_eq!(watchdog.phase(), WatchdogPhase::Disabled);
        assert_eq!(kube.deletes(), 0);
        assert_eq!(kube.events(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unhealthy_starts_pending_restart() {
        let (watchdog, kube, _) = armed(FakeKube::armed(), Duration::from_secs(30)).await;
        let data = mount("/data");

        let transition = unhealthy(&data);
        watchdog.notify(&transition);

        let snapshot = watchdog.snapshot();
        assert_eq!(snapshot.phase, WatchdogPhase::PendingRestart);
        assert_eq!(snapshot.pending_mount, Some("/data".into()));
        assert_eq!(snapshot.unhealthy_since, Some(transition.timestamp));
        assert_eq!(kube.deletes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_degraded_does_not_start_restart() {
        let (watchdog, _, _) = armed(FakeKube::armed(), Duration::from_secs(30)).await;
        let data = Arc::new(Mount::new(None, "/data", ".health-check", 3));
        let result = CheckResult::failure(
            Arc::clone(&data),
            CheckError::Cancelled {
                path: data.canary_path().to_path_buf(),
            },
            Duration::ZERO,
        );
        let transition = data.update_state(&result, 3).unwrap();
        assert_eq!(transition.current, HealthStatus::Degraded);

        watchdog.notify(&transition);
        assert_eq!(watchdog.phase(), WatchdogPhase::Armed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_cancels_restart_without_api_calls() {
        let (watchdog, kube, codes) = armed(FakeKube::armed(), Duration::from_secs(30)).await;
        let data = mount("/data");

        watchdog.notify(&unhealthy(&data));
        tokio::time::sleep(Duration::from_secs(10)).await;
        watchdog.notify(&healthy(&data));

        let snapshot = watchdog.snapshot();
        assert_eq!(snapshot.phase, WatchdogPhase::Armed);
        assert_eq!(snapshot.pending_mount, None);

        settle().await;
        assert_eq!(watchdog.phase(), WatchdogPhase::Armed);
        assert_eq!(kube.deletes(), 0);
        assert_eq!(kube.events(), 0);
        assert!(codes.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_unhealthy_mount_restarts_after_first_recovers() {
        let (watchdog, kube, _) = armed(FakeKube::armed(), Duration::from_secs(30)).await;
        let data = mount("/data");
        let logs = mount("/logs");

        watchdog.notify(&unhealthy(&data));
        watchdog.notify(&unhealthy(&logs));
        tokio::time::sleep(Duration::from_secs(5)).await;
        watchdog.notify(&healthy(&data));

        let snapshot = watchdog.snapshot();
        assert_eq!(snapshot.phase, WatchdogPhase::PendingRestart);
        assert_eq!(snapshot.pending_mount, Some("/logs".into()));

        settle().await;
        assert_eq!(logs.status(), HealthStatus::Unhealthy);
        assert_eq!(watchdog.phase(), WatchdogPhase::Triggered);
        assert_eq!(kube.deletes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_moves_on_to_other_unhealthy_mount() {
        let (watchdog, kube, _) = armed(FakeKube::armed(), Duration::from_secs(30)).await;
        let data = mount("/data");
        let logs = mount("/logs");

        watchdog.notify(&unhealthy(&data));
        watchdog.notify(&unhealthy(&logs));
        // recovery lands in the mount before the observer hears about it
        let _ = healthy(&data);

        tokio::time::sleep(Duration::from_secs(31)).await;
        let snapshot = watchdog.snapshot();
        assert_eq!(snapshot.phase, WatchdogPhase::PendingRestart);
        assert_eq!(snapshot.pending_mount, Some("/logs".into()));
        assert_eq!(kube.deletes(), 0);

        settle().await;
        assert_eq!(watchdog.phase(), WatchdogPhase::Triggered);
        assert_eq!(kube.deletes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovered_mounts_are_not_restarted_later() {
        let (watchdog, kube, _) = armed(FakeKube::armed(), Duration::from_secs(30)).await;
        let data = mount("/data");
        let logs = mount("/logs");

        watchdog.notify(&unhealthy(&data));
        watchdog.notify(&unhealthy(&logs));
        watchdog.notify(&healthy(&logs));
        watchdog.notify(&healthy(&data));

        settle().await;
        assert_eq!(watchdog.phase(), WatchdogPhase::Armed);
        assert_eq!(kube.deletes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_timer_generation_is_ignored() {
        let (watchdog, kube, _) = armed(FakeKube::armed(), Duration::from_secs(30)).await;
        let data = mount("/data");

        watchdog.notify(&unhealthy(&data));
        let stale = watchdog.inner.lock().generation;
        watchdog.notify(&healthy(&data));
        watchdog.notify(&unhealthy(&data));
        let current = watchdog.inner.lock().generation;
        assert_ne!(stale, current);

        Arc::clone(&watchdog.inner).on_timer_fired(stale).await;

        let snapshot = watchdog.snapshot();
        assert_eq!(snapshot.phase, WatchdogPhase::PendingRestart);
        assert_eq!(snapshot.retry_count, 0);
        assert_eq!(watchdog.inner.lock().generation, current);
        assert_eq!(kube.deletes(), 0);
        assert_eq!(kube.events(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_mount_recovery_does_not_cancel() {
        let (watchdog, kube, _) = armed(FakeKube::armed(), Duration::from_secs(30)).await;
        let data = mount("/data");
        let logs = mount("/logs");

        watchdog.notify(&unhealthy(&data));
        watchdog.notify(&unhealthy(&logs));
        watchdog.notify(&healthy(&logs));
        assert_eq!(watchdog.phase(), WatchdogPhase::PendingRestart);

        settle().await;
        assert_eq!(watchdog.phase(), WatchdogPhase::Triggered);
        assert_eq!(kube.deletes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_and_deletes_pod() {
        let (watchdog, kube, codes) = armed(FakeKube::armed(), Duration::from_secs(30)).await;
        let data = mount("/data");

        watchdog.notify(&unhealthy(&data));
        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(kube.deletes(), 0);

        settle().await;
        assert_eq!(watchdog.phase(), WatchdogPhase::Triggered);
        assert_eq!(kube.events(), 1);
        assert_eq!(kube.deletes(), 1);
        assert_eq!(watchdog.snapshot().retry_count, 1);
        assert!(codes.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_delay_triggers_immediately() {
        let (watchdog, kube, _) = armed(FakeKube::armed(), Duration::ZERO).await;
        let data = mount("/data");
        let started = Instant::now();

        watchdog.notify(&unhealthy(&data));
        assert_eq!(watchdog.phase(), WatchdogPhase::Triggered);

        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(kube.deletes(), 1);
        assert!(kube.delete_times.lock().unwrap()[0] - started < Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_terminating_rearms() {
        let kube = FakeKube {
            terminating: true,
            ..FakeKube::armed()
        };
        let (watchdog, kube, _) = armed(kube, Duration::ZERO).await;

        watchdog.notify(&unhealthy(&mount("/data")));
        settle().await;

        assert_eq!(watchdog.phase(), WatchdogPhase::Armed);
        assert_eq!(kube.deletes(), 0);
        assert_eq!(kube.events(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried_with_backoff() {
        let kube = FakeKube::armed().with_deletes(vec![
            Err(StatusCode::SERVICE_UNAVAILABLE),
            Err(StatusCode::BAD_GATEWAY),
            Ok(DeleteOutcome::Deleted),
        ]);
        let (watchdog, kube, codes) = armed(kube, Duration::ZERO).await;

        watchdog.notify(&unhealthy(&mount("/data")));
        settle().await;

        let times = kube.delete_times.lock().unwrap().clone();
        assert_eq!(times.len(), 3);
        let first_gap = times[1] - times[0];
        let second_gap = times[2] - times[1];
        assert_eq!(first_gap, Duration::from_secs(1));
        assert_eq!(second_gap, Duration::from_secs(2));
        assert!(second_gap > first_gap);

        let snapshot = watchdog.snapshot();
        assert_eq!(snapshot.retry_count, 3);
        assert_eq!(snapshot.last_error, None);
        assert!(codes.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_exit() {
        let kube = FakeKube::armed().with_deletes(vec![Err(StatusCode::INTERNAL_SERVER_ERROR); 4]);
        let (watchdog, kube, codes) = armed(kube, Duration::ZERO).await;

        watchdog.notify(&unhealthy(&mount("/data")));
        settle().await;

        assert_eq!(kube.deletes(), 4);
        assert_eq!(*codes.lock().unwrap(), vec![FALLBACK_EXIT_CODE]);
        let snapshot = watchdog.snapshot();
        assert_eq!(snapshot.retry_count, 4);
        assert!(snapshot.last_error.unwrap().contains("500"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_exits_without_retry() {
        let kube = FakeKube::armed().with_deletes(vec![Err(StatusCode::FORBIDDEN)]);
        let (watchdog, kube, codes) = armed(kube, Duration::ZERO).await;

        watchdog.notify(&unhealthy(&mount("/data")));
        settle().await;

        assert_eq!(kube.deletes(), 1);
        assert_eq!(*codes.lock().unwrap(), vec![FALLBACK_EXIT_CODE]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_gone_is_success() {
        let kube = FakeKube::armed().with_deletes(vec![Ok(DeleteOutcome::AlreadyGone)]);
        let (watchdog, kube, codes) = armed(kube, Duration::ZERO).await;

        watchdog.notify(&unhealthy(&mount("/data")));
        settle().await;

        assert_eq!(kube.deletes(), 1);
        assert!(codes.lock().unwrap().is_empty());
        assert_eq!(watchdog.phase(), WatchdogPhase::Triggered);
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_failure_does_not_block_delete() {
        let kube = FakeKube {
            event_fails: true,
            ..FakeKube::armed()
        };
        let (watchdog, kube, codes) = armed(kube, Duration::ZERO).await;

        watchdog.notify(&unhealthy(&mount("/data")));
        settle().await;

        assert_eq!(kube.events(), 1);
        assert_eq!(kube.deletes(), 1);
        assert!(codes.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transitions_ignored_while_triggered() {
        let (watchdog, kube, _) = armed(FakeKube::armed(), Duration::ZERO).await;
        let data = mount("/data");

        watchdog.notify(&unhealthy(&data));
        watchdog.notify(&healthy(&data));
        watchdog.notify(&unhealthy(&data));
        settle().await;

        assert_eq!(watchdog.phase(), WatchdogPhase::Triggered);
        assert_eq!(kube.deletes(), 1);
    }

    #[tokio::test]
    async fn test_monitor_drives_disabled_watchdog() {
        let kube = Arc::new(FakeKube {
            in_cluster: true,
            allowed: false,
            ..FakeKube::default()
        });
        let (exit, _) = exit_recorder();
        let watchdog = Arc::new(Watchdog::arm(Arc::clone(&kube), settings(Duration::ZERO), exit).await);

        let data = Arc::new(Mount::new(None, "/data", ".health-check", 0));
        let checker = Checker::with_reader(Duration::from_secs(1), |path| {
            Err(crate::fsutil::ReadFileError::Read {
                path: path.to_path_buf(),
                source: std::io::Error::other("transport endpoint is not connected"),
            })
        });
        let monitor = Monitor::new(vec![Arc::clone(&data)], checker, Duration::from_secs(10), 3)
            .with_observer(watchdog.clone());

        let cancel = CancellationToken::new();
        for _ in 0..5 {
            monitor.run_pass(&cancel).await;
        }

        assert_eq!(data.status(), HealthStatus::Unhealthy);
        assert_eq!(watchdog.phase(), WatchdogPhase::Disabled);
        assert_eq!(kube.deletes(), 0);
    }

    #[tokio::test]
    async fn test_monitor_drives_armed_watchdog() {
        let kube = Arc::new(FakeKube::armed());
        let (exit, codes) = exit_recorder();
        let watchdog = Arc::new(Watchdog::arm(Arc::clone(&kube), settings(Duration::ZERO), exit).await);

        let data = Arc::new(Mount::new(None, "/data", ".health-check", 2));
        let checker = Checker::with_reader(Duration::from_secs(1), |path| {
            Err(crate::fsutil::ReadFileError::Read {
                path: path.to_path_buf(),
                source: std::io::Error::other("stale file handle"),
            })
        });
        let monitor = Monitor::new(vec![Arc::clone(&data)], checker, Duration::from_secs(10), 3)
            .with_observer(watchdog.clone());

        let cancel = CancellationToken::new();
        monitor.run_pass(&cancel).await;
        assert_eq!(watchdog.phase(), WatchdogPhase::Armed);
        monitor.run_pass(&cancel).await;
        assert_eq!(watchdog.phase(), WatchdogPhase::Triggered);

        for _ in 0..100 {
            if kube.deletes() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(kube.deletes(), 1);
        assert_eq!(kube.events(), 1);
        assert!(codes.lock().unwrap().is_empty());
    }
}
