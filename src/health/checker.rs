use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use super::error::CheckError;
use super::mount::Mount;
use crate::fsutil;

/// Function performing the blocking canary read.
pub type CanaryReader =
    Arc<dyn Fn(&Path) -> Result<(), fsutil::ReadFileError> + Send + Sync + 'static>;

/// Outcome of a single canary check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub mount: Arc<Mount>,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub duration: Duration,
    pub error: Option<CheckError>,
}

impl CheckResult {
    pub fn success(mount: Arc<Mount>, duration: Duration) -> Self {
        Self {
            mount,
            timestamp: Utc::now(),
            success: true,
            duration,
            error: None,
        }
    }

    pub fn failure(mount: Arc<Mount>, error: CheckError, duration: Duration) -> Self {
        Self {
            mount,
            timestamp: Utc::now(),
            success: false,
            duration,
            error: Some(error),
        }
    }
}

/// Reads canary files with a hard upper bound on how long the caller waits.
///
/// Reads on a hung mount (stale NFS handle, dead FUSE daemon, ...) can block in
/// the kernel indefinitely and cannot be interrupted. Every read therefore runs
/// on its own OS thread while the caller races it against a deadline. When the
/// deadline wins, the thread is abandoned: it stays blocked until the kernel
/// returns, then exits on its own. Under persistently hung storage this leaks
/// one thread per check interval. That cost is accepted in exchange for a
/// bounded check latency.
#[derive(Clone)]
pub struct Checker {
    timeout: Duration,
    reader: CanaryReader,
}

impl std::fmt::Debug for Checker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Checker")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Checker {
    /// Creates a checker that reads the full canary file from disk.
    pub fn new(timeout: Duration) -> Self {
        Self::with_reader(timeout, |path| fsutil::read_to_end(path).map(|_| ()))
    }

    /// Creates a checker with a custom read function.
    pub fn with_reader<F>(timeout: Duration, reader: F) -> Self
    where
        F: Fn(&Path) -> Result<(), fsutil::ReadFileError> + Send + Sync + 'static,
    {
        Self {
            timeout,
            reader: Arc::new(reader),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Checks a mount by reading its canary file.
    ///
    /// Returns within `timeout` of invocation (plus scheduling overhead) even if
    /// the read never completes. Cancelling `cancel` resolves the check early
    /// with [`CheckError::Cancelled`].
    pub async fn check(&self, mount: &Arc<Mount>, cancel: &CancellationToken) -> CheckResult {
        let started = Instant::now();
        let outcome = self
            .race_read(mount.canary_path().to_path_buf(), cancel)
            .await;
        let duration = started.elapsed();

        match outcome {
            Ok(()) => CheckResult::success(Arc::clone(mount), duration),
            Err(err) => CheckResult::failure(Arc::clone(mount), err, duration),
        }
    }

    async fn race_read(&self, path: PathBuf, cancel: &CancellationToken) -> Result<(), CheckError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let reader = Arc::clone(&self.reader);
        let thread_path = path.clone();
        std::thread::Builder::new()
            .name("canary-read".to_owned())
            .spawn(move || {
                // The receiver is gone when the deadline already fired.
                let _ = tx.send(reader(&thread_path));
            })
            .map_err(|source| CheckError::Spawn {
                path: path.clone(),
                source: Arc::new(source),
            })?;

        tokio::select! {
            biased;
            outcome = rx => match outcome {
                Ok(result) => result.map_err(CheckError::from),
                Err(_) => Err(CheckError::ReaderLost { path }),
            },
            _ = tokio::time::sleep(self.timeout) => Err(CheckError::DeadlineExceeded {
                path,
                timeout: self.timeout,
            }),
            _ = cancel.cancelled() => Err(CheckError::Cancelled { path }),
        }
    }
}
