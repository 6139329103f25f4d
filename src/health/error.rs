use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::fsutil;

/// Reason a canary check failed.
///
/// Check errors are recorded in mount state rather than propagated, so they are
/// cheap to clone.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CheckError {
    #[error(transparent)]
    Read(Arc<fsutil::ReadFileError>),
    #[error("reading canary file `{path}` exceeded the deadline of {timeout:?}")]
    DeadlineExceeded { path: PathBuf, timeout: Duration },
    #[error("reading canary file `{path}` was cancelled")]
    Cancelled { path: PathBuf },
    #[error("failed to spawn reader thread for `{path}`: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },
    #[error("reader thread for `{path}` exited without a result")]
    ReaderLost { path: PathBuf },
}

impl From<fsutil::ReadFileError> for CheckError {
    fn from(err: fsutil::ReadFileError) -> Self {
        CheckError::Read(Arc::new(err))
    }
}

impl CheckError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, CheckError::DeadlineExceeded { .. })
    }
}
