use std::path::PathBuf;

use reqwest::StatusCode;

use super::classify::{ResponseClass, classify_request};
use crate::fsutil;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read service account credentials: {0}")]
    Credentials(#[source] fsutil::ReadFileError),
    #[error("environment variable `{0}` is not set")]
    MissingEnv(&'static str),
    #[error("invalid CA certificate `{path}`: {source}")]
    CaCertificate {
        path: PathBuf,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    #[error("{method} `{url}` failed: {source}")]
    Transport {
        method: reqwest::Method,
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{method} `{url}` returned {status}: {body}")]
    Status {
        method: reqwest::Method,
        url: String,
        status: StatusCode,
        body: String,
    },
    #[error("failed to decode response of {method} `{url}`: {source}")]
    Decode {
        method: reqwest::Method,
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl Error {
    /// Maps the error onto the retry taxonomy.
    ///
    /// Only network errors and retryable status codes are transient; local
    /// problems (credentials, certificates, undecodable responses) are
    /// permanent.
    pub fn class(&self) -> ResponseClass {
        match self {
            Error::Transport { .. } => ResponseClass::Transient,
            Error::Status { status, .. } => classify_request(Some(*status)),
            Error::Credentials(_)
            | Error::MissingEnv(_)
            | Error::CaCertificate { .. }
            | Error::ClientBuild(_)
            | Error::Decode { .. } => ResponseClass::Permanent,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.class() == ResponseClass::Transient
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
