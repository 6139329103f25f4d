use reqwest::StatusCode;

/// How the watchdog has to treat the outcome of an API call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// The request did what was asked.
    Success,
    /// The target is already gone or going away. Counts as success for deletes.
    AlreadyGone,
    /// Worth retrying: the API server or the network had a problem.
    Transient,
    /// Retrying cannot help: credentials, RBAC or the request itself are wrong.
    Permanent,
}

impl ResponseClass {
    pub fn is_success(&self) -> bool {
        matches!(self, ResponseClass::Success | ResponseClass::AlreadyGone)
    }
}

/// Classifies the status code of a pod `DELETE`.
///
/// | status | class |
/// |---|---|
/// | 200, 202 | [`Success`](ResponseClass::Success) |
/// | 404, 409 | [`AlreadyGone`](ResponseClass::AlreadyGone) |
/// | 401, 403 | [`Permanent`](ResponseClass::Permanent) |
/// | 429, 5xx | [`Transient`](ResponseClass::Transient) |
/// | anything else | [`Permanent`](ResponseClass::Permanent) |
///
/// A transport error (no status at all) is always
/// [`Transient`](ResponseClass::Transient).
pub fn classify_delete(status: Option<StatusCode>) -> ResponseClass {
    let Some(status) = status else {
        return ResponseClass::Transient;
    };
    match status {
        StatusCode::OK | StatusCode::ACCEPTED => ResponseClass::Success,
        StatusCode::NOT_FOUND | StatusCode::CONFLICT => ResponseClass::AlreadyGone,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ResponseClass::Permanent,
        StatusCode::TOO_MANY_REQUESTS => ResponseClass::Transient,
        s if s.is_server_error() => ResponseClass::Transient,
        _ => ResponseClass::Permanent,
    }
}

/// Classifies the status code of any other call (`GET`, `POST`).
///
/// Same as [`classify_delete`] except that any 2xx is a success and 404/409
/// are permanent failures.
pub fn classify_request(status: Option<StatusCode>) -> ResponseClass {
    match status {
        Some(s) if s.is_success() => ResponseClass::Success,
        Some(StatusCode::NOT_FOUND | StatusCode::CONFLICT) => ResponseClass::Permanent,
        other => classify_delete(other),
    }
}
