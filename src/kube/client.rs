use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::ACCEPT;
use reqwest::{Method, RequestBuilder, Response};

use super::classify::{ResponseClass, classify_delete, classify_request};
use super::incluster::{self, ServiceAccount};
use super::models::{
    AccessReviewResponse, DeleteOptions, Event, Pod, RestartEvent, SelfSubjectAccessReview,
};
use super::{DeleteOutcome, Error, KubeApi, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_ERROR_BODY_LEN: usize = 512;
const ACCESS_REVIEW_PATH: &str = "/apis/authorization.k8s.io/v1/selfsubjectaccessreviews";

#[derive(Debug, Clone)]
enum TokenSource {
    /// Re-read on every request, bound service account tokens rotate.
    File(PathBuf),
    Static(String),
}

/// Minimal Kubernetes API client for the pod the sidecar runs in.
///
/// Every call is a hand-built request against the REST API, authenticated with
/// the service account bearer token. TLS trusts only the cluster CA.
#[derive(Debug, Clone)]
pub struct K8sClient {
    http: reqwest::Client,
    base_url: String,
    namespace: String,
    token: TokenSource,
    grace_period: Option<u32>,
}

impl K8sClient {
    /// Creates a client from the standard in-cluster service account and
    /// `KUBERNETES_SERVICE_HOST`/`KUBERNETES_SERVICE_PORT`.
    ///
    /// # Arguments
    ///
    /// * `namespace` - Pod namespace; read from the service account when `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the environment variables are missing or the
    /// service account material cannot be read.
    pub fn in_cluster(namespace: Option<String>) -> Result<Self> {
        let base_url = incluster::api_server_url_from_env()?;
        Self::from_service_account(&ServiceAccount::default(), base_url, namespace)
    }

    /// Creates a client from the service account material in `account`.
    ///
    /// # Errors
    ///
    /// - [`Error::Credentials`] if the token, namespace or CA file cannot be read.
    /// - [`Error::CaCertificate`] if the CA bundle is not valid PEM.
    /// - [`Error::ClientBuild`] if the TLS client cannot be constructed.
    pub fn from_service_account(
        account: &ServiceAccount,
        base_url: String,
        namespace: Option<String>,
    ) -> Result<Self> {
        let ca_cert = account.read_ca_cert()?;
        let ca_cert =
            reqwest::Certificate::from_pem(&ca_cert).map_err(|source| Error::CaCertificate {
                path: account.ca_cert_path(),
                source,
            })?;
        let http = reqwest::Client::builder()
            .add_root_certificate(ca_cert)
            .tls_built_in_root_certs(false)
            .timeout(REQUEST_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(Error::ClientBuild)?;

        let namespace = match namespace {
            Some(namespace) => namespace,
            None => account.read_namespace()?,
        };
        // fail early instead of on the first remediation
        account.read_token()?;

        log::debug!(
            target: "kube",
            "Created in-cluster client: server={}, namespace={}",
            base_url,
            namespace
        );
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            namespace,
            token: TokenSource::File(account.token_path()),
            grace_period: None,
        })
    }

    /// Creates a client with a fixed token and a caller-provided HTTP client.
    pub fn with_token(
        http: reqwest::Client,
        base_url: impl Into<String>,
        token: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        let base_url: String = base_url.into();
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            namespace: namespace.into(),
            token: TokenSource::Static(token.into()),
            grace_period: None,
        }
    }

    /// Sets `gracePeriodSeconds` sent with pod deletions.
    pub fn with_grace_period(mut self, grace_period: Option<u32>) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn pod_path(&self, name: &str) -> String {
        format!("/api/v1/namespaces/{}/pods/{}", self.namespace, name)
    }

    fn events_path(&self) -> String {
        format!("/api/v1/namespaces/{}/events", self.namespace)
    }

    fn bearer_token(&self) -> Result<String> {
        match &self.token {
            TokenSource::File(path) => crate::fsutil::read_trimmed(path).map_err(Error::Credentials),
            TokenSource::Static(token) => Ok(token.clone()),
        }
    }

    fn request(&self, method: Method, path: &str) -> Result<(RequestBuilder, String)> {
        let url = format!("{}{}", self.base_url, path);
        let request = self
            .http
            .request(method, &url)
            .bearer_auth(self.bearer_token()?)
            .header(ACCEPT, "application/json");
        Ok((request, url))
    }

    async fn execute(&self, method: Method, url: &str, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await.map_err(|source| Error::Transport {
            method: method.clone(),
            url: url.to_owned(),
            source,
        })?;
        log::trace!(target: "kube", "{} {} -> {}", method, url, response.status());
        Ok(response)
    }
}

async fn status_error(method: Method, url: &str, response: Response) -> Error {
    let status = response.status();
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY_LEN {
        let mut end = MAX_ERROR_BODY_LEN;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    Error::Status {
        method,
        url: url.to_owned(),
        status,
        body,
    }
}

impl KubeApi for K8sClient {
    fn is_in_cluster(&self) -> bool {
        match &self.token {
            TokenSource::File(path) => incluster::token_exists(path),
            TokenSource::Static(_) => true,
        }
    }

    async fn can_delete_pods(&self) -> Result<bool> {
        let review = SelfSubjectAccessReview::new(&self.namespace, "delete", "pods");
        let (request, url) = self.request(Method::POST, ACCESS_REVIEW_PATH)?;
        let response = self
            .execute(Method::POST, &url, request.json(&review))
            .await?;
        if !classify_request(Some(response.status())).is_success() {
            return Err(status_error(Method::POST, &url, response).await);
        }

        let review: AccessReviewResponse =
            response.json().await.map_err(|source| Error::Decode {
                method: Method::POST,
                url: url.clone(),
                source,
            })?;
        if !review.status.allowed {
            log::debug!(
                target: "kube",
                "Access review denied pod deletion: namespace={}, reason={}",
                self.namespace,
                review.status.reason.as_deref().unwrap_or("none")
            );
        }
        Ok(review.status.allowed)
    }

    async fn delete_pod(&self, name: &str) -> Result<DeleteOutcome> {
        let (request, url) = self.request(Method::DELETE, &self.pod_path(name))?;
        let response = self
            .execute(
                Method::DELETE,
                &url,
                request.json(&DeleteOptions::new(self.grace_period)),
            )
            .await?;

        match classify_delete(Some(response.status())) {
            ResponseClass::Success => Ok(DeleteOutcome::Deleted),
            ResponseClass::AlreadyGone => {
                log::debug!(
                    target: "kube",
                    "Pod already gone or terminating: pod={}, status={}",
                    name,
                    response.status()
                );
                Ok(DeleteOutcome::AlreadyGone)
            }
            ResponseClass::Transient | ResponseClass::Permanent => {
                Err(status_error(Method::DELETE, &url, response).await)
            }
        }
    }

    async fn is_pod_terminating(&self, name: &str) -> Result<bool> {
        let (request, url) = self.request(Method::GET, &self.pod_path(name))?;
        let response = self.execute(Method::GET, &url, request).await?;

        // a pod that no longer exists needs no deletion either
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(true);
        }
        if !classify_request(Some(response.status())).is_success() {
            return Err(status_error(Method::GET, &url, response).await);
        }

        let pod: Pod = response.json().await.map_err(|source| Error::Decode {
            method: Method::GET,
            url: url.clone(),
            source,
        })?;
        Ok(pod.metadata.deletion_timestamp.is_some())
    }

    async fn create_event(&self, event: &RestartEvent) -> Result<()> {
        let (request, url) = self.request(Method::POST, &self.events_path())?;
        let response = self
            .execute(Method::POST, &url, request.json(&Event::from(event)))
            .await?;
        if !classify_request(Some(response.status())).is_success() {
            return Err(status_error(Method::POST, &url, response).await);
        }
        Ok(())
    }
}
