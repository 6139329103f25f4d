use std::path::{Path, PathBuf};

use super::{Error, Result};
use crate::fsutil;

/// Directory where Kubernetes mounts the pod's service account credentials.
pub const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

const TOKEN_FILE: &str = "token";
const CA_CERT_FILE: &str = "ca.crt";
const NAMESPACE_FILE: &str = "namespace";

const SERVICE_HOST_ENV: &str = "KUBERNETES_SERVICE_HOST";
const SERVICE_PORT_ENV: &str = "KUBERNETES_SERVICE_PORT";

/// Paths of the service account material inside a credentials directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceAccount {
    dir: PathBuf,
}

impl Default for ServiceAccount {
    fn default() -> Self {
        Self::new(SERVICE_ACCOUNT_DIR)
    }
}

impl ServiceAccount {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn token_path(&self) -> PathBuf {
        self.dir.join(TOKEN_FILE)
    }

    pub fn ca_cert_path(&self) -> PathBuf {
        self.dir.join(CA_CERT_FILE)
    }

    pub fn namespace_path(&self) -> PathBuf {
        self.dir.join(NAMESPACE_FILE)
    }

    /// Returns true if the token file exists.
    pub fn exists(&self) -> bool {
        token_exists(self.token_path())
    }

    /// Reads the bearer token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Credentials`] if the token file cannot be read.
    pub fn read_token(&self) -> Result<String> {
        fsutil::read_trimmed(self.token_path()).map_err(Error::Credentials)
    }

    /// Reads the namespace the pod runs in.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Credentials`] if the namespace file cannot be read.
    pub fn read_namespace(&self) -> Result<String> {
        fsutil::read_trimmed(self.namespace_path()).map_err(Error::Credentials)
    }

    /// Reads the PEM encoded cluster CA bundle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Credentials`] if the CA file cannot be read.
    pub fn read_ca_cert(&self) -> Result<Vec<u8>> {
        let path = self.ca_cert_path();
        std::fs::read(&path).map_err(|source| {
            Error::Credentials(fsutil::ReadFileError::Read { path, source })
        })
    }
}

/// Returns true if the process runs inside a Kubernetes pod with a mounted
/// service account token.
pub fn is_in_cluster() -> bool {
    ServiceAccount::default().exists()
}

pub(crate) fn token_exists(path: impl AsRef<Path>) -> bool {
    match path.as_ref().try_exists() {
        Ok(exists) => exists,
        Err(err) => {
            log::warn!(
                target: "kube",
                "Failed to check service account token `{}`: {}",
                path.as_ref().display(),
                err
            );
            false
        }
    }
}

/// Builds the API server base URL from the standard service environment
/// variables.
///
/// # Errors
///
/// Returns [`Error::MissingEnv`] if either variable is unset.
pub fn api_server_url_from_env() -> Result<String> {
    let host = std::env::var(SERVICE_HOST_ENV).map_err(|_| Error::MissingEnv(SERVICE_HOST_ENV))?;
    let port = std::env::var(SERVICE_PORT_ENV).map_err(|_| Error::MissingEnv(SERVICE_PORT_ENV))?;
    Ok(api_server_url(&host, &port))
}

/// Formats `https://host:port`, bracketing IPv6 literals.
pub fn api_server_url(host: &str, port: &str) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("https://[{host}]:{port}")
    } else {
        format!("https://{host}:{port}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_server_url_ipv4() {
        assert_eq!(api_server_url("10.96.0.1", "443"), "https://10.96.0.1:443");
    }

    #[test]
    fn test_api_server_url_ipv6() {
        assert_eq!(api_server_url("fd00::1", "6443"), "https://[fd00::1]:6443");
        assert_eq!(
            api_server_url("[fd00::1]", "6443"),
            "https://[fd00::1]:6443"
        );
    }

    #[test]
    fn test_service_account_files() {
        let dir = tempfile::tempdir().unwrap();
        let account = ServiceAccount::new(dir.path());
        assert!(!account.exists());
        assert!(matches!(account.read_token(), Err(Error::Credentials(_))));

        std::fs::write(account.token_path(), "secret-token\n").unwrap();
        std::fs::write(account.namespace_path(), "storage\n").unwrap();
        std::fs::write(account.ca_cert_path(), "-----BEGIN CERTIFICATE-----").unwrap();

        assert!(account.exists());
        assert_eq!(account.read_token().unwrap(), "secret-token");
        assert_eq!(account.read_namespace().unwrap(), "storage");
        assert!(!account.read_ca_cert().unwrap().is_empty());
    }

    #[test]
    fn test_default_paths() {
        let account = ServiceAccount::default();
        assert_eq!(
            account.token_path(),
            PathBuf::from("/var/run/secrets/kubernetes.io/serviceaccount/token")
        );
        assert_eq!(
            account.ca_cert_path(),
            PathBuf::from("/var/run/secrets/kubernetes.io/serviceaccount/ca.crt")
        );
    }
}
