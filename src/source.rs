//! Run-parameter validation for git-repository sources.
//!
//! The git extractor family shares the run-params shape used by the API
//! collectors: a source identifier plus connection details. Validation
//! lives here so every extractor rejects malformed sources the same way,
//! before a run is scheduled.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation failures for a git source.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SourceError {
    /// The repository identifier is empty.
    #[error("empty repo id")]
    EmptyRepoId,

    /// The repository URL is empty.
    #[error("empty url")]
    EmptyUrl,

    /// The repository URL is not a supported scheme.
    #[error("unsupported repository url: {0}")]
    UnsupportedUrl(String),

    /// The proxy is not an http proxy.
    #[error("only http proxies are supported, got: {0}")]
    UnsupportedProxy(String),
}

/// Connection options identifying one git repository source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitSourceOptions {
    /// Logical repository identifier, written into staged rows.
    pub repo_id: String,
    /// Repository URL: `http(s)://…`, `ssh://…`, `git@…`, or an absolute
    /// local path.
    pub url: String,
    /// Username for http auth.
    #[serde(default)]
    pub user: String,
    /// Password for http auth.
    #[serde(default)]
    pub password: String,
    /// Private key for ssh auth.
    #[serde(default)]
    pub private_key: String,
    /// Passphrase for the private key.
    #[serde(default)]
    pub passphrase: String,
    /// Optional http proxy.
    #[serde(default)]
    pub proxy: String,
}

impl GitSourceOptions {
    /// Checks that the options describe a reachable repository.
    ///
    /// # Errors
    ///
    /// Returns the first [`SourceError`] the options violate.
    pub fn validate(&self) -> Result<(), SourceError> {
        if self.repo_id.is_empty() {
            return Err(SourceError::EmptyRepoId);
        }
        if self.url.is_empty() {
            return Err(SourceError::EmptyUrl);
        }

        let stripped = self.url.strip_prefix("ssh://").unwrap_or(&self.url);
        let supported = self.url.starts_with("http")
            || stripped.starts_with("git@")
            || self.url.starts_with('/');
        if !supported {
            return Err(SourceError::UnsupportedUrl(self.url.clone()));
        }

        if !self.proxy.is_empty() && !self.proxy.starts_with("http://") {
            return Err(SourceError::UnsupportedProxy(self.proxy.clone()));
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn options(url: &str) -> GitSourceOptions {
        GitSourceOptions {
            repo_id: "github:owner/repo".to_string(),
            url: url.to_string(),
            ..GitSourceOptions::default()
        }
    }

    #[test]
    fn test_accepts_http_https_ssh_scp_and_paths() {
        assert!(options("https://github.com/owner/repo.git").validate().is_ok());
        assert!(options("http://internal.git/repo").validate().is_ok());
        assert!(options("ssh://git@github.com/owner/repo.git").validate().is_ok());
        assert!(options("git@github.com:owner/repo.git").validate().is_ok());
        assert!(options("/srv/git/repo.git").validate().is_ok());
    }

    #[test]
    fn test_rejects_empty_repo_id() {
        let mut opts = options("https://github.com/owner/repo.git");
        opts.repo_id = String::new();
        assert_eq!(opts.validate(), Err(SourceError::EmptyRepoId));
    }

    #[test]
    fn test_rejects_empty_url() {
        assert_eq!(options("").validate(), Err(SourceError::EmptyUrl));
    }

    #[test]
    fn test_rejects_unsupported_scheme() {
        assert!(matches!(
            options("ftp://example.com/repo").validate(),
            Err(SourceError::UnsupportedUrl(_))
        ));
        assert!(matches!(
            options("relative/path").validate(),
            Err(SourceError::UnsupportedUrl(_))
        ));
    }

    #[test]
    fn test_rejects_non_http_proxy() {
        let mut opts = options("https://github.com/owner/repo.git");
        opts.proxy = "socks5://127.0.0.1:1080".to_string();
        assert!(matches!(
            opts.validate(),
            Err(SourceError::UnsupportedProxy(_))
        ));

        opts.proxy = "http://127.0.0.1:8080".to_string();
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_serde_field_names() {
        let opts: GitSourceOptions = serde_json::from_str(
            r#"{"repoId": "r1", "url": "https://github.com/o/r.git", "privateKey": "k"}"#,
        )
        .unwrap();
        assert_eq!(opts.repo_id, "r1");
        assert_eq!(opts.private_key, "k");
        assert!(opts.validate().is_ok());
    }
}
