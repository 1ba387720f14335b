//! Crate-wide error type
//!
//! Validators never use these for per-resource findings (those become
//! [`crate::report::Problem`]s); errors here are total enumeration
//! failures, caller/usage errors, and setup/mutation faults.

use thiserror::Error;

use crate::assertions::ValidationFailure;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("GitHub API error: HTTP {status} for {url}: {message}")]
    GitHubApi {
        status: u16,
        url: String,
        message: String,
    },

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("invalid configuration: {0}")]
    ConfigError(String),

    #[error("no {kind} found in scope '{scope}'")]
    EmptyScope { kind: &'static str, scope: String },

    #[error("invalid URL: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error(transparent)]
    ValidationFailed(#[from] ValidationFailure),
}
