//! Error types for skyview

use miette::Diagnostic;
use thiserror::Error;

/// Main error type for skyview operations
#[derive(Debug, Error, Diagnostic)]
pub enum ViewerError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

/// Failures while talking to the service or validating what it returned.
///
/// Cloneable so a single failed fetch can be handed to every caller that was
/// waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum FetchError {
    /// The request never produced a usable response
    #[error("{message}")]
    #[diagnostic(code(fetch::transport))]
    Transport { message: String },

    /// The service answered with an XRPC error
    #[error("{message}")]
    #[diagnostic(code(fetch::xrpc))]
    Xrpc {
        error: Option<String>,
        message: String,
    },

    /// A fetched record is not the kind of record that was asked for
    #[error("Invalid {kind} record {uri}")]
    #[diagnostic(
        code(fetch::invalid_record),
        help("the referenced record exists but has a different type")
    )]
    InvalidRecord { kind: &'static str, uri: String },

    #[error("invalid AT URI: {0}")]
    #[diagnostic(code(fetch::invalid_uri))]
    InvalidUri(String),

    /// The background task driving a shared fetch went away
    #[error("fetch task failed: {0}")]
    #[diagnostic(code(fetch::task))]
    Task(String),
}

impl FetchError {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport {
            message: err.to_string(),
        }
    }

    pub fn xrpc(err: impl std::fmt::Display) -> Self {
        Self::Xrpc {
            error: None,
            message: err.to_string(),
        }
    }

    pub fn invalid_record(kind: &'static str, uri: impl Into<String>) -> Self {
        Self::InvalidRecord {
            kind,
            uri: uri.into(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value}")]
    #[diagnostic(code(config::invalid_env))]
    InvalidEnv { var: &'static str, value: String },

    #[error("failed to parse url {url}: {message}")]
    #[diagnostic(code(config::url_parse), help("service URLs look like https://bsky.social"))]
    UrlParse { url: String, message: String },

    #[error("unknown collection {0}")]
    #[diagnostic(
        code(config::unknown_collection),
        help("expected one of posts, shares, likes, follows, blocks")
    )]
    UnknownCollection(String),
}

pub type Result<T, E = ViewerError> = std::result::Result<T, E>;
