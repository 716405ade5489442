use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Every failure the installer pipeline can surface.
#[derive(Error, Debug)]
pub enum Error {
    #[error("no release found")]
    NoRelease,

    #[error("no asset found")]
    NoAsset,

    #[error("multiple assets share the highest weight: {}", join_weighted(.0))]
    MultipleMaxWeightAssets(Vec<(String, u32)>),

    #[error("no asset matched the name pattern")]
    NoPatternMatch,

    #[error("multiple assets matched the name pattern: {}", .0.join(", "))]
    MultiplePatternMatches(Vec<String>),

    #[error("resource not found: {url}")]
    NotFound { url: String },

    #[error("request to {url} failed with status code {status}")]
    Status { url: String, status: u16 },

    #[error("request to {url} failed")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to decode response from {url}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid JSON from {url}")]
    Json {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to parse directory listing from {url}")]
    Listing {
        url: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to build HTTP client")]
    Client(#[source] reqwest::Error),

    #[error("invalid header {0}")]
    InvalidHeader(String),

    #[error("invalid url {url}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unsupported archive file: {0}")]
    UnsupportedArchive(String),

    #[error("corrupt archive {}: {reason}", .path.display())]
    Archive { path: PathBuf, reason: String },

    #[error("{operation} {}", .path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Error {
    /// `true` for the "nothing to install" family, which callers report
    /// without failing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NoRelease | Error::NoAsset | Error::NotFound { .. })
    }

    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            operation,
            path: path.into(),
            source,
        }
    }
}

fn join_weighted(assets: &[(String, u32)]) -> String {
    assets
        .iter()
        .map(|(name, weight)| format!("{name} (weight {weight})"))
        .collect::<Vec<_>>()
        .join(", ")
}
