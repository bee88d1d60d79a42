use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ImportError>;

/// Failures that abort an import run. Per-post crawl failures never surface
/// here; the crawler logs and drops them.
#[derive(Debug, Error)]
pub enum ImportError {
    /// Missing or conflicting flags, detected before any I/O.
    #[error("configuration error: {0}")]
    Config(String),

    /// Non-2xx response where the adapter cannot continue without it.
    #[error("{context}: HTTP status {status}")]
    Status { context: String, status: u16 },

    /// Top-level response arrived but was unusable (GraphQL errors, no posts, ...).
    #[error("{context}: {message}")]
    Dependency { context: String, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid XML: {0}")]
    Xml(#[from] quick_xml::Error),

    /// File system failure, tagged with the file involved.
    #[error("{}: {cause}", .path.display())]
    File { path: PathBuf, cause: std::io::Error },

    #[error("storeArea block not found in template {0}")]
    MissingSentinel(PathBuf),
}

impl ImportError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn file(path: impl Into<PathBuf>, cause: std::io::Error) -> Self {
        Self::File {
            path: path.into(),
            cause,
        }
    }

    pub fn dependency(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Dependency {
            context: context.into(),
            message: message.into(),
        }
    }
}
