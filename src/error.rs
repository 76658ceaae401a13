//! Error types for seismic-ingest
//!
//! Everything below `Config` is window-scoped: the orchestrator catches it,
//! logs it with the window bounds and stage, and moves on to the next window.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for seismic-ingest operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for seismic-ingest
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration; aborts the run before any I/O
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "end_date")
        key: Option<String>,
    },

    /// The HTTP transfer failed or was rejected
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// The body was not a usable XML document
    #[error("XML error: {0}")]
    Xml(#[from] XmlParseError),

    /// A mandatory event field was missing or not numeric
    #[error("extraction error: {0}")]
    Extract(#[from] FieldExtractionError),

    /// Filesystem error with the path involved
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The metrics recorder could not be installed or exported
    #[error("metrics error: {0}")]
    Metrics(String),

    /// A window task panicked before recording its outcome
    #[error("window task panicked: {0}")]
    Panicked(String),
}

impl Error {
    pub fn config(message: impl Into<String>, key: &str) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Config errors abort the run; everything else is scoped to one window.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config { .. })
    }
}

/// Outcome classification of one HTTP attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Connection failure, timeout, or an interrupted body
    #[error("network error: {0}")]
    Network(String),

    /// Non-2xx status; the body was not read
    #[error("HTTP status {0}")]
    HttpStatus(u16),
}

impl FetchError {
    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Network(_) => true,
            FetchError::HttpStatus(code) => *code >= 500 || *code == 429,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum XmlParseError {
    #[error("malformed XML at byte {position}: {message}")]
    Malformed { position: u64, message: String },

    #[error("document has no root element")]
    MissingRoot,

    #[error("unexpected root element <{found}>, expected <{expected}>")]
    UnexpectedRoot {
        expected: &'static str,
        found: String,
    },
}

/// Names the event field that could not be extracted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("field `{field}`: {reason}")]
pub struct FieldExtractionError {
    pub field: &'static str,
    pub reason: String,
}

impl FieldExtractionError {
    pub fn missing(field: &'static str) -> Self {
        Self {
            field,
            reason: "missing".to_string(),
        }
    }

    pub fn invalid(field: &'static str, raw: &str) -> Self {
        Self {
            field,
            reason: format!("not a finite number: {raw:?}"),
        }
    }
}
