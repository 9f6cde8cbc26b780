//! Error types for each stage of a guide build
//!
//! Every failure here is scoped to a single source (or a single config/output
//! operation). None of them aborts a run on its own; the merge driver turns
//! them into log lines and skip reasons.

use thiserror::Error;

/// Failures while retrieving a playlist or EPG document
#[derive(Error, Debug)]
pub enum LoadError {
    /// Connection, DNS or timeout failure reported by the HTTP client
    #[error("Request failed for {url}: {message}")]
    Request { url: String, message: String },

    /// Server answered with a non-2xx status
    #[error("HTTP error {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    /// Body could not be read to the end
    #[error("Read failed for {url}: {message}")]
    Read { url: String, message: String },

    /// Payload looked like gzip but did not inflate
    #[error("Decompression failed for {url}: {source}")]
    Decompress {
        url: String,
        #[source]
        source: std::io::Error,
    },

    /// Local file could not be read
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// A single parse attempt over an EPG document
#[derive(Error, Debug, Clone, PartialEq)]
#[error("XML error at byte {position}: {message}")]
pub struct XmlError {
    pub position: u64,
    pub message: String,
}

impl XmlError {
    pub fn new(position: u64, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }
}

/// Both parse steps over an EPG document failed
#[derive(Error, Debug, Clone, PartialEq)]
#[error("EPG document unparseable (strict: {strict}; lossy: {lossy})")]
pub struct DocumentError {
    /// Why the raw bytes were rejected
    pub strict: XmlError,
    /// Why the decoded and sanitised text was rejected as well
    pub lossy: XmlError,
}

/// Why a source contributed nothing to the output
#[derive(Error, Debug)]
pub enum SkipReason {
    #[error("playlist unavailable: {0}")]
    PlaylistUnavailable(#[source] LoadError),

    #[error("playlist contains no tvg-id entries")]
    NoIdentifiers,

    #[error("no EPG URL configured and the playlist header names none")]
    NoEpgUrl,

    #[error("EPG unavailable: {0}")]
    EpgUnavailable(#[source] LoadError),

    #[error("{0}")]
    EpgUnparseable(#[from] DocumentError),
}

/// Config file problems
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Serialising or persisting the merged guide
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Failed to serialise guide: {0}")]
    Xml(String),

    #[error("Failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
