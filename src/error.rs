//! Error types for each stage of the reporting pipeline.
//!
//! Only [`ReportError`] ever reaches the [`Dispatcher`](crate::Dispatcher)
//! boundary, where it is turned into a log event. Stack and enrichment
//! errors are degraded in place by the resolver.

use thiserror::Error;

/// Reasons a dispatcher refuses to report.
///
/// These are expected states (reporting switched off, credentials not
/// provisioned) rather than failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Reporting is disabled")]
    Disabled,

    #[error("No collection domain configured")]
    MissingDomain,

    #[error("No API token configured")]
    MissingToken,
}

/// Errors raised while turning raw stack text into frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StackError {
    #[error("Error carries no usable stack trace")]
    MissingStack,

    #[error("None of {lines} stack lines matched a frame pattern")]
    NoFrames { lines: usize },
}

/// Errors raised while fetching source text for a frame preview.
#[derive(Error, Debug)]
pub enum EnrichmentError {
    #[error("Failed to read source file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to fetch source {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Source {url} responded with status {status}")]
    Status { url: String, status: u16 },

    #[error("Unsupported source location: {0}")]
    UnsupportedLocation(String),
}

/// Errors raised by a single delivery attempt.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Collection endpoint responded with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Request to collection endpoint failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Payload serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl TransportError {
    /// HTTP status attached to the failure, if the endpoint answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Network(e) => e.status().map(|s| s.as_u16()),
            Self::Serialize(_) => None,
        }
    }
}

/// Failure of a whole publish call.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
