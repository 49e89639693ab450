//! Error taxonomy shared by the catalog fetcher and the playback controller.

use thiserror::Error;

/// A catalog request failed. Every variant is a fetch failure for the
/// resource it names; callers surface it once and drop any partial results.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("failed to fetch {resource}: {source}")]
    Request {
        resource: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to fetch {resource}: HTTP {status}")]
    Status {
        resource: &'static str,
        status: reqwest::StatusCode,
    },

    #[error("malformed {resource}: {source}")]
    Decode {
        resource: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl CatalogError {
    pub fn resource(&self) -> Option<&'static str> {
        match self {
            CatalogError::Request { resource, .. }
            | CatalogError::Status { resource, .. }
            | CatalogError::Decode { resource, .. } => Some(resource),
            CatalogError::Client(_) => None,
        }
    }
}

/// Why the current channel is not playing.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlaybackError {
    #[error("no stream available for this channel")]
    NoStreamsAvailable,

    #[error("playback error: {0}")]
    Transport(String),

    #[error("network error: {0}")]
    FatalNetwork(String),

    #[error("media error: {0}")]
    FatalMedia(String),

    #[error("stream error: {0}")]
    FatalOther(String),

    #[error("playback failed, no alternative source available")]
    AllCandidatesExhausted,
}

impl PlaybackError {
    /// True for errors that end playback of the current channel until the
    /// user selects another channel or retries manually.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PlaybackError::NoStreamsAvailable | PlaybackError::AllCandidatesExhausted
        )
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;
