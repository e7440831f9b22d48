use reqwest::StatusCode;

/// Errors surfaced by a [crate::ChangeFetcher] or while building a poller.
///
/// Only whole-cycle fetch failures are reported through these; anything that goes wrong while
/// rendering a payload degrades to [crate::EMPTY_CACHE_MARKER] instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The request could not be built or sent, or the body could not be read.
    #[error("http get request error: {0}")]
    Request(#[source] reqwest::Error),

    /// The remote service answered with something other than 200.
    #[error("non-OK HTTP status: {0}")]
    Status(StatusCode),

    /// The response body was not valid JSON.
    #[error("decode error: {0}")]
    Decode(#[source] serde_json::Error),

    /// A page reported a `till` cursor that is not an integer.
    #[error("invalid cursor {value}: expected an integer")]
    Cursor { value: String },

    #[error("error when decode data to split: {0}")]
    SplitDecode(#[source] serde_json::Error),

    #[error("error when decode data to segment: {0}")]
    SegmentDecode(#[source] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
