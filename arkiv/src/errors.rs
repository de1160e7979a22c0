//! Nobody is perfect.
use reqwest::StatusCode;
use thiserror::Error;

/// Error used by the entire Arkiv crate.
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP error.
    #[error("{0}")]
    Http(#[from] reqwest::Error),

    /// Url error.
    #[error("invalid url")]
    Url(#[from] url::ParseError),

    /// Header value error, usually a token containing non-ASCII bytes.
    #[error("invalid header value")]
    Header(#[from] reqwest::header::InvalidHeaderValue),

    /// I/O error.
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Byte range error.
    #[error("{0}")]
    Range(#[from] crate::range::InvalidRange),

    /// The server replied with a status code we did not expect.
    #[error("unexpected status: {0}")]
    UnexpectedStatus(StatusCode),

    /// The server reported a failure in the response envelope.
    #[error("api error: {0}")]
    Api(String),

    /// Folder not found.
    #[error("no folder found")]
    NoFolder,

    /// File not found.
    #[error("no file found")]
    NoFile,

    /// No credential is stored for the current user.
    #[error("could not find access token")]
    NoToken,

    /// Login or refresh was rejected.
    #[error("authentication failed: {0}")]
    AuthFailed(StatusCode),

    /// The refresh token has expired; a new login is required.
    #[error("refresh token expired")]
    RefreshExpired,

    /// The server refused a chunk mid-upload. The upload is abandoned;
    /// no partial file exists remotely.
    #[error("chunk {chunk} upload failed, status: {status}, message: {message}")]
    ChunkRejected {
        /// One-based index of the rejected chunk.
        chunk: u64,
        /// Status code the server replied with.
        status: StatusCode,
        /// Message from the response envelope, or the raw body.
        message: String,
    },

    /// Every chunk was accepted but the server never returned the
    /// finished file record.
    #[error("upload ended without a file record")]
    IncompleteUpload,

    /// Zero-byte uploads are rejected before any network traffic.
    #[error("refusing to upload an empty file")]
    EmptyUpload,
}
