//! Adapter-level errors.
use std::io::ErrorKind;

use thiserror::Error;

/// Error used by the entire crate.
#[derive(Debug, Error)]
pub enum Error {
    /// The backend client failed.
    #[error(transparent)]
    Remote(#[from] arkiv::Error),

    /// Scratch or cache I/O failed.
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// The operation has no backend equivalent.
    #[error("not supported")]
    NotSupported,

    /// Zero-byte files cannot be uploaded.
    #[error("file is empty")]
    EmptyFile,

    /// Nothing lives at the path.
    #[error("{0} not found")]
    NotFound(String),

    /// A directory operation hit a file.
    #[error("{0} is not a directory")]
    NotADirectory(String),

    /// A file operation hit a directory.
    #[error("{0} is a directory")]
    IsADirectory(String),
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        let kind = match &err {
            Error::Io(err) => err.kind(),
            Error::Remote(arkiv::Error::NoFile | arkiv::Error::NoFolder)
            | Error::NotFound(_) => ErrorKind::NotFound,
            Error::NotSupported => ErrorKind::Unsupported,
            Error::EmptyFile => ErrorKind::InvalidInput,
            Error::NotADirectory(_) => ErrorKind::NotADirectory,
            Error::IsADirectory(_) => ErrorKind::IsADirectory,
            Error::Remote(_) => ErrorKind::Other,
        };

        Self::new(kind, err)
    }
}
