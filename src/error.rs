use std::io;
use std::result;

use thiserror::Error;

/// Error taxonomy for the engine and the repair tool.
///
/// Mirrors the `Status` kinds a reader reaches the repair entry point with:
/// `Ok` (the `Result::Ok` case), `Corruption`, `IoError`, `NotFound`, and
/// `InvalidArgument`.
#[derive(Error, Debug)]
pub enum Error {
    #[error("corruption: {0}")]
    Corruption(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("io error")]
    IoError {
        #[from]
        source: io::Error,
    },
}

pub type Result<T> = result::Result<T, Error>;

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
            || matches!(self, Error::IoError { source } if source.kind() == io::ErrorKind::NotFound)
    }
}
