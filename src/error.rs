//! Error types for s3fuse

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for s3fuse
#[derive(Error, Debug)]
pub enum Error {
    // Mount errors
    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    // Namespace errors
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    // Data errors
    #[error("Read offset {offset} beyond object size {size}")]
    OutOfRange { offset: u64, size: u64 },

    #[error("No open handle for path: {0}")]
    BadHandle(String),

    // Object store errors
    #[error("Object store error: {0}")]
    Store(String),

    #[error("Operation not supported: {0}")]
    Unsupported(&'static str),

    // Config errors
    #[error("Configuration error: {0}")]
    Config(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Convert to libc errno for FUSE
    pub fn to_errno(&self) -> libc::c_int {
        match self {
            Error::NotFound(_) | Error::BucketNotFound(_) => libc::ENOENT,
            Error::AlreadyExists(_) => libc::EEXIST,
            Error::OutOfRange { .. } => libc::ENXIO,
            Error::BadHandle(_) => libc::EBADF,
            Error::Unsupported(_) => libc::ENOSYS,
            Error::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
            _ => libc::EIO,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_mapping() {
        assert_eq!(Error::NotFound("a.txt".into()).to_errno(), libc::ENOENT);
        assert_eq!(Error::AlreadyExists("a.txt".into()).to_errno(), libc::EEXIST);
        assert_eq!(
            Error::OutOfRange { offset: 10, size: 5 }.to_errno(),
            libc::ENXIO
        );
        assert_eq!(Error::BadHandle("a.txt".into()).to_errno(), libc::EBADF);
        assert_eq!(Error::Unsupported("mkdir").to_errno(), libc::ENOSYS);
        assert_eq!(Error::Store("timeout".into()).to_errno(), libc::EIO);
    }
}
