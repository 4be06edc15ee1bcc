//! s3fuse - Mount an S3 bucket as a FUSE filesystem
//!
//! Presents a bucket as a flat directory of files: listings come from
//! the bucket listing, reads are ranged gets, and every write replaces
//! the whole object after a local read-modify-write pass.

pub mod config;
pub mod error;
pub mod fs;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};
