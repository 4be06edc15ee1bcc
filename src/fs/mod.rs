//! Filesystem core
//!
//! `adapter` holds the state machine that maps filesystem calls onto
//! object-store requests, `attr` the per-open-file attribute cache,
//! and `fuse` the kernel-facing transport.

pub mod attr;

mod adapter;
mod fuse;

pub use adapter::{FileKind, ObjectFs, Stat};
pub use fuse::S3Fuse;
