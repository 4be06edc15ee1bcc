//! Object store backends
//!
//! The adapter talks to the bucket through the [`ObjectStore`] trait so the
//! core never depends on a concrete SDK. `s3` is the real backend; `mem`
//! keeps everything in memory for tests and local experiments.

mod mem;
mod s3;

pub use mem::MemoryStore;
pub use s3::S3Store;

use crate::error::Result;
use async_trait::async_trait;
use std::time::SystemTime;

/// Metadata returned by a head-object probe
#[derive(Debug, Clone, Copy)]
pub struct ObjectMeta {
    /// Object length in bytes
    pub size: u64,
    /// Last modification time reported by the store
    pub last_modified: SystemTime,
}

/// Stateless request/response client for a single bucket.
///
/// Absence is data, not failure: `head_object` answers `Ok(None)` for a
/// missing key and reserves `Err` for transport-level problems. Ranged
/// reads expect the caller to stay within the object; callers clamp
/// against a fresh head probe first.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Name of the bucket this client serves
    fn bucket(&self) -> &str;

    /// Check that the backing bucket exists
    async fn bucket_exists(&self) -> Result<bool>;

    /// Probe a key for existence and metadata
    async fn head_object(&self, key: &str) -> Result<Option<ObjectMeta>>;

    /// List every key in the bucket
    async fn list_objects(&self) -> Result<Vec<String>>;

    /// Fetch `len` bytes starting at `offset`
    async fn get_range(&self, key: &str, offset: u64, len: u64) -> Result<Vec<u8>>;

    /// Replace the object with `body` in a single operation
    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<()>;

    /// Delete the object
    async fn delete_object(&self, key: &str) -> Result<()>;

    /// Server-side copy from `src` to `dst`
    async fn copy_object(&self, src: &str, dst: &str) -> Result<()>;
}
