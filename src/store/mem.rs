//! In-memory object store backend
//!
//! Mirrors the semantics the adapter relies on from S3 (absence as
//! `None`, ranged reads, whole-object replace) without the network.
//! Used by the core test suite and handy for local experiments.

use crate::error::{Error, Result};
use crate::store::{ObjectMeta, ObjectStore};

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

struct MemObject {
    body: Vec<u8>,
    last_modified: SystemTime,
}

/// In-memory implementation of [`ObjectStore`]
pub struct MemoryStore {
    // BTreeMap so listings come back in key order, like S3
    objects: Mutex<BTreeMap<String, MemObject>>,
    bucket_exists: bool,
    fail_puts: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            objects: Mutex::new(BTreeMap::new()),
            bucket_exists: true,
            fail_puts: AtomicBool::new(false),
        }
    }

    /// A store whose bucket probe fails, for exercising mount-time errors
    pub fn missing_bucket() -> Self {
        MemoryStore {
            objects: Mutex::new(BTreeMap::new()),
            bucket_exists: false,
            fail_puts: AtomicBool::new(false),
        }
    }

    /// Make every `put_object` report a store failure without writing,
    /// for exercising upload error paths
    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Seed an object directly, bypassing the filesystem surface
    pub fn insert(&self, key: &str, body: Vec<u8>) {
        self.objects.lock().insert(
            key.to_string(),
            MemObject {
                body,
                last_modified: SystemTime::now(),
            },
        );
    }

    /// Raw object content, for assertions in tests
    pub fn content(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().get(key).map(|o| o.body.clone())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn bucket(&self) -> &str {
        "memory"
    }

    async fn bucket_exists(&self) -> Result<bool> {
        Ok(self.bucket_exists)
    }

    async fn head_object(&self, key: &str) -> Result<Option<ObjectMeta>> {
        Ok(self.objects.lock().get(key).map(|o| ObjectMeta {
            size: o.body.len() as u64,
            last_modified: o.last_modified,
        }))
    }

    async fn list_objects(&self) -> Result<Vec<String>> {
        Ok(self.objects.lock().keys().cloned().collect())
    }

    async fn get_range(&self, key: &str, offset: u64, len: u64) -> Result<Vec<u8>> {
        let objects = self.objects.lock();
        let object = objects
            .get(key)
            .ok_or_else(|| Error::NotFound(key.to_string()))?;

        let start = (offset as usize).min(object.body.len());
        let end = ((offset + len) as usize).min(object.body.len());
        Ok(object.body[start..end].to_vec())
    }

    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<()> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(Error::Store(format!("put object {}: rejected", key)));
        }
        self.insert(key, body);
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.objects.lock().remove(key);
        Ok(())
    }

    async fn copy_object(&self, src: &str, dst: &str) -> Result<()> {
        let mut objects = self.objects.lock();
        let body = objects
            .get(src)
            .map(|o| o.body.clone())
            .ok_or_else(|| Error::NotFound(src.to_string()))?;
        objects.insert(
            dst.to_string(),
            MemObject {
                body,
                last_modified: SystemTime::now(),
            },
        );
        Ok(())
    }
}
