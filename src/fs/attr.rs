//! Attribute cache
//!
//! Per-key metadata kept only while a file is open. The cache is the
//! single source of truth for "is this key currently open"; once the
//! last handle goes away the entry is dropped and later accesses
//! re-probe the object store.

use crate::error::{Error, Result};
use crate::store::ObjectMeta;

use std::collections::HashMap;
use std::time::SystemTime;

/// Cached attributes for one object
#[derive(Debug, Clone, Copy)]
pub struct ObjectAttr {
    /// Object size in bytes
    pub size: u64,
    /// Last access time
    pub atime: SystemTime,
    /// Last modification time
    pub mtime: SystemTime,
    /// Last status change time
    pub ctime: SystemTime,
}

impl ObjectAttr {
    pub fn from_meta(meta: &ObjectMeta) -> Self {
        ObjectAttr {
            size: meta.size,
            atime: SystemTime::now(),
            mtime: meta.last_modified,
            ctime: meta.last_modified,
        }
    }
}

/// Cache entry for an open key.
///
/// Invariant: an entry exists exactly while `refs >= 1`.
#[derive(Debug, Clone, Copy)]
pub struct OpenEntry {
    pub attr: ObjectAttr,
    pub refs: u64,
}

/// Map from object key to its open-handle entry
#[derive(Default)]
pub struct AttrCache {
    entries: HashMap<String, OpenEntry>,
}

impl AttrCache {
    pub fn new() -> Self {
        AttrCache {
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&OpenEntry> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut OpenEntry> {
        self.entries.get_mut(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Record one more open handle for `key`, creating the entry from
    /// `attr` on the first open. Returns the new reference count.
    pub fn open_entry(&mut self, key: &str, attr: ObjectAttr) -> u64 {
        let entry = self
            .entries
            .entry(key.to_string())
            .or_insert(OpenEntry { attr, refs: 0 });
        entry.refs += 1;
        entry.attr.atime = SystemTime::now();
        entry.refs
    }

    /// Drop one open handle for `key`, removing the entry when the last
    /// handle goes away. Releasing a key that was never opened is the
    /// caller's bug and reports `BadHandle`.
    pub fn release_entry(&mut self, key: &str) -> Result<()> {
        let entry = self
            .entries
            .get_mut(key)
            .ok_or_else(|| Error::BadHandle(key.to_string()))?;

        entry.refs -= 1;
        if entry.refs == 0 {
            self.entries.remove(key);
        }
        Ok(())
    }

    /// Forget `key` unconditionally (unlink / rename of an open file)
    pub fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn attr(size: u64) -> ObjectAttr {
        let now = SystemTime::now();
        ObjectAttr {
            size,
            atime: now,
            mtime: now,
            ctime: now,
        }
    }

    #[test]
    fn refcount_tracks_opens() {
        let mut cache = AttrCache::new();

        assert_eq!(cache.open_entry("a.txt", attr(3)), 1);
        assert_eq!(cache.open_entry("a.txt", attr(3)), 2);
        assert_eq!(cache.get("a.txt").unwrap().refs, 2);

        cache.release_entry("a.txt").unwrap();
        assert_eq!(cache.get("a.txt").unwrap().refs, 1);

        cache.release_entry("a.txt").unwrap();
        assert!(!cache.contains("a.txt"));
    }

    #[test]
    fn release_without_open_is_bad_handle() {
        let mut cache = AttrCache::new();
        match cache.release_entry("never-opened") {
            Err(Error::BadHandle(key)) => assert_eq!(key, "never-opened"),
            other => panic!("expected BadHandle, got {:?}", other.err()),
        }
    }

    #[test]
    fn entries_never_exist_with_zero_refs() {
        let mut cache = AttrCache::new();
        for _ in 0..5 {
            cache.open_entry("k", attr(0));
        }
        for _ in 0..5 {
            cache.release_entry("k").unwrap();
        }
        assert!(!cache.contains("k"));
        // a fresh open starts back at 1
        assert_eq!(cache.open_entry("k", attr(0)), 1);
    }
}
