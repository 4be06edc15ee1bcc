//! Filesystem adapter
//!
//! Translates path-based filesystem operations into object-store
//! requests. The bucket is presented as a flat root directory: every
//! key is a regular file directly under `/`, and the key is the path
//! with the leading slash stripped.
//!
//! Locking follows a single reader/writer lock over the attribute
//! cache. Lookups and reads share it; anything that mutates cache
//! entries or the backing objects holds it exclusively for the whole
//! operation, network round-trips included. A slow write therefore
//! serializes the mount; that trade is deliberate.

use crate::error::{Error, Result};
use crate::fs::attr::{AttrCache, ObjectAttr};
use crate::store::ObjectStore;

use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::RwLock;

/// Chunk size for reassembling an object during read-modify-write
const RMW_CHUNK_SIZE: u64 = 10 * 1024 * 1024;

/// What a path resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Directory,
    RegularFile,
}

/// Result of a getattr call
#[derive(Debug, Clone, Copy)]
pub struct Stat {
    pub kind: FileKind,
    pub attr: ObjectAttr,
}

/// The core filesystem state machine over one bucket
pub struct ObjectFs {
    store: Arc<dyn ObjectStore>,
    cache: RwLock<AttrCache>,
}

/// Strip the leading separator to get the object key
fn key_of(path: &str) -> &str {
    path.strip_prefix('/').unwrap_or(path)
}

impl ObjectFs {
    /// Verify the bucket exists and build the adapter. A missing bucket
    /// is fatal: there is nothing to mount.
    pub async fn new(store: Arc<dyn ObjectStore>) -> Result<Self> {
        if !store.bucket_exists().await? {
            return Err(Error::BucketNotFound(store.bucket().to_string()));
        }
        Ok(ObjectFs {
            store,
            cache: RwLock::new(AttrCache::new()),
        })
    }

    /// List the root directory: `.`, `..`, then one entry per key.
    /// There are no subdirectories, so any other path does not exist.
    pub async fn readdir(&self, path: &str) -> Result<Vec<String>> {
        let _cache = self.cache.read().await;

        if path != "/" {
            return Err(Error::NotFound(path.to_string()));
        }

        let mut entries = vec![".".to_string(), "..".to_string()];
        entries.extend(self.store.list_objects().await?);
        Ok(entries)
    }

    /// Attributes for a path. The root is a synthetic directory; files
    /// are probed fresh against the store on every call.
    pub async fn getattr(&self, path: &str) -> Result<Stat> {
        let _cache = self.cache.read().await;

        if path == "/" {
            let now = SystemTime::now();
            return Ok(Stat {
                kind: FileKind::Directory,
                attr: ObjectAttr {
                    size: 0,
                    atime: now,
                    mtime: now,
                    ctime: now,
                },
            });
        }

        let key = key_of(path);
        let meta = self
            .store
            .head_object(key)
            .await?
            .ok_or_else(|| Error::NotFound(path.to_string()))?;

        Ok(Stat {
            kind: FileKind::RegularFile,
            attr: ObjectAttr::from_meta(&meta),
        })
    }

    /// Read up to `len` bytes at `offset`. The requested range is
    /// clamped to the object's current size; reading right at the end
    /// yields zero bytes, reading past it is an error.
    pub async fn read(&self, path: &str, offset: u64, len: u32) -> Result<Vec<u8>> {
        let _cache = self.cache.read().await;

        let key = key_of(path);
        let meta = self
            .store
            .head_object(key)
            .await?
            .ok_or_else(|| Error::NotFound(path.to_string()))?;

        if offset > meta.size {
            return Err(Error::OutOfRange {
                offset,
                size: meta.size,
            });
        }

        let end = (offset + len as u64).min(meta.size);
        if end == offset {
            return Ok(Vec::new());
        }

        self.store.get_range(key, offset, end - offset).await
    }

    /// Write `data` at `offset`, replacing the whole object.
    ///
    /// Object storage has no partial-write primitive, so the current
    /// content is reassembled locally in fixed-size ranged reads, the
    /// write is spliced in (zero-filling any gap and extending past the
    /// old end as needed), and the result is uploaded as one replace.
    /// Nothing is committed if any step fails; concurrent writers to
    /// the same key race whole objects, last replace wins.
    pub async fn write(&self, path: &str, offset: u64, data: &[u8]) -> Result<usize> {
        let mut cache = self.cache.write().await;

        let key = key_of(path);
        let meta = self
            .store
            .head_object(key)
            .await?
            .ok_or_else(|| Error::NotFound(path.to_string()))?;

        let mut scratch = Vec::with_capacity(meta.size.max(offset + data.len() as u64) as usize);
        while (scratch.len() as u64) < meta.size {
            let fetched = scratch.len() as u64;
            let want = RMW_CHUNK_SIZE.min(meta.size - fetched);
            let chunk = self.store.get_range(key, fetched, want).await?;
            if chunk.is_empty() {
                return Err(Error::Store(format!(
                    "object {} truncated mid-download at byte {}",
                    key, fetched
                )));
            }
            scratch.extend_from_slice(&chunk);
        }

        let start = offset as usize;
        let end = start + data.len();
        if scratch.len() < end {
            scratch.resize(end, 0);
        }
        scratch[start..end].copy_from_slice(data);
        let new_size = scratch.len() as u64;

        self.store.put_object(key, scratch).await?;

        if let Some(entry) = cache.get_mut(key) {
            let now = SystemTime::now();
            entry.attr.size = new_size;
            entry.attr.atime = now;
            entry.attr.mtime = now;
        }

        Ok(data.len())
    }

    /// Create an empty object. Collides with anything already open or
    /// already stored under that key.
    pub async fn create(&self, path: &str) -> Result<()> {
        let cache = self.cache.write().await;

        let key = key_of(path);
        if cache.contains(key) {
            return Err(Error::AlreadyExists(path.to_string()));
        }
        if self.store.head_object(key).await?.is_some() {
            return Err(Error::AlreadyExists(path.to_string()));
        }

        self.store.put_object(key, Vec::new()).await
    }

    /// Open a path, creating or bumping its cache entry. All handles to
    /// one key share a single entry; nothing distinguishes them.
    pub async fn open(&self, path: &str) -> Result<()> {
        let mut cache = self.cache.write().await;

        let key = key_of(path);
        let attr = match cache.get(key) {
            Some(entry) => entry.attr,
            None => {
                let meta = self
                    .store
                    .head_object(key)
                    .await?
                    .ok_or_else(|| Error::NotFound(path.to_string()))?;
                ObjectAttr::from_meta(&meta)
            }
        };

        cache.open_entry(key, attr);
        Ok(())
    }

    /// Release one handle; the entry disappears with the last one
    pub async fn release(&self, path: &str) -> Result<()> {
        let mut cache = self.cache.write().await;
        cache.release_entry(key_of(path))
    }

    /// Update cached timestamps to the given values, or to now
    pub async fn utimens(
        &self,
        path: &str,
        atime: Option<SystemTime>,
        mtime: Option<SystemTime>,
    ) -> Result<()> {
        let mut cache = self.cache.write().await;

        let key = key_of(path);
        if self.store.head_object(key).await?.is_none() {
            return Err(Error::NotFound(path.to_string()));
        }

        if let Some(entry) = cache.get_mut(key) {
            let now = SystemTime::now();
            entry.attr.atime = atime.unwrap_or(now);
            entry.attr.mtime = mtime.unwrap_or(now);
            entry.attr.ctime = now;
        }

        Ok(())
    }

    /// Delete the backing object. Open handles do not protect a key;
    /// the cache entry is dropped and the delete proceeds, matching
    /// object-storage semantics.
    pub async fn unlink(&self, path: &str) -> Result<()> {
        let mut cache = self.cache.write().await;

        let key = key_of(path);
        cache.remove(key);

        if self.store.head_object(key).await?.is_none() {
            return Err(Error::NotFound(path.to_string()));
        }

        self.store.delete_object(key).await
    }

    /// Rename via server-side copy then delete.
    ///
    /// Not atomic: a failure after the copy leaves both keys, a failure
    /// during it leaves only the source. No rollback is attempted; the
    /// namespace stays in whatever intermediate state was reached.
    pub async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let mut cache = self.cache.write().await;

        let src = key_of(from);
        let dst = key_of(to);
        cache.remove(src);

        if self.store.head_object(src).await?.is_none() {
            return Err(Error::NotFound(from.to_string()));
        }
        if self.store.head_object(dst).await?.is_some() {
            return Err(Error::AlreadyExists(to.to_string()));
        }

        self.store.copy_object(src, dst).await?;
        self.store.delete_object(src).await
    }

    /// Reference count of the open entry for a path, if any
    pub async fn open_count(&self, path: &str) -> Option<u64> {
        self.cache.read().await.get(key_of(path)).map(|e| e.refs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    async fn fs_with_store() -> (ObjectFs, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let fs = ObjectFs::new(store.clone()).await.unwrap();
        (fs, store)
    }

    #[tokio::test]
    async fn mount_fails_when_bucket_is_missing() {
        let store = Arc::new(MemoryStore::missing_bucket());
        match ObjectFs::new(store).await {
            Err(Error::BucketNotFound(_)) => {}
            other => panic!("expected BucketNotFound, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn release_without_open_is_bad_handle() {
        let (fs, store) = fs_with_store().await;
        store.insert("a.txt", b"data".to_vec());

        match fs.release("/a.txt").await {
            Err(Error::BadHandle(_)) => {}
            other => panic!("expected BadHandle, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn n_opens_then_n_releases_empty_the_cache() {
        let (fs, store) = fs_with_store().await;
        store.insert("a.txt", b"data".to_vec());

        for i in 1..=4u64 {
            fs.open("/a.txt").await.unwrap();
            assert_eq!(fs.open_count("/a.txt").await, Some(i));
        }
        for i in (0..4u64).rev() {
            fs.release("/a.txt").await.unwrap();
            assert_eq!(fs.open_count("/a.txt").await, (i > 0).then_some(i));
        }

        // the next release has nothing to match
        assert!(fs.release("/a.txt").await.is_err());
    }

    #[tokio::test]
    async fn double_open_single_release_keeps_the_entry() {
        let (fs, store) = fs_with_store().await;
        store.insert("a.txt", b"data".to_vec());

        fs.open("/a.txt").await.unwrap();
        fs.open("/a.txt").await.unwrap();
        fs.release("/a.txt").await.unwrap();
        assert_eq!(fs.open_count("/a.txt").await, Some(1));

        fs.release("/a.txt").await.unwrap();
        assert_eq!(fs.open_count("/a.txt").await, None);
    }

    #[tokio::test]
    async fn write_splices_into_existing_content() {
        let (fs, store) = fs_with_store().await;
        store.insert("a.txt", b"0123456789".to_vec());

        let written = fs.write("/a.txt", 3, b"XYZ").await.unwrap();
        assert_eq!(written, 3);

        let back = fs.read("/a.txt", 0, 64).await.unwrap();
        assert_eq!(back, b"012XYZ6789");
    }

    #[tokio::test]
    async fn write_extends_past_the_current_end() {
        let (fs, store) = fs_with_store().await;
        store.insert("a.txt", b"01234".to_vec());

        fs.write("/a.txt", 3, b"abcdef").await.unwrap();

        let stat = fs.getattr("/a.txt").await.unwrap();
        assert_eq!(stat.attr.size, 9);
        assert_eq!(fs.read("/a.txt", 0, 64).await.unwrap(), b"012abcdef");
    }

    #[tokio::test]
    async fn write_zero_fills_a_gap_beyond_eof() {
        let (fs, store) = fs_with_store().await;
        store.insert("a.txt", b"ab".to_vec());

        fs.write("/a.txt", 5, b"Z").await.unwrap();
        assert_eq!(fs.read("/a.txt", 0, 64).await.unwrap(), b"ab\0\0\0Z");
    }

    #[tokio::test]
    async fn write_to_missing_object_is_not_found() {
        let (fs, _store) = fs_with_store().await;
        match fs.write("/nope.txt", 0, b"x").await {
            Err(Error::NotFound(_)) => {}
            other => panic!("expected NotFound, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn write_updates_cached_size_for_open_files() {
        let (fs, store) = fs_with_store().await;
        store.insert("a.txt", b"ab".to_vec());

        fs.open("/a.txt").await.unwrap();
        fs.write("/a.txt", 0, b"abcdef").await.unwrap();
        // entry survives the write and carries the new length
        assert_eq!(fs.open_count("/a.txt").await, Some(1));
        assert_eq!(fs.getattr("/a.txt").await.unwrap().attr.size, 6);
        fs.release("/a.txt").await.unwrap();
    }

    #[tokio::test]
    async fn read_at_size_is_empty_and_past_size_is_out_of_range() {
        let (fs, store) = fs_with_store().await;
        store.insert("a.txt", b"12345".to_vec());

        assert!(fs.read("/a.txt", 5, 10).await.unwrap().is_empty());

        match fs.read("/a.txt", 6, 1).await {
            Err(Error::OutOfRange { offset: 6, size: 5 }) => {}
            other => panic!("expected OutOfRange, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn read_clamps_length_to_object_size() {
        let (fs, store) = fs_with_store().await;
        store.insert("a.txt", b"hello".to_vec());

        assert_eq!(fs.read("/a.txt", 3, 100).await.unwrap(), b"lo");
        assert!(matches!(
            fs.read("/missing", 0, 1).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn create_rejects_existing_keys() {
        let (fs, store) = fs_with_store().await;

        fs.create("/a.txt").await.unwrap();
        assert_eq!(store.content("a.txt").unwrap(), b"");

        match fs.create("/a.txt").await {
            Err(Error::AlreadyExists(_)) => {}
            other => panic!("expected AlreadyExists, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn create_reports_a_failed_put_instead_of_succeeding() {
        let (fs, store) = fs_with_store().await;
        store.fail_puts(true);

        match fs.create("/a.txt").await {
            Err(Error::Store(_)) => {}
            other => panic!("expected Store, got {:?}", other.err()),
        }
        assert!(store.content("a.txt").is_none());
        assert!(matches!(
            fs.getattr("/a.txt").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn write_whose_upload_fails_commits_nothing() {
        let (fs, store) = fs_with_store().await;
        store.insert("a.txt", b"original".to_vec());
        store.fail_puts(true);

        match fs.write("/a.txt", 0, b"REPLACED").await {
            Err(Error::Store(_)) => {}
            other => panic!("expected Store, got {:?}", other.err()),
        }
        assert_eq!(store.content("a.txt").unwrap(), b"original");

        store.fail_puts(false);
        fs.write("/a.txt", 0, b"REPLACED").await.unwrap();
        assert_eq!(store.content("a.txt").unwrap(), b"REPLACED");
    }

    #[tokio::test]
    async fn create_rejects_keys_held_open_even_after_store_delete() {
        let (fs, store) = fs_with_store().await;
        store.insert("a.txt", b"x".to_vec());

        fs.open("/a.txt").await.unwrap();
        // remove behind the cache's back; the open entry still claims the name
        store.delete_object("a.txt").await.unwrap();
        assert!(matches!(
            fs.create("/a.txt").await,
            Err(Error::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn rename_moves_content_and_frees_the_source() {
        let (fs, store) = fs_with_store().await;
        store.insert("a.txt", b"payload".to_vec());

        fs.rename("/a.txt", "/b.txt").await.unwrap();
        assert!(store.content("a.txt").is_none());
        assert_eq!(store.content("b.txt").unwrap(), b"payload");
    }

    #[tokio::test]
    async fn rename_missing_source_leaves_namespace_unchanged() {
        let (fs, store) = fs_with_store().await;
        store.insert("b.txt", b"dest".to_vec());

        match fs.rename("/a.txt", "/b.txt").await {
            Err(Error::NotFound(_)) => {}
            other => panic!("expected NotFound, got {:?}", other.err()),
        }
        assert_eq!(store.content("b.txt").unwrap(), b"dest");
    }

    #[tokio::test]
    async fn rename_onto_existing_destination_changes_nothing() {
        let (fs, store) = fs_with_store().await;
        store.insert("a.txt", b"src".to_vec());
        store.insert("b.txt", b"dest".to_vec());

        match fs.rename("/a.txt", "/b.txt").await {
            Err(Error::AlreadyExists(_)) => {}
            other => panic!("expected AlreadyExists, got {:?}", other.err()),
        }
        assert_eq!(store.content("a.txt").unwrap(), b"src");
        assert_eq!(store.content("b.txt").unwrap(), b"dest");
    }

    #[tokio::test]
    async fn unlink_missing_object_is_not_found() {
        let (fs, _store) = fs_with_store().await;
        assert!(matches!(
            fs.unlink("/gone.txt").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn unlink_ignores_open_handles() {
        let (fs, store) = fs_with_store().await;
        store.insert("a.txt", b"x".to_vec());

        fs.open("/a.txt").await.unwrap();
        fs.unlink("/a.txt").await.unwrap();

        // no "file in use" protection; the entry is simply gone
        assert_eq!(fs.open_count("/a.txt").await, None);
        assert!(store.content("a.txt").is_none());
    }

    #[tokio::test]
    async fn utimens_requires_the_object() {
        let (fs, store) = fs_with_store().await;
        assert!(matches!(
            fs.utimens("/a.txt", None, None).await,
            Err(Error::NotFound(_))
        ));

        store.insert("a.txt", b"x".to_vec());
        fs.utimens("/a.txt", None, None).await.unwrap();
    }

    #[tokio::test]
    async fn readdir_lists_dot_entries_and_keys() {
        let (fs, _store) = fs_with_store().await;
        fs.create("/a.txt").await.unwrap();

        let entries = fs.readdir("/").await.unwrap();
        assert!(entries.contains(&".".to_string()));
        assert!(entries.contains(&"..".to_string()));
        assert!(entries.contains(&"a.txt".to_string()));
    }

    #[tokio::test]
    async fn readdir_outside_root_is_not_found() {
        let (fs, _store) = fs_with_store().await;
        assert!(matches!(
            fs.readdir("/subdir").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn getattr_distinguishes_root_and_files() {
        let (fs, store) = fs_with_store().await;
        store.insert("a.txt", b"12345".to_vec());

        let root = fs.getattr("/").await.unwrap();
        assert_eq!(root.kind, FileKind::Directory);

        let file = fs.getattr("/a.txt").await.unwrap();
        assert_eq!(file.kind, FileKind::RegularFile);
        assert_eq!(file.attr.size, 5);

        assert!(matches!(
            fs.getattr("/nope").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn create_write_read_unlink_round_trip() {
        let (fs, _store) = fs_with_store().await;

        fs.create("/a.txt").await.unwrap();
        fs.write("/a.txt", 0, b"somedata\n").await.unwrap();

        let back = fs.read("/a.txt", 0, 9).await.unwrap();
        assert_eq!(back, b"somedata\n");

        fs.unlink("/a.txt").await.unwrap();
        assert!(matches!(
            fs.getattr("/a.txt").await,
            Err(Error::NotFound(_))
        ));
    }
}
