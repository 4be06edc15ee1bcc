//! FUSE transport
//!
//! Bridges the kernel's inode-based callbacks onto the path-based
//! adapter. The namespace is flat, so the inode table is just a
//! bidirectional name/ino map rooted at ino 1. Each callback hops onto
//! the tokio runtime with `block_on` and maps errors to errnos via
//! [`Error::to_errno`](crate::error::Error::to_errno).

use crate::error::Error;
use crate::fs::adapter::{FileKind, ObjectFs, Stat};
use crate::fs::attr::ObjectAttr;

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry,
    ReplyOpen, ReplyWrite, Request, TimeOrNow,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::time::{Duration, SystemTime};
use tokio::runtime::Runtime;
use tracing::{debug, error};

/// TTL for cached attributes
const TTL: Duration = Duration::from_secs(1);

/// Inode of the mount root
const ROOT_INO: u64 = 1;

/// Name/ino map for the flat root directory
struct InodeTable {
    next_ino: u64,
    by_ino: HashMap<u64, String>,
    by_name: HashMap<String, u64>,
}

impl InodeTable {
    fn new() -> Self {
        InodeTable {
            next_ino: ROOT_INO + 1,
            by_ino: HashMap::new(),
            by_name: HashMap::new(),
        }
    }

    fn assign(&mut self, name: &str) -> u64 {
        if let Some(ino) = self.by_name.get(name) {
            return *ino;
        }
        let ino = self.next_ino;
        self.next_ino += 1;
        self.by_ino.insert(ino, name.to_string());
        self.by_name.insert(name.to_string(), ino);
        ino
    }

    fn name_of(&self, ino: u64) -> Option<String> {
        self.by_ino.get(&ino).cloned()
    }

    fn forget(&mut self, name: &str) {
        if let Some(ino) = self.by_name.remove(name) {
            self.by_ino.remove(&ino);
        }
    }

    fn rename(&mut self, old: &str, new: &str) {
        self.forget(new);
        if let Some(ino) = self.by_name.remove(old) {
            self.by_ino.insert(ino, new.to_string());
            self.by_name.insert(new.to_string(), ino);
        }
    }
}

/// fuser-facing filesystem wrapping the core adapter
pub struct S3Fuse {
    core: ObjectFs,
    runtime: Runtime,
    inodes: RwLock<InodeTable>,
    uid: u32,
    gid: u32,
}

impl S3Fuse {
    pub fn new(core: ObjectFs, runtime: Runtime) -> Self {
        S3Fuse {
            core,
            runtime,
            inodes: RwLock::new(InodeTable::new()),
            uid: unsafe { libc::getuid() },
            gid: unsafe { libc::getgid() },
        }
    }

    /// Helper to run async core operations from sync FUSE callbacks
    fn block_on<F: std::future::Future>(&self, f: F) -> F::Output {
        self.runtime.block_on(f)
    }

    /// Resolve an inode back to an adapter path
    fn path_of(&self, ino: u64) -> Option<String> {
        if ino == ROOT_INO {
            return Some("/".to_string());
        }
        self.inodes.read().name_of(ino).map(|n| format!("/{}", n))
    }

    fn to_file_attr(&self, ino: u64, stat: &Stat) -> FileAttr {
        let (kind, perm) = match stat.kind {
            FileKind::Directory => (FileType::Directory, 0o555),
            FileKind::RegularFile => (FileType::RegularFile, 0o666),
        };

        FileAttr {
            ino,
            size: stat.attr.size,
            blocks: stat.attr.size.div_ceil(512),
            atime: stat.attr.atime,
            mtime: stat.attr.mtime,
            ctime: stat.attr.ctime,
            crtime: stat.attr.ctime,
            kind,
            perm,
            nlink: 1,
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: 512,
            flags: 0,
        }
    }
}

impl Filesystem for S3Fuse {
    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let name = match name.to_str() {
            Some(n) => n,
            None => {
                reply.error(libc::EINVAL);
                return;
            }
        };

        debug!("lookup: parent={}, name={}", parent, name);

        if parent != ROOT_INO {
            reply.error(libc::ENOENT);
            return;
        }

        let path = format!("/{}", name);
        match self.block_on(self.core.getattr(&path)) {
            Ok(stat) => {
                let ino = self.inodes.write().assign(name);
                reply.entry(&TTL, &self.to_file_attr(ino, &stat), 0);
            }
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn getattr(&mut self, _req: &Request, ino: u64, reply: ReplyAttr) {
        debug!("getattr: ino={}", ino);

        let path = match self.path_of(ino) {
            Some(p) => p,
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };

        match self.block_on(self.core.getattr(&path)) {
            Ok(stat) => reply.attr(&TTL, &self.to_file_attr(ino, &stat)),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        debug!("setattr: ino={}", ino);

        // Only timestamp updates are supported; mode, ownership and
        // truncation have no object-storage counterpart here.
        if mode.is_some() || uid.is_some() || gid.is_some() || size.is_some() {
            reply.error(Error::Unsupported("setattr: mode/owner/size").to_errno());
            return;
        }

        let path = match self.path_of(ino) {
            Some(p) => p,
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };

        let to_time = |t: Option<TimeOrNow>| match t {
            Some(TimeOrNow::SpecificTime(t)) => Some(t),
            Some(TimeOrNow::Now) | None => None,
        };

        let result = self.block_on(async {
            self.core
                .utimens(&path, to_time(atime), to_time(mtime))
                .await?;
            self.core.getattr(&path).await
        });

        match result {
            Ok(stat) => reply.attr(&TTL, &self.to_file_attr(ino, &stat)),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn mknod(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        _rdev: u32,
        reply: ReplyEntry,
    ) {
        let name = match name.to_str() {
            Some(n) => n,
            None => {
                reply.error(libc::EINVAL);
                return;
            }
        };

        debug!("mknod: parent={}, name={}, mode={:o}", parent, name, mode);

        if parent != ROOT_INO {
            reply.error(libc::ENOENT);
            return;
        }

        let file_type = mode & libc::S_IFMT as u32;
        if file_type != 0 && file_type != libc::S_IFREG as u32 {
            reply.error(libc::ENOSYS);
            return;
        }

        let path = format!("/{}", name);
        match self.block_on(self.core.create(&path)) {
            Ok(()) => {
                let ino = self.inodes.write().assign(name);
                let now = SystemTime::now();
                let stat = Stat {
                    kind: FileKind::RegularFile,
                    attr: ObjectAttr {
                        size: 0,
                        atime: now,
                        mtime: now,
                        ctime: now,
                    },
                };
                reply.entry(&TTL, &self.to_file_attr(ino, &stat), 0);
            }
            Err(e) => {
                error!("mknod {} error: {}", path, e);
                reply.error(e.to_errno());
            }
        }
    }

    fn open(&mut self, _req: &Request, ino: u64, flags: i32, reply: ReplyOpen) {
        debug!("open: ino={}, flags={}", ino, flags);

        if ino == ROOT_INO {
            reply.error(libc::EISDIR);
            return;
        }

        let path = match self.path_of(ino) {
            Some(p) => p,
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };

        match self.block_on(self.core.open(&path)) {
            // state is keyed by path, so the handle carries no identity
            Ok(()) => reply.opened(0, 0),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn read(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock: Option<u64>,
        reply: ReplyData,
    ) {
        debug!("read: ino={}, offset={}, size={}", ino, offset, size);

        if offset < 0 {
            reply.error(libc::EINVAL);
            return;
        }

        let path = match self.path_of(ino) {
            Some(p) => p,
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };

        match self.block_on(self.core.read(&path, offset as u64, size)) {
            Ok(data) => reply.data(&data),
            Err(e) => {
                error!("read {} error: {}", path, e);
                reply.error(e.to_errno());
            }
        }
    }

    fn write(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        debug!("write: ino={}, offset={}, size={}", ino, offset, data.len());

        if offset < 0 {
            reply.error(libc::EINVAL);
            return;
        }

        let path = match self.path_of(ino) {
            Some(p) => p,
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };

        match self.block_on(self.core.write(&path, offset as u64, data)) {
            Ok(written) => reply.written(written as u32),
            Err(e) => {
                error!("write {} error: {}", path, e);
                reply.error(e.to_errno());
            }
        }
    }

    fn release(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        debug!("release: ino={}", ino);

        let path = match self.path_of(ino) {
            Some(p) => p,
            None => {
                reply.error(libc::EBADF);
                return;
            }
        };

        match self.block_on(self.core.release(&path)) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn unlink(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let name = match name.to_str() {
            Some(n) => n,
            None => {
                reply.error(libc::EINVAL);
                return;
            }
        };

        debug!("unlink: parent={}, name={}", parent, name);

        if parent != ROOT_INO {
            reply.error(libc::ENOENT);
            return;
        }

        let path = format!("/{}", name);
        match self.block_on(self.core.unlink(&path)) {
            Ok(()) => {
                self.inodes.write().forget(name);
                reply.ok();
            }
            Err(e) => {
                error!("unlink {} error: {}", path, e);
                reply.error(e.to_errno());
            }
        }
    }

    fn rename(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        let (name, newname) = match (name.to_str(), newname.to_str()) {
            (Some(a), Some(b)) => (a, b),
            _ => {
                reply.error(libc::EINVAL);
                return;
            }
        };

        debug!(
            "rename: parent={}, name={}, newparent={}, newname={}",
            parent, name, newparent, newname
        );

        if parent != ROOT_INO || newparent != ROOT_INO {
            reply.error(libc::ENOENT);
            return;
        }

        let from = format!("/{}", name);
        let to = format!("/{}", newname);
        match self.block_on(self.core.rename(&from, &to)) {
            Ok(()) => {
                self.inodes.write().rename(name, newname);
                reply.ok();
            }
            Err(e) => {
                error!("rename {} -> {} error: {}", from, to, e);
                reply.error(e.to_errno());
            }
        }
    }

    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        debug!("readdir: ino={}, offset={}", ino, offset);

        if ino != ROOT_INO {
            reply.error(libc::ENOENT);
            return;
        }

        let entries = match self.block_on(self.core.readdir("/")) {
            Ok(entries) => entries,
            Err(e) => {
                error!("readdir error: {}", e);
                reply.error(e.to_errno());
                return;
            }
        };

        for (i, name) in entries.iter().enumerate().skip(offset as usize) {
            let (ino, kind) = if name == "." || name == ".." {
                (ROOT_INO, FileType::Directory)
            } else {
                (self.inodes.write().assign(name), FileType::RegularFile)
            };
            if reply.add(ino, (i + 1) as i64, kind, name) {
                break;
            }
        }

        reply.ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inode_table_hands_out_stable_inos() {
        let mut table = InodeTable::new();
        let a = table.assign("a.txt");
        let b = table.assign("b.txt");
        assert_ne!(a, b);
        assert_ne!(a, ROOT_INO);
        assert_eq!(table.assign("a.txt"), a);
        assert_eq!(table.name_of(a).as_deref(), Some("a.txt"));
    }

    #[test]
    fn inode_table_rename_remaps_in_place() {
        let mut table = InodeTable::new();
        let a = table.assign("a.txt");
        table.rename("a.txt", "b.txt");

        assert_eq!(table.name_of(a).as_deref(), Some("b.txt"));
        assert_eq!(table.assign("b.txt"), a);
        // the old name is free again
        assert_ne!(table.assign("a.txt"), a);
    }

    #[test]
    fn inode_table_forget_drops_both_directions() {
        let mut table = InodeTable::new();
        let a = table.assign("a.txt");
        table.forget("a.txt");
        assert!(table.name_of(a).is_none());
    }
}
