//! Adapter between `fuser`'s inode-addressed callbacks and the path-based
//! dispatcher.
//!
//! The kernel speaks inode numbers; the FTP side speaks absolute paths. The
//! bridge interns every path it resolves into a bidirectional map and
//! translates at the boundary, converting typed dispatcher errors into
//! errnos on the way out. Reply TTLs equal the configured cache timeout so
//! the kernel never revalidates faster than the listing cache refreshes.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyOpen, ReplyWrite, Request, TimeOrNow,
};
use tracing::debug;

use super::dispatch::{FileStat, FtpFs};
use super::handles::OpenIntent;
use super::remote::RemoteFs;

const ROOT_INO: u64 = 1;

/// Handle value replied for read-only opens that allocate no table slot.
/// Real handle ids are slot indices and stay far below this.
const NO_HANDLE: u64 = u64::MAX;

/// Bidirectional inode ↔ remote-path map. Paths are interned on first
/// resolution and dropped when the entry is removed or renamed away.
struct InodeMap {
    by_ino: HashMap<u64, String>,
    by_path: HashMap<String, u64>,
    next: u64,
}

impl InodeMap {
    fn new() -> Self {
        let mut map = Self {
            by_ino: HashMap::new(),
            by_path: HashMap::new(),
            next: ROOT_INO + 1,
        };
        map.by_ino.insert(ROOT_INO, "/".to_owned());
        map.by_path.insert("/".to_owned(), ROOT_INO);
        map
    }

    fn path_of(&self, ino: u64) -> Option<&str> {
        self.by_ino.get(&ino).map(String::as_str)
    }

    fn intern(&mut self, path: &str) -> u64 {
        if let Some(&ino) = self.by_path.get(path) {
            return ino;
        }
        let ino = self.next;
        self.next += 1;
        self.by_ino.insert(ino, path.to_owned());
        self.by_path.insert(path.to_owned(), ino);
        ino
    }

    fn forget_path(&mut self, path: &str) {
        if let Some(ino) = self.by_path.remove(path) {
            self.by_ino.remove(&ino);
        }
    }

    /// Rewrites the mapping for a rename. The moved entry keeps its inode;
    /// stale descendants are dropped and re-interned on next lookup.
    fn rename(&mut self, from: &str, to: &str) {
        self.forget_path(to);
        let descendants: Vec<String> = self
            .by_path
            .keys()
            .filter(|path| {
                path.strip_prefix(from)
                    .is_some_and(|rest| rest.starts_with('/'))
            })
            .cloned()
            .collect();
        for path in descendants {
            self.forget_path(&path);
        }
        if let Some(ino) = self.by_path.remove(from) {
            self.by_ino.insert(ino, to.to_owned());
            self.by_path.insert(to.to_owned(), ino);
        }
    }
}

/// The `fuser::Filesystem` implementation for a mounted FTP server.
pub struct FuseBridge<R: RemoteFs> {
    fs: FtpFs<R>,
    inodes: InodeMap,
    ttl: Duration,
}

impl<R: RemoteFs> FuseBridge<R> {
    /// Wraps a dispatcher for mounting. `ttl` is the kernel attribute and
    /// entry timeout, conventionally the cache timeout.
    pub fn new(fs: FtpFs<R>, ttl: Duration) -> Self {
        Self {
            fs,
            inodes: InodeMap::new(),
            ttl,
        }
    }

    fn to_attr(&self, ino: u64, stat: &FileStat) -> FileAttr {
        let mtime = epoch_to_system_time(stat.mtime);
        FileAttr {
            ino,
            size: stat.size,
            blocks: stat.size.div_ceil(512),
            atime: mtime,
            mtime,
            ctime: mtime,
            crtime: mtime,
            kind: kind_of_mode(stat.mode),
            perm: (stat.mode & 0o7777) as u16,
            nlink: stat.nlink,
            uid: stat.uid,
            gid: stat.gid,
            rdev: 0,
            flags: 0,
            blksize: 512,
        }
    }

    fn path_of(&self, ino: u64) -> Option<String> {
        self.inodes.path_of(ino).map(str::to_owned)
    }

    /// Resolves `parent/name` to an absolute remote path.
    fn child_path(&self, parent: u64, name: &OsStr) -> Option<String> {
        let parent_path = self.inodes.path_of(parent)?;
        let name = name.to_str()?;
        Some(if parent_path == "/" {
            format!("/{name}")
        } else {
            format!("{parent_path}/{name}")
        })
    }
}

fn kind_of_mode(mode: u32) -> FileType {
    let fmt = mode & libc::S_IFMT as u32;
    if fmt == libc::S_IFDIR as u32 {
        FileType::Directory
    } else if fmt == libc::S_IFLNK as u32 {
        FileType::Symlink
    } else {
        FileType::RegularFile
    }
}

fn epoch_to_system_time(secs: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs as u64)
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs())
    }
}

impl<R: RemoteFs> Filesystem for FuseBridge<R> {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(path) = self.child_path(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.fs.getattr(&path) {
            Ok(stat) => {
                let ino = self.inodes.intern(&path);
                reply.entry(&self.ttl, &self.to_attr(ino, &stat), 0);
            }
            Err(err) => reply.error(err.into()),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.fs.getattr(&path) {
            Ok(stat) => reply.attr(&self.ttl, &self.to_attr(ino, &stat)),
            Err(err) => reply.error(err.into()),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let entries = match self.fs.readdir(&path) {
            Ok(entries) => entries,
            Err(err) => {
                reply.error(err.into());
                return;
            }
        };
        let start = usize::try_from(offset).unwrap_or(0);
        for (index, entry) in entries.iter().enumerate().skip(start) {
            let entry_ino = match entry.name.as_str() {
                "." => ino,
                ".." => ino, // the kernel resolves `..` itself
                name => match self.child_path(ino, OsStr::new(name)) {
                    Some(child) => self.inodes.intern(&child),
                    None => continue,
                },
            };
            let full = reply.add(
                entry_ino,
                (index + 1) as i64,
                kind_of_mode(entry.stat.mode),
                &entry.name,
            );
            if full {
                break;
            }
        }
        reply.ok();
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.fs.open(&path, OpenIntent::from_flags(flags)) {
            Ok(Some(fh)) => reply.opened(fh, 0),
            Ok(None) => reply.opened(NO_HANDLE, 0),
            Err(err) => reply.error(err.into()),
        }
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        let Some(path) = self.child_path(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        let mut intent = OpenIntent::from_flags(flags);
        intent.write = true;
        intent.create = true;
        match self.fs.open(&path, intent) {
            Ok(fh) => {
                let ino = self.inodes.intern(&path);
                let stat = self.fs.created_file_stat();
                reply.created(
                    &self.ttl,
                    &self.to_attr(ino, &stat),
                    0,
                    fh.unwrap_or(NO_HANDLE),
                    0,
                );
            }
            Err(err) => reply.error(err.into()),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let offset = u64::try_from(offset).unwrap_or(0);
        match self.fs.read(&path, Some(fh), offset, size) {
            Ok(data) => reply.data(&data),
            Err(err) => reply.error(err.into()),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let offset = u64::try_from(offset).unwrap_or(0);
        match self.fs.write(fh, offset, data) {
            Ok(written) => reply.written(written as u32),
            Err(err) => reply.error(err.into()),
        }
    }

    fn flush(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        // Uploads happen on release.
        reply.ok();
    }

    fn fsync(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _datasync: bool, reply: ReplyEmpty) {
        reply.ok();
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        self.fs.release(fh);
        reply.ok();
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(path) = self.child_path(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.fs.unlink(&path) {
            Ok(()) => {
                self.inodes.forget_path(&path);
                reply.ok();
            }
            Err(err) => reply.error(err.into()),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let Some(path) = self.child_path(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.fs.mkdir(&path) {
            Ok(()) => {
                let ino = self.inodes.intern(&path);
                let stat = self.fs.directory_stat();
                reply.entry(&self.ttl, &self.to_attr(ino, &stat), 0);
            }
            Err(err) => reply.error(err.into()),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(path) = self.child_path(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.fs.rmdir(&path) {
            Ok(()) => {
                self.inodes.forget_path(&path);
                reply.ok();
            }
            Err(err) => reply.error(err.into()),
        }
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        let (Some(from), Some(to)) = (
            self.child_path(parent, name),
            self.child_path(newparent, newname),
        ) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.fs.rename(&from, &to) {
            Ok(()) => {
                self.inodes.rename(&from, &to);
                reply.ok();
            }
            Err(err) => reply.error(err.into()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        if let Some(size) = size {
            if let Err(err) = self.fs.truncate(&path, size) {
                reply.error(err.into());
                return;
            }
        }
        // Mode, ownership, and timestamp changes are accepted and dropped:
        // FTP has no way to express them.
        match self.fs.getattr(&path) {
            Ok(stat) => reply.attr(&self.ttl, &self.to_attr(ino, &stat)),
            Err(_) => {
                let mut stat = self.fs.created_file_stat();
                stat.size = size.unwrap_or(0);
                reply.attr(&self.ttl, &self.to_attr(ino, &stat));
            }
        }
    }

    fn access(&mut self, _req: &Request<'_>, _ino: u64, _mask: i32, reply: ReplyEmpty) {
        reply.ok();
    }

    fn destroy(&mut self) {
        debug!("filesystem unmounted");
    }
}
