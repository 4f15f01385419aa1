//! The filesystem operation dispatcher.
//!
//! Every kernel callback becomes one method here, expressed over absolute
//! remote paths. Each method composes the remote operation set, the listing
//! cache, and the handle table under the fixed lock order handles → ftp →
//! cache. Failures never escape as panics; they map to [`FsError`] and from
//! there to an errno at the FUSE boundary.

use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use super::cache::ListingCache;
use super::handles::{HandleError, HandleTable, OpenIntent};
use super::parser;
use super::remote::{FtpError, RemoteFs};
use super::staging::StagingDir;
use super::{lock, FtpItem};

/// Attribute record handed up to the FUSE layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    /// POSIX mode bits including the kind bit.
    pub mode: u32,
    /// Size in bytes.
    pub size: u64,
    /// Modification time, seconds since the epoch.
    pub mtime: i64,
    /// Link count.
    pub nlink: u32,
    /// Owner uid (always the mounting user).
    pub uid: u32,
    /// Owner gid (always the mounting group).
    pub gid: u32,
}

/// One named row of `readdir` output.
#[derive(Debug, Clone)]
pub struct DirEntry {
    /// Entry name as listed.
    pub name: String,
    /// Attributes reported for the entry.
    pub stat: FileStat,
}

/// Dispatcher failure, convertible to the errno returned to the kernel.
#[derive(Debug, Error)]
pub enum FsError {
    /// The path does not name a remote entry.
    #[error("no such file or directory")]
    NotFound,
    /// Handle table exhausted.
    #[error("too many open files")]
    TooManyHandles,
    /// The handle id does not name a live handle.
    #[error("bad file handle")]
    BadHandle,
    /// The remote side failed.
    #[error("remote operation failed: {0}")]
    Remote(#[from] FtpError),
    /// A staging file operation failed.
    #[error("staging i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

impl From<FsError> for i32 {
    fn from(err: FsError) -> Self {
        match err {
            FsError::NotFound => libc::ENOENT,
            FsError::TooManyHandles => libc::EMFILE,
            FsError::BadHandle => libc::EBADF,
            FsError::Remote(_) => libc::EIO,
            FsError::Io(ref io) => io.raw_os_error().unwrap_or(libc::EIO),
        }
    }
}

impl From<HandleError> for FsError {
    fn from(err: HandleError) -> Self {
        match err {
            HandleError::TableFull => FsError::TooManyHandles,
            HandleError::Io(io) => FsError::Io(io),
        }
    }
}

/// Splits an absolute path into (parent directory, basename). The root and
/// degenerate slash-less names have no parent and resolve to nothing.
fn split_path(path: &str) -> Option<(&str, &str)> {
    let idx = path.rfind('/')?;
    let name = &path[idx + 1..];
    if name.is_empty() {
        return None;
    }
    let parent = if idx == 0 { "/" } else { &path[..idx] };
    Some((parent, name))
}

/// The shared filesystem state: one FTP session, the listing cache, the
/// handle table, and the staging directory, owned together for the lifetime
/// of the mount.
pub struct FtpFs<R: RemoteFs> {
    remote: Mutex<R>,
    cache: ListingCache,
    handles: HandleTable,
    staging: StagingDir,
    owner: (u32, u32),
}

impl<R: RemoteFs> FtpFs<R> {
    /// Assembles the dispatcher around a remote session.
    pub fn new(
        remote: R,
        cache_timeout: Duration,
        staging: StagingDir,
        owner: (u32, u32),
    ) -> Self {
        Self {
            remote: Mutex::new(remote),
            cache: ListingCache::new(cache_timeout),
            handles: HandleTable::new(),
            staging,
            owner,
        }
    }

    /// Attributes for `path`. The root is synthesized locally; everything
    /// else resolves through the parent's listing.
    pub fn getattr(&self, path: &str) -> Result<FileStat, FsError> {
        debug!(path, "getattr");
        if path == "/" {
            return Ok(self.directory_stat());
        }
        let (parent, name) = split_path(path).ok_or(FsError::NotFound)?;
        let items = match self.listing_for(parent) {
            Ok(items) => items,
            Err(err) => {
                debug!(path, error = %err, "getattr listing failed");
                return Err(FsError::NotFound);
            }
        };
        items
            .iter()
            .find(|item| item.name == name)
            .map(|item| self.stat_of(item))
            .ok_or(FsError::NotFound)
    }

    /// Directory contents of `path`, starting with `.` and `..`.
    pub fn readdir(&self, path: &str) -> Result<Vec<DirEntry>, FsError> {
        debug!(path, "readdir");
        let dot = self.directory_stat();
        let mut entries = vec![
            DirEntry {
                name: ".".to_owned(),
                stat: dot,
            },
            DirEntry {
                name: "..".to_owned(),
                stat: dot,
            },
        ];
        let items = self.listing_for(path)?;
        entries.extend(items.iter().map(|item| DirEntry {
            name: item.name.clone(),
            stat: self.stat_of(item),
        }));
        Ok(entries)
    }

    /// Opens `path`. Pure read-only opens resolve without a handle and
    /// return `None`; anything else allocates a handle and stages the
    /// remote content unless the open is a pure create.
    pub fn open(&self, path: &str, intent: OpenIntent) -> Result<Option<u64>, FsError> {
        debug!(path, ?intent, "open");
        if !intent.needs_handle() {
            return Ok(None);
        }
        let (fh, handle) = self.handles.allocate(&self.staging, path, intent)?;
        if intent.downloads_existing() {
            let download = {
                let mut remote = lock(&self.remote);
                remote.download(path, &handle.staging)
            };
            if let Err(err) = download {
                // The file may simply not exist yet; the staging file stays
                // empty and a later release will publish whatever is written.
                debug!(path, error = %err, "open download failed");
            }
        } else {
            handle.state().is_new = true;
        }
        Ok(Some(fh))
    }

    /// Reads `size` bytes at `offset`. With a live handle this reads the
    /// handle's staging file; without one, the remote file is staged into a
    /// throwaway scratch file for just this call, so even callers that
    /// bypassed `open` get a working read.
    pub fn read(
        &self,
        path: &str,
        fh: Option<u64>,
        offset: u64,
        size: u32,
    ) -> Result<Vec<u8>, FsError> {
        debug!(path, fh, offset, size, "read");
        if let Some(handle) = fh.and_then(|id| self.handles.get(id)) {
            let _state = handle.state();
            return Ok(read_range(&handle.staging, offset, size)?);
        }

        let scratch = self.staging.scratch_path("read");
        {
            let mut remote = lock(&self.remote);
            remote.download(path, &scratch)?;
        }
        let result = read_range(&scratch, offset, size);
        if let Err(err) = std::fs::remove_file(&scratch) {
            debug!(path, error = %err, "scratch file removal failed");
        }
        Ok(result?)
    }

    /// Writes `data` at `offset` through the handle's staging file. A
    /// successful positive-length write marks the handle dirty.
    pub fn write(&self, fh: u64, offset: u64, data: &[u8]) -> Result<usize, FsError> {
        debug!(fh, offset, size = data.len(), "write");
        let handle = self.handles.get(fh).ok_or(FsError::BadHandle)?;
        let mut state = handle.state();
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .open(&handle.staging)?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        if !data.is_empty() {
            state.dirty = true;
        }
        Ok(data.len())
    }

    /// Closes the handle. A dirty or newly created handle uploads its
    /// staging file first and invalidates the parent listing; the slot and
    /// staging file are freed either way. Upload failures are logged, not
    /// surfaced: the kernel ignores release errors.
    pub fn release(&self, fh: u64) {
        debug!(fh, "release");
        if let Some(handle) = self.handles.get(fh) {
            let state = handle.state();
            if state.dirty || state.is_new {
                let upload = {
                    let mut remote = lock(&self.remote);
                    remote.upload(&handle.staging, &handle.path)
                };
                if let Err(err) = upload {
                    warn!(path = %handle.path, error = %err, "upload on release failed");
                }
                self.invalidate_parent(&handle.path);
            }
        }
        self.handles.release(fh);
    }

    /// Deletes the remote file and invalidates its parent listing.
    pub fn unlink(&self, path: &str) -> Result<(), FsError> {
        debug!(path, "unlink");
        {
            let mut remote = lock(&self.remote);
            remote.delete(path)?;
        }
        self.invalidate_parent(path);
        Ok(())
    }

    /// Creates a remote directory and invalidates its parent listing.
    pub fn mkdir(&self, path: &str) -> Result<(), FsError> {
        debug!(path, "mkdir");
        {
            let mut remote = lock(&self.remote);
            remote.mkdir(path)?;
        }
        self.invalidate_parent(path);
        Ok(())
    }

    /// Removes a remote directory and invalidates its parent listing.
    pub fn rmdir(&self, path: &str) -> Result<(), FsError> {
        debug!(path, "rmdir");
        {
            let mut remote = lock(&self.remote);
            remote.rmdir(path)?;
        }
        self.invalidate_parent(path);
        Ok(())
    }

    /// Renames `from` to `to`, then invalidates the whole cache: a
    /// cross-directory rename touches two parents, so the coarse root
    /// invalidation is the simple correct choice.
    pub fn rename(&self, from: &str, to: &str) -> Result<(), FsError> {
        debug!(from, to, "rename");
        {
            let mut remote = lock(&self.remote);
            remote.rename(from, to)?;
        }
        self.cache.invalidate("/");
        Ok(())
    }

    /// Truncates the remote file to `size` by staging it locally, resizing
    /// the copy, and uploading it back. A file that cannot be downloaded is
    /// replaced by an empty file of the requested size.
    pub fn truncate(&self, path: &str, size: u64) -> Result<(), FsError> {
        debug!(path, size, "truncate");
        let scratch = self.staging.scratch_path("trunc");
        let result = {
            let mut remote = lock(&self.remote);
            let staged = match remote.download(path, &scratch) {
                Ok(()) => std::fs::OpenOptions::new().write(true).open(&scratch),
                Err(err) => {
                    debug!(path, error = %err, "truncate download failed, starting empty");
                    std::fs::File::create(&scratch)
                }
            };
            staged
                .and_then(|file| file.set_len(size))
                .map_err(FsError::Io)
                .and_then(|()| remote.upload(&scratch, path).map_err(FsError::Remote))
        };
        if let Err(err) = std::fs::remove_file(&scratch) {
            debug!(path, error = %err, "scratch file removal failed");
        }
        result?;
        self.invalidate_parent(path);
        Ok(())
    }

    /// Attributes reported for a just-created, still-empty file.
    #[must_use]
    pub fn created_file_stat(&self) -> FileStat {
        FileStat {
            mode: libc::S_IFREG as u32 | 0o644,
            size: 0,
            mtime: now_epoch(),
            nlink: 1,
            uid: self.owner.0,
            gid: self.owner.1,
        }
    }

    /// Attributes reported for directories the remote cannot describe:
    /// the root and just-created directories.
    #[must_use]
    pub fn directory_stat(&self) -> FileStat {
        FileStat {
            mode: libc::S_IFDIR as u32 | 0o755,
            size: 0,
            mtime: now_epoch(),
            nlink: 2,
            uid: self.owner.0,
            gid: self.owner.1,
        }
    }

    /// Cache-or-list: a snapshot of the listing for `dir`, fetching and
    /// publishing a fresh listing on a miss. Runs under the FTP lock so
    /// concurrent misses on the same directory do not race duplicate LISTs.
    fn listing_for(&self, dir: &str) -> Result<Vec<FtpItem>, FsError> {
        let mut remote = lock(&self.remote);
        if let Some(items) = self.cache.get(dir) {
            return Ok(items);
        }
        let text = remote.list(dir)?;
        let items: Vec<FtpItem> = text.lines().filter_map(parser::parse_line).collect();
        self.cache.put(dir, items.clone());
        Ok(items)
    }

    fn stat_of(&self, item: &FtpItem) -> FileStat {
        FileStat {
            mode: item.mode,
            size: item.size,
            mtime: item.mtime,
            nlink: item.nlink(),
            uid: self.owner.0,
            gid: self.owner.1,
        }
    }

    fn invalidate_parent(&self, path: &str) {
        if let Some((parent, _)) = split_path(path) {
            self.cache.invalidate(parent);
        }
    }
}

fn now_epoch() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Reads up to `size` bytes at `offset` from a staging file.
fn read_range(path: &Path, offset: u64, size: u32) -> std::io::Result<Vec<u8>> {
    let mut file = std::fs::File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut buffer = Vec::with_capacity(size as usize);
    file.take(u64::from(size)).read_to_end(&mut buffer)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::split_path;

    #[test]
    fn split_path_resolves_parents() {
        assert_eq!(split_path("/a"), Some(("/", "a")));
        assert_eq!(split_path("/a/b.txt"), Some(("/a", "b.txt")));
        assert_eq!(split_path("/a/b/c"), Some(("/a/b", "c")));
    }

    #[test]
    fn split_path_rejects_root_and_bare_names() {
        assert_eq!(split_path("/"), None);
        assert_eq!(split_path("name"), None);
        assert_eq!(split_path("/a/"), None);
    }
}
