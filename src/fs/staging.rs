//! The process staging directory.
//!
//! Every open handle stages the remote file's bytes in a local temporary
//! under one per-process directory; ad-hoc reads and truncations use
//! short-lived scratch files next to them. The directory is created at
//! startup with mode 0700 and removed recursively when the filesystem is
//! torn down.

use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Owner of the staging directory and generator of unique file names
/// within it.
pub struct StagingDir {
    root: PathBuf,
    sequence: AtomicU64,
}

impl StagingDir {
    /// Creates `/tmp/cftpfs_<pid>_<startup-time>/`.
    pub fn create() -> std::io::Result<Self> {
        Self::create_in(Path::new("/tmp"))
    }

    /// Creates the staging directory under `parent`. Tests point this at a
    /// scratch location instead of `/tmp`.
    pub fn create_in(parent: &Path) -> std::io::Result<Self> {
        let root = parent.join(format!("cftpfs_{}_{}", std::process::id(), epoch_secs()));
        std::fs::DirBuilder::new().mode(0o700).create(&root)?;
        debug!(dir = %root.display(), "created staging directory");
        Ok(Self {
            root,
            sequence: AtomicU64::new(0),
        })
    }

    /// Unique staging path for a newly opened handle.
    #[must_use]
    pub fn handle_path(&self) -> PathBuf {
        self.unique("fh")
    }

    /// Throwaway path for a single operation, named after it (`read`,
    /// `trunc`).
    #[must_use]
    pub fn scratch_path(&self, operation: &str) -> PathBuf {
        self.unique(operation)
    }

    /// The staging directory itself.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.root
    }

    fn unique(&self, prefix: &str) -> PathBuf {
        // Pid and timestamp keep names meaningful in a directory listing;
        // the sequence number is what guarantees uniqueness.
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        self.root.join(format!(
            "{prefix}_{}_{}_{}",
            std::process::id(),
            epoch_secs(),
            sequence
        ))
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_dir_all(&self.root) {
            warn!(dir = %self.root.display(), error = %err, "failed to remove staging directory");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_paths_do_not_collide() {
        let tmp = tempfile::tempdir().unwrap();
        let staging = StagingDir::create_in(tmp.path()).unwrap();
        let a = staging.handle_path();
        let b = staging.handle_path();
        let c = staging.scratch_path("read");
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with(staging.path()));
    }

    #[test]
    fn drop_removes_the_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let root = {
            let staging = StagingDir::create_in(tmp.path()).unwrap();
            std::fs::write(staging.path().join("leftover"), b"x").unwrap();
            staging.path().to_path_buf()
        };
        assert!(!root.exists());
    }
}
