//! The open-file handle table.
//!
//! A fixed vector of `MAX_HANDLES` slots; the slot index is the handle id
//! handed to the kernel. Each live handle owns a staging file that exists
//! for exactly the handle's lifetime. The table mutex covers allocation and
//! release only; reads and writes serialize on the handle's own state mutex
//! so I/O on different handles never contends.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tracing::{debug, trace};

use super::staging::StagingDir;
use super::{lock, MAX_HANDLES};

/// What the caller asked for at `open`/`create` time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenIntent {
    /// Opened for writing (any access mode other than read-only).
    pub write: bool,
    /// Opened with create.
    pub create: bool,
    /// Opened with truncate.
    pub truncate: bool,
}

impl OpenIntent {
    /// Derives the intent from open(2)-style flags.
    #[must_use]
    pub fn from_flags(flags: i32) -> Self {
        Self {
            write: (flags & libc::O_ACCMODE) != libc::O_RDONLY,
            create: flags & libc::O_CREAT != 0,
            truncate: flags & libc::O_TRUNC != 0,
        }
    }

    /// Plain read-only opens resolve without a handle.
    #[must_use]
    pub fn needs_handle(self) -> bool {
        self.write || self.create || self.truncate
    }

    /// Whether the remote file's current content must be staged at open:
    /// everything except a pure create expects the file to already exist.
    #[must_use]
    pub fn downloads_existing(self) -> bool {
        !self.create || self.truncate
    }
}

/// Mutable per-handle state, guarded by the handle's own mutex.
#[derive(Debug, Default, Clone, Copy)]
pub struct HandleState {
    /// Set by any successful positive-length write.
    pub dirty: bool,
    /// Set when the handle was created fresh and nothing was downloaded.
    pub is_new: bool,
}

/// One open file, staged in a local temporary.
pub struct FileHandle {
    /// Remote absolute path the handle was opened on.
    pub path: String,
    /// Open intent recorded at allocation.
    pub intent: OpenIntent,
    /// Local staging file backing all reads and writes on this handle.
    pub staging: PathBuf,
    state: Mutex<HandleState>,
}

impl FileHandle {
    /// Locks this handle's state, serializing against other I/O on the
    /// same handle.
    pub fn state(&self) -> MutexGuard<'_, HandleState> {
        lock(&self.state)
    }
}

/// Error allocating a handle.
#[derive(Debug, Error)]
pub enum HandleError {
    /// Every slot is occupied.
    #[error("all {} handle slots are in use", MAX_HANDLES)]
    TableFull,
    /// The staging file could not be created.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Fixed-size table of optional handle slots.
pub struct HandleTable {
    slots: Mutex<Vec<Option<Arc<FileHandle>>>>,
}

impl HandleTable {
    /// A table with every slot vacant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(vec![None; MAX_HANDLES]),
        }
    }

    /// Creates a handle with an empty staging file and stores it in the
    /// first free slot, returning the slot index as the handle id.
    pub fn allocate(
        &self,
        staging: &StagingDir,
        path: &str,
        intent: OpenIntent,
    ) -> Result<(u64, Arc<FileHandle>), HandleError> {
        let staging_path = staging.handle_path();
        // The staging file exists for the whole lifetime of the handle.
        std::fs::File::create(&staging_path)?;

        let handle = Arc::new(FileHandle {
            path: path.to_owned(),
            intent,
            staging: staging_path,
            state: Mutex::new(HandleState::default()),
        });

        let slot = {
            let mut slots = lock(&self.slots);
            match slots.iter().position(Option::is_none) {
                Some(index) => {
                    slots[index] = Some(Arc::clone(&handle));
                    Some(index)
                }
                None => None,
            }
        };

        match slot {
            Some(index) => {
                trace!(fh = index, path, "allocated file handle");
                Ok((index as u64, handle))
            }
            None => {
                let _ = std::fs::remove_file(&handle.staging);
                Err(HandleError::TableFull)
            }
        }
    }

    /// The live handle with id `fh`, if any.
    #[must_use]
    pub fn get(&self, fh: u64) -> Option<Arc<FileHandle>> {
        let index = usize::try_from(fh).ok()?;
        let slots = lock(&self.slots);
        slots.get(index)?.clone()
    }

    /// Vacates the slot and deletes the staging file. Out-of-range ids and
    /// vacant slots are no-ops.
    pub fn release(&self, fh: u64) {
        let Ok(index) = usize::try_from(fh) else {
            return;
        };
        let handle = {
            let mut slots = lock(&self.slots);
            slots.get_mut(index).and_then(Option::take)
        };
        if let Some(handle) = handle {
            if let Err(err) = std::fs::remove_file(&handle.staging) {
                debug!(fh, error = %err, "staging file removal failed");
            }
            trace!(fh, path = %handle.path, "released file handle");
        }
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}
