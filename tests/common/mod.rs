//! Scripted [`RemoteFs`] fake shared by the integration tests.
//!
//! The fake serves listings and file bodies from in-memory maps, records
//! every mutation it is asked to perform, and can be told to fail the next
//! N listings with a connection-class error to exercise reconnect paths.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use cftpfs::fs::remote::{FtpError, RemoteFs};

#[derive(Default)]
struct MockState {
    listings: HashMap<String, String>,
    files: HashMap<String, Vec<u8>>,
    uploads: Vec<(String, Vec<u8>)>,
    ops: Vec<String>,
    list_calls: u32,
    failing_lists: u32,
    session_live: bool,
    sessions_opened: u32,
}

/// Cloneable handle to shared fake state: one clone goes into the
/// dispatcher, the test keeps another for scripting and assertions.
#[derive(Clone, Default)]
pub struct MockRemote {
    state: Arc<Mutex<MockState>>,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the raw listing text served for `path`.
    pub fn set_listing(&self, path: &str, text: &str) {
        self.locked().listings.insert(path.to_owned(), text.to_owned());
    }

    /// Scripts the bytes served for downloads of `path`.
    pub fn set_file(&self, path: &str, bytes: &[u8]) {
        self.locked().files.insert(path.to_owned(), bytes.to_vec());
    }

    /// Makes the next `count` list calls fail with a connection-class error.
    pub fn fail_lists(&self, count: u32) {
        self.locked().failing_lists = count;
    }

    pub fn list_calls(&self) -> u32 {
        self.locked().list_calls
    }

    /// How many times a session had to be (re)established.
    pub fn sessions_opened(&self) -> u32 {
        self.locked().sessions_opened
    }

    /// Every upload observed, as (remote path, bytes).
    pub fn uploads(&self) -> Vec<(String, Vec<u8>)> {
        self.locked().uploads.clone()
    }

    /// Every mutating operation observed, in order, e.g. `"RENAME /a /b"`.
    pub fn ops(&self) -> Vec<String> {
        self.locked().ops.clone()
    }

    fn locked(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn refused(verb: &'static str) -> FtpError {
    FtpError::Refused {
        verb,
        message: "550 not available".to_owned(),
    }
}

fn timed_out() -> FtpError {
    FtpError::Transport(std::io::Error::new(
        std::io::ErrorKind::TimedOut,
        "timed out",
    ))
}

impl RemoteFs for MockRemote {
    fn list(&mut self, path: &str) -> Result<String, FtpError> {
        let mut state = self.locked();
        state.list_calls += 1;
        if !state.session_live {
            state.session_live = true;
            state.sessions_opened += 1;
        }
        if state.failing_lists > 0 {
            state.failing_lists -= 1;
            // A connection-class failure drops the session, as the real
            // FtpSession does.
            state.session_live = false;
            return Err(timed_out());
        }
        state.listings.get(path).cloned().ok_or(refused("LIST"))
    }

    fn download(&mut self, remote: &str, local: &Path) -> Result<(), FtpError> {
        let bytes = self
            .locked()
            .files
            .get(remote)
            .cloned()
            .ok_or(refused("RETR"))?;
        std::fs::write(local, bytes)?;
        Ok(())
    }

    fn upload(&mut self, local: &Path, remote: &str) -> Result<(), FtpError> {
        let bytes = std::fs::read(local)?;
        let mut state = self.locked();
        state.files.insert(remote.to_owned(), bytes.clone());
        state.uploads.push((remote.to_owned(), bytes));
        state.ops.push(format!("STOR {remote}"));
        Ok(())
    }

    fn delete(&mut self, path: &str) -> Result<(), FtpError> {
        let mut state = self.locked();
        state.files.remove(path);
        state.ops.push(format!("DELE {path}"));
        Ok(())
    }

    fn mkdir(&mut self, path: &str) -> Result<(), FtpError> {
        self.locked().ops.push(format!("MKD {path}"));
        Ok(())
    }

    fn rmdir(&mut self, path: &str) -> Result<(), FtpError> {
        self.locked().ops.push(format!("RMD {path}"));
        Ok(())
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<(), FtpError> {
        let mut state = self.locked();
        if let Some(bytes) = state.files.remove(from) {
            state.files.insert(to.to_owned(), bytes);
        }
        state.ops.push(format!("RENAME {from} {to}"));
        Ok(())
    }
}
