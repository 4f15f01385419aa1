//! cftpfs — a user-space filesystem backed by a remote FTP server.
//!
//! The crate is organized around four subsystems: the listing parser turns
//! `LIST` output into metadata records, the listing cache keeps recent
//! directory contents, the handle table stages open files in local
//! temporaries, and the dispatcher composes all three with the FTP operation
//! set under a fixed locking discipline. [`fs::fuse::FuseBridge`] adapts the
//! kernel-facing callbacks onto the dispatcher.

pub mod config;
pub mod fs;
pub mod mount;
