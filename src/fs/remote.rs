//! The remote operation set the dispatcher composes.

use std::path::Path;

pub use cftpfs_ftp::FtpError;

/// Everything the filesystem needs from the FTP side, as one trait so the
/// integration tests can substitute a scripted fake for the real session.
///
/// All paths are absolute and `/`-separated. `list` returns the raw listing
/// text; splitting it into lines and parsing them is the caller's business.
pub trait RemoteFs: Send {
    /// Raw listing text for the directory at `path`.
    fn list(&mut self, path: &str) -> Result<String, FtpError>;
    /// Downloads `remote` into the local file at `local`.
    fn download(&mut self, remote: &str, local: &Path) -> Result<(), FtpError>;
    /// Uploads the local file at `local` to `remote`, creating missing
    /// remote parent directories.
    fn upload(&mut self, local: &Path, remote: &str) -> Result<(), FtpError>;
    /// Deletes the remote file at `path`.
    fn delete(&mut self, path: &str) -> Result<(), FtpError>;
    /// Creates the remote directory at `path`.
    fn mkdir(&mut self, path: &str) -> Result<(), FtpError>;
    /// Removes the remote directory at `path`.
    fn rmdir(&mut self, path: &str) -> Result<(), FtpError>;
    /// Renames `from` to `to`.
    fn rename(&mut self, from: &str, to: &str) -> Result<(), FtpError>;
}

impl RemoteFs for cftpfs_ftp::FtpSession {
    fn list(&mut self, path: &str) -> Result<String, FtpError> {
        cftpfs_ftp::FtpSession::list(self, path)
    }

    fn download(&mut self, remote: &str, local: &Path) -> Result<(), FtpError> {
        cftpfs_ftp::FtpSession::download(self, remote, local)
    }

    fn upload(&mut self, local: &Path, remote: &str) -> Result<(), FtpError> {
        cftpfs_ftp::FtpSession::upload(self, local, remote)
    }

    fn delete(&mut self, path: &str) -> Result<(), FtpError> {
        cftpfs_ftp::FtpSession::delete(self, path)
    }

    fn mkdir(&mut self, path: &str) -> Result<(), FtpError> {
        cftpfs_ftp::FtpSession::mkdir(self, path)
    }

    fn rmdir(&mut self, path: &str) -> Result<(), FtpError> {
        cftpfs_ftp::FtpSession::rmdir(self, path)
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<(), FtpError> {
        cftpfs_ftp::FtpSession::rename(self, from, to)
    }
}
