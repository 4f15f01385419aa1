//! The FTP operation set used by cftpfs.
//!
//! One [`FtpSession`] wraps one cached FTP control connection and exposes
//! exactly the operations the filesystem needs: directory listing, file
//! download, file upload, delete, mkdir, rmdir, and rename. The session is
//! created lazily on first use and torn down whenever a connection-class
//! failure is observed, so the next operation reconnects transparently.

mod error;
mod paths;
mod session;

pub use error::FtpError;
pub use session::FtpSession;
