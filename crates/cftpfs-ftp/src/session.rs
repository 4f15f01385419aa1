use std::net::ToSocketAddrs;
use std::path::Path;
use std::time::Duration;

use socket2::{SockRef, TcpKeepalive};
use suppaftp::types::FileType;
use suppaftp::FtpStream;
use tracing::{debug, warn};

use crate::error::{classify, FtpError};
use crate::paths;

/// Time allowed for the TCP connect + login handshake.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// Time allowed for any single read or write on the control connection.
const OPERATION_TIMEOUT: Duration = Duration::from_secs(300);
/// Keep-alive probing keeps NAT mappings warm across idle periods.
const KEEPALIVE_IDLE: Duration = Duration::from_secs(120);
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(60);

/// One FTP endpoint and, when live, one control connection to it.
///
/// Operations establish the session on demand. A connection-class failure
/// drops the cached stream so the next operation dials again; a command
/// refusal keeps it.
///
/// Two path resolution styles are used, mirroring what works best against
/// real servers: listings and directory mutations walk the tree with one
/// `CWD` per component (maximum compatibility), while file transfers and
/// deletes send the full path in a single command (minimum round-trips).
pub struct FtpSession {
    host: String,
    port: u16,
    user: String,
    password: String,
    stream: Option<FtpStream>,
}

impl FtpSession {
    /// A disconnected session for the given endpoint and credentials.
    #[must_use]
    pub fn new(host: &str, port: u16, user: &str, password: &str) -> Self {
        Self {
            host: host.to_owned(),
            port,
            user: user.to_owned(),
            password: password.to_owned(),
            stream: None,
        }
    }

    /// Raw `LIST` output for the directory at `path`, newline-separated.
    pub fn list(&mut self, path: &str) -> Result<String, FtpError> {
        let lines = self.run("LIST", |stream| {
            cwd_into(stream, path)?;
            stream.list(None)
        })?;
        Ok(lines.join("\n"))
    }

    /// Downloads the remote file at `remote` into the local file `local`.
    pub fn download(&mut self, remote: &str, local: &Path) -> Result<(), FtpError> {
        let buffer = self.run("RETR", |stream| stream.retr_as_buffer(remote))?;
        std::fs::write(local, buffer.into_inner())?;
        Ok(())
    }

    /// Uploads the local file `local` to `remote`, replacing any existing
    /// file. Missing remote parent directories are created on demand.
    pub fn upload(&mut self, local: &Path, remote: &str) -> Result<(), FtpError> {
        match self.store(local, remote) {
            Err(err) if !err.is_connection_error() => {
                debug!(remote, error = %err, "store refused, creating parent directories");
                self.make_parents(remote)?;
                self.store(local, remote)
            }
            other => other,
        }
    }

    /// Deletes the remote file at `path`.
    pub fn delete(&mut self, path: &str) -> Result<(), FtpError> {
        self.run("DELE", |stream| stream.rm(path))
    }

    /// Creates the remote directory at `path`. The parent must exist.
    pub fn mkdir(&mut self, path: &str) -> Result<(), FtpError> {
        let (parent, name) = paths::split_parent(path);
        self.run("MKD", |stream| {
            cwd_into(stream, parent)?;
            stream.mkdir(name)
        })
    }

    /// Removes the remote directory at `path`.
    pub fn rmdir(&mut self, path: &str) -> Result<(), FtpError> {
        let (parent, name) = paths::split_parent(path);
        self.run("RMD", |stream| {
            cwd_into(stream, parent)?;
            stream.rmdir(name)
        })
    }

    /// Renames `from` to `to` via the `RNFR`/`RNTO` pair.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<(), FtpError> {
        self.run("RNTO", |stream| stream.rename(from, to))
    }

    /// Drops the cached control connection, if any.
    pub fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            // Best effort; the server may already be gone.
            let _ = stream.quit();
        }
    }

    fn store(&mut self, local: &Path, remote: &str) -> Result<(), FtpError> {
        let mut file = std::fs::File::open(local)?;
        self.run("STOR", |stream| stream.put_file(remote, &mut file).map(|_| ()))
    }

    fn make_parents(&mut self, remote: &str) -> Result<(), FtpError> {
        for dir in paths::ancestors(remote) {
            if let Err(err) = self.run("MKD", |stream| stream.mkdir(&dir)) {
                if err.is_connection_error() {
                    return Err(err);
                }
                // Already exists, or the server forbids it; STOR will decide.
            }
        }
        Ok(())
    }

    /// Runs `op` against a live session, tearing the session down on a
    /// connection-class failure so the next call reconnects.
    fn run<T>(
        &mut self,
        verb: &'static str,
        op: impl FnOnce(&mut FtpStream) -> suppaftp::FtpResult<T>,
    ) -> Result<T, FtpError> {
        let stream = self.ensure_session()?;
        match op(stream) {
            Ok(value) => Ok(value),
            Err(err) => {
                let err = classify(verb, err);
                if err.is_connection_error() {
                    warn!(verb, error = %err, "dropping ftp session after connection failure");
                    self.stream = None;
                }
                Err(err)
            }
        }
    }

    fn ensure_session(&mut self) -> Result<&mut FtpStream, FtpError> {
        let stream = match self.stream.take() {
            Some(stream) => stream,
            None => self.connect()?,
        };
        Ok(self.stream.insert(stream))
    }

    fn connect(&self) -> Result<FtpStream, FtpError> {
        let addr = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(FtpError::Connect)?
            .next()
            .ok_or_else(|| FtpError::Resolve {
                host: self.host.clone(),
                port: self.port,
            })?;

        debug!(host = %self.host, port = self.port, "opening ftp control connection");
        let mut stream =
            FtpStream::connect_timeout(addr, CONNECT_TIMEOUT).map_err(|e| classify("connect", e))?;
        stream
            .login(&self.user, &self.password)
            .map_err(|e| classify("USER", e))?;
        stream
            .transfer_type(FileType::Binary)
            .map_err(|e| classify("TYPE", e))?;

        let socket = stream.get_ref();
        socket
            .set_read_timeout(Some(OPERATION_TIMEOUT))
            .map_err(FtpError::Connect)?;
        socket
            .set_write_timeout(Some(OPERATION_TIMEOUT))
            .map_err(FtpError::Connect)?;
        let keepalive = TcpKeepalive::new()
            .with_time(KEEPALIVE_IDLE)
            .with_interval(KEEPALIVE_INTERVAL);
        SockRef::from(socket)
            .set_tcp_keepalive(&keepalive)
            .map_err(FtpError::Connect)?;

        Ok(stream)
    }
}

impl Drop for FtpSession {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Walks the control connection into `dir`, one `CWD` per component.
fn cwd_into(stream: &mut FtpStream, dir: &str) -> suppaftp::FtpResult<()> {
    stream.cwd("/")?;
    for component in paths::components(dir) {
        stream.cwd(component)?;
    }
    Ok(())
}
