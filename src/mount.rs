//! Builds the filesystem stack and runs the FUSE session.

use std::io;

use fuser::MountOption;
use tracing::info;

use cftpfs_ftp::FtpSession;

use crate::config::MountConfig;
use crate::fs::dispatch::FtpFs;
use crate::fs::fuse::FuseBridge;
use crate::fs::staging::StagingDir;

/// Mounts the filesystem described by `config` and blocks until unmount.
/// The staging directory lives exactly as long as the mount.
pub fn run(config: MountConfig) -> io::Result<()> {
    let metadata = std::fs::metadata(&config.mountpoint)?;
    if !metadata.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "mount point '{}' is not a directory",
                config.mountpoint.display()
            ),
        ));
    }

    let staging = StagingDir::create()?;
    let session = FtpSession::new(&config.host, config.port, &config.user, &config.password);
    let owner = (
        nix::unistd::Uid::current().as_raw(),
        nix::unistd::Gid::current().as_raw(),
    );
    let fs = FtpFs::new(session, config.cache_timeout, staging, owner);
    let bridge = FuseBridge::new(fs, config.cache_timeout);

    info!(
        host = %config.host,
        port = config.port,
        user = %config.user,
        encoding = %config.encoding,
        cache_timeout_secs = config.cache_timeout.as_secs(),
        mountpoint = %config.mountpoint.display(),
        "mounting ftp filesystem"
    );

    let options = [
        MountOption::FSName(format!("cftpfs#{}", config.host)),
        MountOption::AutoUnmount,
    ];
    fuser::mount2(bridge, &config.mountpoint, &options)
}
