//! Mount a remote FTP server as a local filesystem.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use cftpfs::config::{self, MountConfig};
use cftpfs::mount;

#[derive(Parser)]
#[command(
    name = "cftpfs",
    version,
    about = "Mount a remote FTP server as a local filesystem."
)]
struct Args {
    /// FTP server host name or address.
    host: String,

    /// Local directory to mount on.
    mountpoint: PathBuf,

    /// FTP port.
    #[arg(short = 'p', long, default_value_t = 21)]
    port: u16,

    /// FTP user.
    #[arg(short = 'u', long, default_value = "anonymous")]
    user: String,

    /// FTP password.
    #[arg(short = 'P', long, default_value = "")]
    password: String,

    /// Remote filename encoding label (advisory).
    #[arg(short = 'e', long, default_value = "utf-8")]
    encoding: String,

    /// Listing cache timeout in seconds, clamped to [5, 300].
    #[arg(short = 'c', long, default_value_t = config::CACHE_TIMEOUT_DEFAULT)]
    cache_timeout: u64,

    /// Editor-friendly mode: extends the cache timeout to 60 seconds.
    #[arg(long)]
    vscode: bool,

    /// Verbose logs on standard error.
    #[arg(short = 'd', long)]
    debug: bool,

    /// Run in the foreground instead of daemonizing.
    #[arg(short = 'f', long)]
    foreground: bool,
}

impl Args {
    fn into_config(self) -> MountConfig {
        let cache_secs = if self.vscode {
            config::VSCODE_CACHE_TIMEOUT
        } else {
            self.cache_timeout
        };
        MountConfig {
            host: self.host,
            port: self.port,
            user: self.user,
            password: self.password,
            encoding: self.encoding,
            debug: self.debug,
            foreground: self.foreground,
            cache_timeout: config::clamp_cache_timeout(cache_secs),
            mountpoint: self.mountpoint,
        }
    }
}

fn init_tracing(debug: bool) {
    let default_filter = if debug {
        "cftpfs=debug,cftpfs_ftp=debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn mount_and_report(config: MountConfig) -> ExitCode {
    match mount::run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("mount failed: {err}");
            ExitCode::from(1)
        }
    }
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            // Help and version requests exit 0; real argument errors exit 1.
            let code = u8::from(err.use_stderr());
            let _ = err.print();
            return ExitCode::from(code);
        }
    };
    let config = args.into_config();

    if config.foreground {
        init_tracing(config.debug);
        return mount_and_report(config);
    }

    // Daemonize before touching tracing so the subscriber's state is built
    // in the surviving process.
    match daemonize::Daemonize::new().working_directory("/").start() {
        Ok(()) => {
            init_tracing(config.debug);
            mount_and_report(config)
        }
        Err(err) => {
            eprintln!("failed to daemonize: {err}");
            ExitCode::from(1)
        }
    }
}
