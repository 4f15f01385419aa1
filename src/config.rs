//! Mount configuration assembled from the command line.

use std::path::PathBuf;
use std::time::Duration;

/// Default listing cache timeout, seconds.
pub const CACHE_TIMEOUT_DEFAULT: u64 = 30;
/// Smallest accepted cache timeout, seconds.
pub const CACHE_TIMEOUT_MIN: u64 = 5;
/// Largest accepted cache timeout, seconds.
pub const CACHE_TIMEOUT_MAX: u64 = 300;
/// Cache timeout selected by `--vscode`, seconds. Editors that stat
/// aggressively benefit from a longer window.
pub const VSCODE_CACHE_TIMEOUT: u64 = 60;

/// Everything the mounted filesystem needs to know, built once before the
/// FUSE loop starts and handed down by value.
#[derive(Debug, Clone)]
pub struct MountConfig {
    /// FTP server host name or address.
    pub host: String,
    /// FTP server port.
    pub port: u16,
    /// FTP user.
    pub user: String,
    /// FTP password.
    pub password: String,
    /// Remote filename encoding label. Advisory: stored and logged, never
    /// used to transcode.
    pub encoding: String,
    /// Verbose logging.
    pub debug: bool,
    /// Stay in the foreground instead of daemonizing.
    pub foreground: bool,
    /// Listing cache timeout, already clamped. Also used as the kernel
    /// attribute/entry TTL so the kernel never revalidates more often than
    /// the cache refreshes.
    pub cache_timeout: Duration,
    /// Local mount point.
    pub mountpoint: PathBuf,
}

/// Clamps a user-supplied cache timeout into the supported window.
#[must_use]
pub fn clamp_cache_timeout(secs: u64) -> Duration {
    Duration::from_secs(secs.clamp(CACHE_TIMEOUT_MIN, CACHE_TIMEOUT_MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_raises_small_values() {
        assert_eq!(clamp_cache_timeout(0), Duration::from_secs(5));
        assert_eq!(clamp_cache_timeout(4), Duration::from_secs(5));
    }

    #[test]
    fn clamp_passes_values_in_range() {
        assert_eq!(clamp_cache_timeout(5), Duration::from_secs(5));
        assert_eq!(clamp_cache_timeout(30), Duration::from_secs(30));
        assert_eq!(clamp_cache_timeout(300), Duration::from_secs(300));
    }

    #[test]
    fn clamp_lowers_large_values() {
        assert_eq!(clamp_cache_timeout(301), Duration::from_secs(300));
        assert_eq!(clamp_cache_timeout(u64::MAX), Duration::from_secs(300));
    }
}
