use thiserror::Error;

/// Failure of a single FTP operation.
///
/// The interesting distinction for callers is [`FtpError::is_connection_error`]:
/// connection-class failures invalidate the cached session, everything else
/// leaves it usable.
#[derive(Debug, Error)]
pub enum FtpError {
    /// The configured host/port did not resolve to any socket address.
    #[error("could not resolve {host}:{port}")]
    Resolve {
        /// Host name as configured.
        host: String,
        /// Port as configured.
        port: u16,
    },

    /// Establishing or configuring the control connection failed.
    #[error("connection failed: {0}")]
    Connect(#[source] std::io::Error),

    /// The control connection died mid-operation (reset, timeout, EOF).
    #[error("control connection lost: {0}")]
    Transport(#[source] std::io::Error),

    /// The server answered, but refused the command.
    #[error("server refused {verb}: {message}")]
    Refused {
        /// FTP verb that was refused.
        verb: &'static str,
        /// Server response text.
        message: String,
    },

    /// Reading or writing the local side of a transfer failed.
    #[error("local file error: {0}")]
    Local(#[from] std::io::Error),
}

impl FtpError {
    /// Whether this failure means the cached session is no longer usable.
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Resolve { .. } | Self::Connect(_) | Self::Transport(_)
        )
    }
}

/// Split a `suppaftp` failure into transport loss vs. command refusal.
pub(crate) fn classify(verb: &'static str, err: suppaftp::FtpError) -> FtpError {
    match err {
        suppaftp::FtpError::ConnectionError(io) => FtpError::Transport(io),
        other => FtpError::Refused {
            verb,
            message: other.to_string(),
        },
    }
}
