use std::io;
use std::time::Duration;

/// Low-level failure talking to an FTP server.
#[derive(Debug, thiserror::Error)]
pub enum FtpError {
    #[error("could not resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("tls setup failed: {0}")]
    Tls(#[from] rustls::Error),
    #[error("invalid server name for tls: {0}")]
    InvalidServerName(String),
    #[error("{command} rejected: {code} {message}")]
    UnexpectedReply {
        command: String,
        code: u16,
        message: String,
    },
    #[error("malformed reply: {0}")]
    Protocol(String),
    #[error("connection closed by server")]
    Closed,
}

impl FtpError {
    /// Resolution, refusal and timeout failures mean the endpoint itself is unreachable.
    pub fn is_unreachable(&self) -> bool {
        match self {
            FtpError::Resolve { .. } | FtpError::Timeout(_) => true,
            FtpError::Io(err) => matches!(
                err.kind(),
                io::ErrorKind::ConnectionRefused
                    | io::ErrorKind::TimedOut
                    | io::ErrorKind::AddrNotAvailable
            ),
            _ => false,
        }
    }
}

/// Classified failure of a remote session operation.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("could not open session to {host}: {source}")]
    Connect {
        host: String,
        #[source]
        source: FtpError,
    },
    #[error("directory not found: {0}")]
    DirectoryNotFound(String),
    #[error("file not found: {0}")]
    FileNotFound(String),
    #[error("{operation} failed: {source}")]
    Transfer {
        operation: String,
        #[source]
        source: FtpError,
    },
    #[error("local file error: {0}")]
    Local(#[source] io::Error),
}

impl RemoteError {
    pub(crate) fn transfer(operation: impl Into<String>, source: FtpError) -> Self {
        RemoteError::Transfer {
            operation: operation.into(),
            source,
        }
    }
}
