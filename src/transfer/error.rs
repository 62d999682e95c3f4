//! Error taxonomy for the transfer pipeline.

use axum::http::StatusCode;

use crate::remote::RemoteError;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Malformed request shape, bad file name, bad URL syntax
    #[error("{0}")]
    InvalidInput(String),
    /// Empty or undecodable inline payload, or a sniffed HTML payload
    #[error("{0}")]
    InvalidPayload(String),
    #[error("{0}")]
    NotADirectDownload(String),
    /// Resolution/refusal/timeout while reaching an endpoint
    #[error("endpoint unreachable: {0}")]
    Unreachable(String),
    /// Remote session could not be opened
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("directory not found: {0}")]
    DirectoryNotFound(String),
    #[error("file not found: {0}")]
    RemoteFileNotFound(String),
    #[error("transfer failed: {0}")]
    Transfer(String),
    #[error("local storage error: {0}")]
    LocalIo(String),
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::InvalidInput(_)
            | RelayError::InvalidPayload(_)
            | RelayError::NotADirectDownload(_)
            | RelayError::Unreachable(_) => StatusCode::BAD_REQUEST,
            RelayError::DirectoryNotFound(_) | RelayError::RemoteFileNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            RelayError::Connection(_) | RelayError::Transfer(_) | RelayError::LocalIo(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::InvalidInput(_) => "invalid_input",
            RelayError::InvalidPayload(_) => "invalid_payload",
            RelayError::NotADirectDownload(_) => "not_a_direct_download",
            RelayError::Unreachable(_) => "unreachable",
            RelayError::Connection(_) => "connection_error",
            RelayError::DirectoryNotFound(_) => "directory_not_found",
            RelayError::RemoteFileNotFound(_) => "remote_file_not_found",
            RelayError::Transfer(_) => "transfer_error",
            RelayError::LocalIo(_) => "local_io_error",
        }
    }

    pub(crate) fn local_io(context: &str, err: std::io::Error) -> Self {
        RelayError::LocalIo(format!("{context}: {err}"))
    }
}

impl From<RemoteError> for RelayError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Connect { ref source, .. } if source.is_unreachable() => {
                RelayError::Unreachable(err.to_string())
            }
            RemoteError::Connect { .. } => RelayError::Connection(err.to_string()),
            RemoteError::DirectoryNotFound(dir) => RelayError::DirectoryNotFound(dir),
            RemoteError::FileNotFound(name) => RelayError::RemoteFileNotFound(name),
            RemoteError::Local(source) => RelayError::local_io("staging file", source),
            RemoteError::Transfer { .. } => RelayError::Transfer(err.to_string()),
        }
    }
}
