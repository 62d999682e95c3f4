//! Remote storage sessions.
//!
//! The relay only talks to the remote endpoint through [`RemoteConnector`] and
//! [`RemoteSession`]; [`FtpConnector`] is the production implementation.

mod control;
mod error;
mod facts;
mod session;
mod stream;
mod tls;
mod transfer;

use std::path::Path;

use async_trait::async_trait;

pub use error::{FtpError, RemoteError};
pub use facts::{parse_list, EntryKind, RemoteEntry};
pub use session::{FtpConnector, FtpSession};

/// Opens a fresh session per call. Sessions are never shared between requests.
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    async fn open(&self) -> Result<Box<dyn RemoteSession>, RemoteError>;
}

/// One authenticated session. Relative paths resolve from the login directory.
#[async_trait]
pub trait RemoteSession: Send {
    /// Create every missing segment of `path`. Existing segments are left alone.
    async fn ensure_dir(&mut self, path: &str) -> Result<(), RemoteError>;

    /// `Ok(false)` when `dir` itself is missing.
    async fn exists(&mut self, dir: &str, name: &str) -> Result<bool, RemoteError>;

    /// Store `local` at `remote_path`, replacing any existing file. Returns bytes sent.
    async fn upload(&mut self, local: &Path, remote_path: &str) -> Result<u64, RemoteError>;

    /// Fetch `dir/name` into `local`. Returns bytes received.
    async fn download_to(&mut self, local: &Path, dir: &str, name: &str)
        -> Result<u64, RemoteError>;

    async fn list(&mut self, dir: &str) -> Result<Vec<RemoteEntry>, RemoteError>;

    /// Best-effort goodbye. The connection is dropped either way.
    async fn close(self: Box<Self>);
}

/// Join a directory and a file name with exactly one `/`.
pub fn join_remote_path(dir: &str, name: &str) -> String {
    let trimmed = dir.trim_end_matches('/');
    if trimmed.is_empty() {
        if dir.starts_with('/') {
            format!("/{name}")
        } else {
            name.to_string()
        }
    } else {
        format!("{trimmed}/{name}")
    }
}
