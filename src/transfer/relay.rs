//! Transfer orchestration.
//!
//! Upload: validate → acquire → open session → ensure dir → store → close → release.
//! Download: validate → allocate → open session → retrieve → close → hand file to caller.
//! List: validate → open session → list → close.
//!
//! Sessions are opened per call and always closed; staging files are always released.

use std::sync::Arc;

use super::listing::{to_listed, ListedFile};
use super::source::{SourceAcquirer, SourceKind};
use super::staging::{StagedFile, StagingArea};
use super::RelayError;
use crate::remote::{join_remote_path, RemoteConnector, RemoteError, RemoteSession};
use crate::utils::security::{validate_file_name, validate_remote_dir};

#[derive(Debug)]
pub struct TransferRequest {
    pub source: SourceKind,
    pub directory: String,
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferResult {
    pub remote_path: String,
    pub size: u64,
    pub content_type: String,
    pub source: &'static str,
}

/// A downloaded file waiting to be streamed back. Dropping it deletes it.
#[derive(Debug)]
pub struct DownloadedFile {
    pub file_name: String,
    pub staged: StagedFile,
}

#[derive(Clone)]
pub struct Relay {
    acquirer: SourceAcquirer,
    staging: StagingArea,
    remote: Arc<dyn RemoteConnector>,
}

impl Relay {
    pub fn new(
        acquirer: SourceAcquirer,
        staging: StagingArea,
        remote: Arc<dyn RemoteConnector>,
    ) -> Self {
        Self {
            acquirer,
            staging,
            remote,
        }
    }

    pub async fn upload(&self, request: TransferRequest) -> Result<TransferResult, RelayError> {
        let TransferRequest {
            source,
            directory,
            file_name,
        } = request;

        check_directory(&directory)?;
        check_file_name(&file_name)?;

        let source_label = source.label();
        let staged = self.acquirer.acquire(source, &file_name).await?;
        let remote_path = join_remote_path(&directory, &file_name);

        let outcome = self.store(&staged, &directory, &remote_path).await;

        let size = staged.size();
        let content_type = staged
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        staged.release().await;

        let sent = outcome?;
        if sent != size {
            tracing::warn!(%remote_path, staged = size, sent, "Upload size mismatch");
        }

        tracing::info!(%remote_path, size, source = source_label, "Upload complete");

        Ok(TransferResult {
            remote_path,
            size,
            content_type,
            source: source_label,
        })
    }

    async fn store(
        &self,
        staged: &StagedFile,
        directory: &str,
        remote_path: &str,
    ) -> Result<u64, RelayError> {
        let mut session = self.remote.open().await?;
        let result = store_steps(session.as_mut(), staged, directory, remote_path).await;
        session.close().await;
        Ok(result?)
    }

    pub async fn download(
        &self,
        directory: &str,
        file_name: &str,
    ) -> Result<DownloadedFile, RelayError> {
        check_directory(directory)?;
        check_file_name(file_name)?;

        let mut staged = self.staging.allocate(file_name).await?;

        let mut session = self.remote.open().await?;
        let result = session
            .download_to(staged.path(), directory, file_name)
            .await;
        session.close().await;

        // staged drops (and is deleted) on the error path
        let size = result?;
        staged.set_size(size);
        if let Some(guess) = mime_guess::from_path(file_name).first_raw() {
            staged.set_content_type(guess);
        }

        tracing::info!(
            remote_path = %join_remote_path(directory, file_name),
            size,
            "Download staged"
        );

        Ok(DownloadedFile {
            file_name: file_name.to_string(),
            staged,
        })
    }

    pub async fn list(&self, directory: &str) -> Result<Vec<ListedFile>, RelayError> {
        check_directory(directory)?;

        let mut session = self.remote.open().await?;
        let result = session.list(directory).await;
        session.close().await;

        let entries = result?;
        tracing::debug!(directory, count = entries.len(), "Listed directory");
        Ok(to_listed(entries))
    }
}

async fn store_steps(
    session: &mut dyn RemoteSession,
    staged: &StagedFile,
    directory: &str,
    remote_path: &str,
) -> Result<u64, RemoteError> {
    session.ensure_dir(directory).await?;
    session.upload(staged.path(), remote_path).await
}

fn check_directory(directory: &str) -> Result<(), RelayError> {
    validate_remote_dir(directory)
        .map_err(|e| RelayError::InvalidInput(format!("path {e}")))
}

fn check_file_name(file_name: &str) -> Result<(), RelayError> {
    validate_file_name(file_name)
        .map_err(|e| RelayError::InvalidInput(format!("fileName {e}")))
}
