// Staging area
// Every byte that crosses the relay lands in a staging file first
// RAII guard removes the file on every exit path

use futures_util::{Stream, StreamExt};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use super::RelayError;

const MAX_LABEL_LEN: usize = 64;

#[derive(Debug, Clone)]
pub struct StagingArea {
    dir: PathBuf,
}

impl StagingArea {
    /// Creates `dir` if it does not exist yet.
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reserve a fresh, empty file named `<uuid>-<label>`.
    pub async fn allocate(&self, label: &str) -> Result<StagedFile, RelayError> {
        let path = self
            .dir
            .join(format!("{}-{}", Uuid::new_v4(), sanitize_label(label)));

        // create_new: a collision is an error, never a silent overwrite
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| RelayError::local_io("Failed to create staging file", e))?;

        tracing::debug!(path = %path.display(), "Allocated staging file");

        Ok(StagedFile {
            path,
            size: 0,
            content_type: None,
            disarmed: false,
        })
    }
}

// Labels only make staging files recognisable on disk; uniqueness comes from the uuid
fn sanitize_label(label: &str) -> String {
    let cleaned: String = label
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' | '_' => c,
            _ => '_',
        })
        .take(MAX_LABEL_LEN)
        .collect();

    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

/// A local temporary file owned by exactly one request.
///
/// Deleted by [`StagedFile::release`] or, failing that, on drop.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    size: u64,
    content_type: Option<String>,
    disarmed: bool, // true once release() has run
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub(crate) fn set_size(&mut self, size: u64) {
        self.size = size;
    }

    pub(crate) fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.content_type = Some(content_type.into());
    }

    /// Write a whole buffer, replacing any previous contents.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<(), RelayError> {
        let mut file = self.open_writer().await?;
        file.write_all(data)
            .await
            .map_err(|e| RelayError::local_io("Failed to write staging file", e))?;
        file.flush()
            .await
            .map_err(|e| RelayError::local_io("Failed to flush staging file", e))?;

        self.size = data.len() as u64;
        Ok(())
    }

    /// Stream chunks to disk as they arrive. `on_error` classifies source failures.
    pub async fn fill_from<S, B, E, F>(&mut self, stream: S, on_error: F) -> Result<u64, RelayError>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        F: Fn(E) -> RelayError,
    {
        let mut file = self.open_writer().await?;
        let mut written = 0u64;

        futures_util::pin_mut!(stream);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(&on_error)?;
            let bytes = chunk.as_ref();
            file.write_all(bytes)
                .await
                .map_err(|e| RelayError::local_io("Failed to write staging file", e))?;
            written += bytes.len() as u64;
        }

        file.flush()
            .await
            .map_err(|e| RelayError::local_io("Failed to flush staging file", e))?;

        self.size = written;
        Ok(written)
    }

    /// Read up to `limit` leading bytes.
    pub async fn head(&self, limit: u64) -> Result<Vec<u8>, RelayError> {
        use tokio::io::AsyncReadExt;

        let file = File::open(&self.path)
            .await
            .map_err(|e| RelayError::local_io("Failed to open staging file", e))?;
        let mut head = Vec::new();
        file.take(limit)
            .read_to_end(&mut head)
            .await
            .map_err(|e| RelayError::local_io("Failed to read staging file", e))?;
        Ok(head)
    }

    async fn open_writer(&self) -> Result<File, RelayError> {
        OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.path)
            .await
            .map_err(|e| RelayError::local_io("Failed to open staging file", e))
    }

    /// Re-read the on-disk size, e.g. after another component wrote the file.
    pub(crate) async fn refresh_size(&mut self) -> Result<u64, RelayError> {
        let meta = tokio::fs::metadata(&self.path)
            .await
            .map_err(|e| RelayError::local_io("Failed to stat staging file", e))?;
        self.size = meta.len();
        Ok(self.size)
    }

    /// Delete the file now. Failures are logged, never returned: cleanup must
    /// not mask the outcome of the transfer itself.
    pub async fn release(mut self) {
        self.disarmed = true;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Released staging file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to remove staging file"
            ),
        }
    }

    /// Body stream that owns this file; the file is deleted once the stream is dropped.
    pub async fn into_stream(self) -> Result<StagedFileStream, RelayError> {
        let file = File::open(&self.path)
            .await
            .map_err(|e| RelayError::local_io("Failed to open staging file", e))?;

        Ok(StagedFileStream {
            inner: ReaderStream::new(file),
            _staged: self,
        })
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.disarmed {
            return;
        }

        // Drop is sync; unlinking one file is quick enough to do inline
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Cleaned up staging file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to clean up staging file"
            ),
        }
    }
}

pub struct StagedFileStream {
    inner: ReaderStream<File>,
    _staged: StagedFile,
}

impl Stream for StagedFileStream {
    type Item = std::io::Result<bytes::Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().inner).poll_next(cx)
    }
}
