pub mod error;
pub mod listing;
pub mod relay;
pub mod source;
pub mod staging;

pub use error::RelayError;
pub use listing::ListedFile;
pub use relay::{DownloadedFile, Relay, TransferRequest, TransferResult};
pub use source::{SourceAcquirer, SourceKind};
pub use staging::{StagedFile, StagedFileStream, StagingArea};
