use serde::Serialize;

use crate::remote::RemoteEntry;

/// One element of the `files` array returned by the list endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListedFile {
    pub name: String,
    pub size: u64,
    /// Numeric entry type: 0 unknown, 1 file, 2 directory, 3 symlink
    #[serde(rename = "type")]
    pub type_code: u8,
    pub kind: &'static str,
    pub modified_date: Option<String>,
    pub is_directory: bool,
}

impl From<RemoteEntry> for ListedFile {
    fn from(entry: RemoteEntry) -> Self {
        let is_directory = entry.is_directory();
        Self {
            // Directory sizes are server-specific noise
            size: if is_directory { 0 } else { entry.size },
            type_code: entry.kind.code(),
            kind: entry.kind.label(),
            modified_date: entry.modified_at,
            is_directory,
            name: entry.name,
        }
    }
}

/// Order is preserved as the server returned it.
pub fn to_listed(entries: Vec<RemoteEntry>) -> Vec<ListedFile> {
    entries.into_iter().map(ListedFile::from).collect()
}
