//! In-memory remote backend that counts opened and closed sessions.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ftprelay::remote::{
    EntryKind, FtpError, RemoteConnector, RemoteEntry, RemoteError, RemoteSession,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectFailure {
    Unreachable,
    LoginRejected,
}

#[derive(Default)]
struct Tree {
    dirs: BTreeSet<String>,
    files: BTreeMap<String, Vec<u8>>,
}

/// Normalise to an absolute path. The fake's login directory is `/`.
pub fn normalize(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    format!("/{}", segments.join("/"))
}

fn parent_of(path: &str) -> String {
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(i) => path[..i].to_string(),
    }
}

fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[derive(Clone)]
pub struct FakeRemote {
    tree: Arc<Mutex<Tree>>,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    failure: Option<ConnectFailure>,
}

impl Default for FakeRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRemote {
    pub fn new() -> Self {
        let mut tree = Tree::default();
        tree.dirs.insert("/".to_string());
        Self {
            tree: Arc::new(Mutex::new(tree)),
            opened: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicUsize::new(0)),
            failure: None,
        }
    }

    pub fn failing(failure: ConnectFailure) -> Self {
        Self {
            failure: Some(failure),
            ..Self::new()
        }
    }

    pub fn add_dir(&self, path: &str) {
        let path = normalize(path);
        let mut tree = self.tree.lock().unwrap();
        let mut current = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = format!("{current}/{segment}");
            tree.dirs.insert(current.clone());
        }
    }

    pub fn add_file(&self, path: &str, contents: &[u8]) {
        let path = normalize(path);
        self.add_dir(&parent_of(&path));
        self.tree
            .lock()
            .unwrap()
            .files
            .insert(path, contents.to_vec());
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.tree.lock().unwrap().files.get(&normalize(path)).cloned()
    }

    pub fn dir_count(&self) -> usize {
        self.tree.lock().unwrap().dirs.len()
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteConnector for FakeRemote {
    async fn open(&self) -> Result<Box<dyn RemoteSession>, RemoteError> {
        if let Some(failure) = self.failure {
            let source = match failure {
                ConnectFailure::Unreachable => FtpError::Timeout(Duration::from_secs(30)),
                ConnectFailure::LoginRejected => FtpError::UnexpectedReply {
                    command: "PASS".into(),
                    code: 530,
                    message: "Login incorrect.".into(),
                },
            };
            return Err(RemoteError::Connect {
                host: "fake:21".into(),
                source,
            });
        }

        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            tree: self.tree.clone(),
            closed: self.closed.clone(),
        }))
    }
}

struct FakeSession {
    tree: Arc<Mutex<Tree>>,
    closed: Arc<AtomicUsize>,
}

impl FakeSession {
    fn entries(&self, dir: &str) -> Result<Vec<RemoteEntry>, RemoteError> {
        let dir = normalize(dir);
        let tree = self.tree.lock().unwrap();
        if !tree.dirs.contains(&dir) {
            return Err(RemoteError::DirectoryNotFound(dir));
        }

        let mut entries: Vec<RemoteEntry> = tree
            .dirs
            .iter()
            .filter(|d| d.as_str() != "/" && parent_of(d) == dir)
            .map(|d| RemoteEntry {
                name: base_name(d).to_string(),
                size: 4096,
                kind: EntryKind::Directory,
                modified_at: Some("Jan 01 12:00".into()),
            })
            .collect();

        entries.extend(
            tree.files
                .iter()
                .filter(|(path, _)| parent_of(path) == dir)
                .map(|(path, data)| RemoteEntry {
                    name: base_name(path).to_string(),
                    size: data.len() as u64,
                    kind: EntryKind::File,
                    modified_at: Some("Jan 01 12:00".into()),
                }),
        );

        Ok(entries)
    }
}

#[async_trait]
impl RemoteSession for FakeSession {
    async fn ensure_dir(&mut self, path: &str) -> Result<(), RemoteError> {
        let path = normalize(path);
        let mut tree = self.tree.lock().unwrap();
        let mut current = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = format!("{current}/{segment}");
            tree.dirs.insert(current.clone());
        }
        Ok(())
    }

    async fn exists(&mut self, dir: &str, name: &str) -> Result<bool, RemoteError> {
        match self.entries(dir) {
            Ok(entries) => Ok(entries.iter().any(|e| e.name == name)),
            Err(RemoteError::DirectoryNotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn upload(&mut self, local: &Path, remote_path: &str) -> Result<u64, RemoteError> {
        let data = tokio::fs::read(local).await.map_err(RemoteError::Local)?;
        let path = normalize(remote_path);

        let mut tree = self.tree.lock().unwrap();
        if !tree.dirs.contains(&parent_of(&path)) {
            return Err(RemoteError::Transfer {
                operation: "upload".into(),
                source: FtpError::UnexpectedReply {
                    command: "STOR".into(),
                    code: 553,
                    message: "No such directory".into(),
                },
            });
        }
        let size = data.len() as u64;
        tree.files.insert(path, data);
        Ok(size)
    }

    async fn download_to(
        &mut self,
        local: &Path,
        dir: &str,
        name: &str,
    ) -> Result<u64, RemoteError> {
        let dir_path = normalize(dir);
        let data = {
            let tree = self.tree.lock().unwrap();
            if !tree.dirs.contains(&dir_path) {
                return Err(RemoteError::DirectoryNotFound(dir.to_string()));
            }
            tree.files
                .get(&normalize(&format!("{dir_path}/{name}")))
                .cloned()
                .ok_or_else(|| RemoteError::FileNotFound(name.to_string()))?
        };

        tokio::fs::write(local, &data)
            .await
            .map_err(RemoteError::Local)?;
        Ok(data.len() as u64)
    }

    async fn list(&mut self, dir: &str) -> Result<Vec<RemoteEntry>, RemoteError> {
        self.entries(dir)
    }

    async fn close(self: Box<Self>) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}
