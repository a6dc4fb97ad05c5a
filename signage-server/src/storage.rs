use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};

/// Where uploaded media bytes live. Records in the database are the source of
/// truth; the file store only holds the payloads they point at.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Writes `bytes` under `name` and returns the stored size.
    async fn save(&self, name: &str, bytes: &[u8]) -> io::Result<u64>;

    /// Best-effort removal. Returns `false` when the file could not be removed.
    async fn delete(&self, name: &str) -> bool;

    /// Total bytes currently held.
    async fn total_size(&self) -> io::Result<u64>;
}

pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> io::Result<PathBuf> {
        let candidate = Path::new(name);
        let is_plain_name = candidate.components().count() == 1
            && candidate.file_name().map(|f| f == candidate.as_os_str()) == Some(true);
        if !is_plain_name {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("refusing non-plain file name {:?}", name),
            ));
        }
        Ok(self.root.join(candidate))
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn save(&self, name: &str, bytes: &[u8]) -> io::Result<u64> {
        let path = self.path_for(name)?;
        tokio::fs::write(&path, bytes).await?;
        let metadata = tokio::fs::metadata(&path).await?;
        Ok(metadata.len())
    }

    async fn delete(&self, name: &str) -> bool {
        let path = match self.path_for(name) {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!("Not deleting {:?}: {}", name, e);
                return false;
            }
        };

        match tokio::fs::remove_file(&path).await {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!("Media file {:?} was already gone", path);
                true
            }
            Err(e) => {
                tracing::error!("Failed to delete media file {:?}: {}", path, e);
                false
            }
        }
    }

    async fn total_size(&self) -> io::Result<u64> {
        let mut total = 0;
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if metadata.is_file() {
                total += metadata.len();
            }
        }
        Ok(total)
    }
}
