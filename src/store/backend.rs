use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("profile store unavailable")]
    Unavailable,
    #[error("store operation timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Key-value persistence for profile records, keyed by user id.
///
/// Records are opaque JSON values to the backend. No query or index
/// capability is needed.
#[async_trait]
pub trait ProfileBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
    async fn put(&self, key: &str, record: Value) -> Result<(), StoreError>;
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Process-local backend. Contents live as long as the process.
#[derive(Default)]
pub struct MemoryBackend {
    records: RwLock<HashMap<String, Value>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl ProfileBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, record: Value) -> Result<(), StoreError> {
        self.records.write().await.insert(key.to_string(), record);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.records.write().await.remove(key);
        Ok(())
    }
}

/// One JSON file per user under a state directory.
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    /// Open (and create if needed) the profile directory.
    pub fn open(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| anyhow::anyhow!("failed to create {}: {e}", dir.display()))?;
        restrict_permissions(&dir, 0o700)
            .map_err(|e| anyhow::anyhow!("failed to chmod 700 {}: {e}", dir.display()))?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_key(key)))
    }
}

#[async_trait]
impl ProfileBackend for FileBackend {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &str, record: Value) -> Result<(), StoreError> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(&record)?;

        tokio::fs::write(&tmp, bytes).await?;
        restrict_permissions(&tmp, 0o600)?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!(path = %path.display(), "profile record written");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

/// Encoded stems longer than this are shortened to fit file name limits.
const MAX_STEM_LEN: usize = 200;
/// Bytes of the readable prefix kept in front of the digest.
const STEM_PREFIX_LEN: usize = 120;

/// Map a user id to a safe file stem: ASCII alphanumerics, `-`, `_` and
/// `.` pass through, every other byte becomes `%XX`. A leading `.` is
/// escaped so no stem is hidden or relative.
///
/// A stem that would exceed [`MAX_STEM_LEN`] becomes its first
/// [`STEM_PREFIX_LEN`] bytes, `~`, and the SHA-256 of the raw id.
/// `~` never appears in a plain encoding, so the two forms cannot collide.
pub fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for (i, byte) in key.bytes().enumerate() {
        let keep = byte.is_ascii_alphanumeric()
            || byte == b'-'
            || byte == b'_'
            || (byte == b'.' && i > 0);
        if keep {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    if out.is_empty() {
        out.push_str("%00");
    }
    if out.len() > MAX_STEM_LEN {
        out.truncate(STEM_PREFIX_LEN);
        out.push('~');
        out.push_str(&format!("{:x}", Sha256::digest(key.as_bytes())));
    }
    out
}
