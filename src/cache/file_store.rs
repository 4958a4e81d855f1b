//! Disk-backed cache store
//!
//! Provides a `FileStore` that persists each key as a JSON file with an
//! expiry timestamp, so cached listings survive between runs of the binary.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;

use super::store::{CacheStore, StoreError};

/// File extension used for stored entries
const ENTRY_EXTENSION: &str = "json";

/// Wrapper struct for a value stored on disk
#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    /// The stored value (always UTF-8 JSON produced by the cache manager)
    value: String,
    /// When the value was written
    stored_at: DateTime<Utc>,
    /// When the entry stops being served
    expires_at: DateTime<Utc>,
}

/// Stores cache entries as JSON files in a directory
///
/// The store uses an XDG-compliant cache directory (`~/.cache/jobfeed/` on
/// Linux) by default. File names are the hex encoding of the key, which keeps
/// keys containing `:` or `/` safe and lets `list` recover the original key.
#[derive(Debug, Clone)]
pub struct FileStore {
    /// Directory where entry files are stored
    cache_dir: PathBuf,
}

impl FileStore {
    /// Creates a FileStore using the XDG-compliant cache directory
    ///
    /// Returns `None` if the cache directory cannot be determined (e.g., no home directory).
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "jobfeed")?;
        let cache_dir = project_dirs.cache_dir().to_path_buf();
        Some(Self { cache_dir })
    }

    /// Creates a FileStore rooted at a custom directory
    pub fn with_dir(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    /// Directory holding the entry files
    pub fn dir(&self) -> &PathBuf {
        &self.cache_dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.cache_dir
            .join(format!("{}.{}", encode_key(key), ENTRY_EXTENSION))
    }

    async fn read_entry(&self, path: &PathBuf) -> Result<Option<StoredEntry>, StoreError> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let entry = serde_json::from_str(&content)
            .map_err(|e| StoreError::Encoding(format!("corrupt entry {}: {}", path.display(), e)))?;
        Ok(Some(entry))
    }
}

#[async_trait]
impl CacheStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.entry_path(key);
        let Some(entry) = self.read_entry(&path).await? else {
            return Ok(None);
        };

        if Utc::now() >= entry.expires_at {
            self.delete(key).await?;
            return Ok(None);
        }

        Ok(Some(entry.value.into_bytes()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl_seconds: u64) -> Result<(), StoreError> {
        fs::create_dir_all(&self.cache_dir).await?;

        let value = String::from_utf8(value)
            .map_err(|e| StoreError::Encoding(format!("value for {} is not UTF-8: {}", key, e)))?;
        let now = Utc::now();
        let expires_at = i64::try_from(ttl_seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let entry = StoredEntry {
            value,
            stored_at: now,
            expires_at,
        };

        let json =
            serde_json::to_string(&entry).map_err(|e| StoreError::Encoding(e.to_string()))?;

        fs::write(self.entry_path(key), json).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut dir = match fs::read_dir(&self.cache_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let now = Utc::now();
        let mut keys = Vec::new();
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            let Some(key) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(decode_key)
            else {
                continue;
            };
            if !key.starts_with(prefix) {
                continue;
            }
            // Skip entries that are unreadable or already expired
            if let Ok(Some(entry)) = self.read_entry(&path).await {
                if now < entry.expires_at {
                    keys.push(key);
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

fn encode_key(key: &str) -> String {
    key.bytes().map(|b| format!("{:02x}", b)).collect()
}

fn decode_key(encoded: &str) -> Option<String> {
    if encoded.len() % 2 != 0 {
        return None;
    }
    let bytes = (0..encoded.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(encoded.get(i..i + 2)?, 16).ok())
        .collect::<Option<Vec<u8>>>()?;
    String::from_utf8(bytes).ok()
}
