/*
[INPUT]:  Store file path and key/value writes
[OUTPUT]: Single JSON document on disk, replaced atomically per write
[POS]:    Storage layer - file backend used by the CLI composition root
[UPDATE]: When on-disk format or permission handling changes
*/

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use super::{SecureStore, StoreResult};

/// File-backed store. Every write rewrites the whole document via a temp file + rename.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl JsonFileStore {
    /// Open (or lazily create) the store at `path`.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let entries = Self::load(&path).await?;
        debug!(path = %path.display(), entries = entries.len(), "opened json file store");

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(path: &Path) -> StoreResult<BTreeMap<String, String>> {
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(path).await?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    async fn persist(&self, entries: &BTreeMap<String, String>) -> StoreResult<()> {
        let content = serde_json::to_string_pretty(entries)?;
        let tmp_path = self.path.with_extension("json.tmp");

        fs::write(&tmp_path, content).await?;
        restrict_permissions(&tmp_path).await?;
        fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }

    /// Apply `mutate` to a copy, persist it, then commit in memory.
    async fn update(&self, mutate: impl FnOnce(&mut BTreeMap<String, String>)) -> StoreResult<()> {
        let mut guard = self.entries.lock().await;
        let mut next = guard.clone();
        mutate(&mut next);
        self.persist(&next).await?;
        *guard = next;
        Ok(())
    }
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> StoreResult<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = fs::metadata(path).await?.permissions();
    perms.set_mode(0o600);
    fs::set_permissions(path, perms).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) -> StoreResult<()> {
    Ok(())
}

#[async_trait]
impl SecureStore for JsonFileStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.update(|map| {
            map.insert(key.to_string(), value.to_string());
        })
        .await
    }

    async fn multi_get(&self, keys: &[&str]) -> StoreResult<Vec<Option<String>>> {
        let entries = self.entries.lock().await;
        Ok(keys.iter().map(|key| entries.get(*key).cloned()).collect())
    }

    async fn multi_set(&self, entries: &[(&str, String)]) -> StoreResult<()> {
        self.update(|map| {
            for (key, value) in entries {
                map.insert((*key).to_string(), value.clone());
            }
        })
        .await
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        if !self.entries.lock().await.contains_key(key) {
            return Ok(());
        }
        self.update(|map| {
            map.remove(key);
        })
        .await
    }
}
