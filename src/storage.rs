use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

pub const ACCESS_TOKEN: &str = "access";
pub const REFRESH_TOKEN: &str = "refresh";

/// Client-side key/value storage for the session token pair.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
    async fn remove(&self, key: &str) -> anyhow::Result<()>;

    /// Drops both session tokens.
    async fn clear(&self) -> anyhow::Result<()> {
        self.remove(ACCESS_TOKEN).await?;
        self.remove(REFRESH_TOKEN).await
    }
}

/// Access and refresh token as handed out by the login endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialPair {
    pub access: String,
    pub refresh: String,
}

/// Replaces both stored tokens.
pub async fn store_pair(store: &dyn TokenStore, pair: &CredentialPair) -> anyhow::Result<()> {
    store.set(ACCESS_TOKEN, &pair.access).await?;
    store.set(REFRESH_TOKEN, &pair.refresh).await?;
    Ok(())
}

pub async fn clear_pair(store: &dyn TokenStore) -> anyhow::Result<()> {
    store.clear().await
}

#[derive(Default)]
pub struct MemoryTokenStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.values
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.values.write().await.remove(key);
        Ok(())
    }
}

/// Keeps the tokens in a small JSON object on disk, e.g.
/// `{"access": "eyJ...", "refresh": "eyJ..."}`.
///
/// The file is re-read on every access so several processes sharing it see
/// each other's writes. Writes go to a sibling temp file created with mode
/// 0600 and are renamed into place.
pub struct FileTokenStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> anyhow::Result<HashMap<String, String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) if raw.trim().is_empty() => Ok(HashMap::new()),
            Ok(raw) => serde_json::from_str(&raw)
                .with_context(|| format!("parse token file {}", self.path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e)
                .with_context(|| format!("read token file {}", self.path.display())),
        }
    }

    /// Like `load`, but a file that does not parse comes back as `None` so
    /// the caller can overwrite it instead of failing.
    async fn load_for_write(&self) -> anyhow::Result<Option<HashMap<String, String>>> {
        match self.load().await {
            Ok(values) => Ok(Some(values)),
            Err(e) if e.downcast_ref::<serde_json::Error>().is_some() => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "discarding unreadable token file"
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    async fn save(&self, values: &HashMap<String, String>) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let body = serde_json::to_vec_pretty(values)?;

        let tmp = self.temp_path();
        // a leftover from an interrupted write may carry looser permissions
        tokio::fs::remove_file(&tmp).await.ok();

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o600);
        let mut file = options
            .open(&tmp)
            .await
            .with_context(|| format!("create {}", tmp.display()))?;
        file.write_all(&body)
            .await
            .with_context(|| format!("write {}", tmp.display()))?;
        file.flush().await?;
        file.sync_all().await.context("sync token file")?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("replace token file {}", self.path.display()))?;
        debug!(path = %self.path.display(), keys = values.len(), "token file saved");
        Ok(())
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let mut values = self.load_for_write().await?.unwrap_or_default();
        values.insert(key.to_string(), value.to_string());
        self.save(&values).await
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        match self.load_for_write().await? {
            Some(mut values) => {
                if values.remove(key).is_some() {
                    self.save(&values).await?;
                }
                Ok(())
            }
            None => self.save(&HashMap::new()).await,
        }
    }

    /// Deletes the file outright, whatever state it is in.
    async fn clear(&self) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!(path = %self.path.display(), "token file removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("remove token file {}", self.path.display())),
        }
    }
}
