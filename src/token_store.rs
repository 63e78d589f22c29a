use async_trait::async_trait;
use serde::Deserialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{EntrigError, Result};
use crate::models::RegistrationRecord;

pub const PREFS_FILE_NAME: &str = "com.entrig.sdk.prefs.json";

/// Persisted registration record. Writes replace or clear the whole record.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn load(&self) -> Result<Option<RegistrationRecord>>;
    async fn save(&self, record: &RegistrationRecord) -> Result<()>;
    async fn clear(&self) -> Result<()>;
}

// Tolerates documents written by older or partial writers
#[derive(Deserialize)]
struct StoredPrefs {
    entrig_registration_id: Option<String>,
    entrig_user_id: Option<String>,
    entrig_fcm_token: Option<String>,
}

impl StoredPrefs {
    fn into_record(self) -> Option<RegistrationRecord> {
        Some(RegistrationRecord {
            registration_id: self.entrig_registration_id?,
            user_id: self.entrig_user_id?,
            push_token: self.entrig_fcm_token?,
        })
    }
}

pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(PREFS_FILE_NAME),
        }
    }

    /// Store under the platform data directory, e.g. `~/.local/share/entrig`.
    pub fn in_default_location() -> Result<Self> {
        let dir = dirs::data_dir()
            .ok_or_else(|| EntrigError::Storage("no data directory available".to_string()))?
            .join("entrig");
        Ok(Self::new(dir))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self) -> Result<Option<RegistrationRecord>> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let prefs: StoredPrefs = serde_json::from_slice(&raw)?;
        let record = prefs.into_record();
        if record.is_none() {
            warn!(path = %self.path.display(), "Ignoring partial registration record");
        }
        Ok(record)
    }

    async fn save(&self, record: &RegistrationRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write then rename so readers never see a half-written record
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(record)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(
            path = %self.path.display(),
            registration_id = %record.registration_id,
            "Saved registration record"
        );
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!(path = %self.path.display(), "Cleared registration record");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Default)]
pub struct MemoryTokenStore {
    record: RwLock<Option<RegistrationRecord>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: RegistrationRecord) -> Self {
        Self {
            record: RwLock::new(Some(record)),
        }
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self) -> Result<Option<RegistrationRecord>> {
        Ok(self.record.read().await.clone())
    }

    async fn save(&self, record: &RegistrationRecord) -> Result<()> {
        *self.record.write().await = Some(record.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.record.write().await = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(user: &str, token: &str) -> RegistrationRecord {
        RegistrationRecord {
            registration_id: format!("reg-{}", user),
            user_id: user.to_string(),
            push_token: token.to_string(),
        }
    }

    #[tokio::test]
    async fn test_file_store_roundtrip_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("nested"));

        assert_eq!(store.load().await.unwrap(), None);

        store.save(&record("u1", "tok")).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(record("u1", "tok")));

        // Survives a new handle on the same directory
        let reopened = FileTokenStore::new(dir.path().join("nested"));
        assert_eq!(reopened.load().await.unwrap(), Some(record("u1", "tok")));

        store.save(&record("u2", "tok2")).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(record("u2", "tok2")));

        store.clear().await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);
        // Clearing twice is fine
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_partial_record_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path());
        tokio::fs::write(
            store.path(),
            br#"{"entrig_user_id":"u1","entrig_fcm_token":"tok"}"#,
        )
        .await
        .unwrap();

        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path());
        tokio::fs::write(store.path(), b"not json").await.unwrap();

        assert!(matches!(store.load().await, Err(EntrigError::Storage(_))));
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryTokenStore::with_record(record("u1", "tok"));
        assert_eq!(store.load().await.unwrap(), Some(record("u1", "tok")));
        store.clear().await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);
    }
}
