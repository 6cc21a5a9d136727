use std::path::{Path, PathBuf};
use std::sync::Arc;

use fs2::FileExt;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, error};
use zeroize::Zeroizing;

use crate::credential::StoredCredentials;
use crate::crypto::{self, EncryptedBlob};
use crate::errors::{AuthError, Result};
use crate::key_manager::KeyManager;
use crate::secret::SecretProvider;
use crate::store::CredentialStore;

/// Additional authenticated data binding the blob to its purpose
const BLOB_CONTEXT: &str = "credentials";

/// File-based encrypted credential store
///
/// # Directory Structure
/// ```text
/// ~/.config/vshop/vs-auth/
/// ├── meta.json              # Key derivation metadata
/// ├── lock                   # Advisory lock file
/// └── credentials.json       # Encrypted credentials + session cookie
/// ```
#[derive(Debug)]
pub struct FileCredentialStore {
    storage_dir: PathBuf,
    credentials_file: PathBuf,
    lock_file: PathBuf,
    key_manager: RwLock<KeyManager>,
    /// Decrypted copy of the last loaded or saved credentials
    cache: RwLock<Option<StoredCredentials>>,
}

impl FileCredentialStore {
    /// Open (or create) the store rooted at `storage_dir`
    pub async fn new(
        storage_dir: impl AsRef<Path>,
        secret_provider: Arc<dyn SecretProvider>,
    ) -> Result<Self> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        fs::create_dir_all(&storage_dir).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&storage_dir, std::fs::Permissions::from_mode(0o700)).await?;
        }

        let key_manager = KeyManager::new(&storage_dir, secret_provider).await?;

        Ok(Self {
            credentials_file: storage_dir.join("credentials.json"),
            lock_file: storage_dir.join("lock"),
            storage_dir,
            key_manager: RwLock::new(key_manager),
            cache: RwLock::new(None),
        })
    }

    /// Default storage directory for the current platform
    pub fn default_storage_dir() -> Result<PathBuf> {
        let project_dirs = directories::ProjectDirs::from("com", "vshop", "vshop").ok_or_else(|| {
            AuthError::InvalidResponse("Could not determine config directory".to_string())
        })?;

        Ok(project_dirs.config_dir().join("vs-auth"))
    }

    fn acquire_lock(&self) -> Result<std::fs::File> {
        let lock_file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_file)?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| AuthError::LockTimeout)?;

        Ok(lock_file)
    }

    async fn load_from_disk(&self) -> Result<Option<StoredCredentials>> {
        if !fs::try_exists(&self.credentials_file).await? {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.credentials_file).await?;
        let encrypted: EncryptedBlob = serde_json::from_str(&content)
            .map_err(|e| AuthError::InvalidResponse(format!("Invalid encrypted data: {}", e)))?;

        let plaintext = {
            let key_manager = self.key_manager.read().await;
            Zeroizing::new(crypto::decrypt(key_manager.key(), &encrypted, BLOB_CONTEXT)?)
        };

        let credentials = serde_json::from_slice(&plaintext)
            .map_err(|e| AuthError::InvalidResponse(format!("Invalid credential data: {}", e)))?;

        Ok(Some(credentials))
    }

    async fn save_to_disk(&self, credentials: &StoredCredentials) -> Result<()> {
        let plaintext = Zeroizing::new(serde_json::to_vec(credentials).map_err(|e| {
            AuthError::InvalidResponse(format!("Failed to serialize credentials: {}", e))
        })?);

        let encrypted = {
            let key_manager = self.key_manager.read().await;
            crypto::encrypt(key_manager.key(), &plaintext, BLOB_CONTEXT)?
        };

        let encrypted_json = serde_json::to_string_pretty(&encrypted).map_err(|e| {
            AuthError::InvalidResponse(format!("Failed to serialize encrypted blob: {}", e))
        })?;

        // Atomic write: temp file, sync, rename
        let temp_path = self.credentials_file.with_extension("tmp");
        fs::write(&temp_path, encrypted_json).await?;
        fs::File::open(&temp_path).await?.sync_all().await?;
        fs::rename(&temp_path, &self.credentials_file).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(
                &self.credentials_file,
                std::fs::Permissions::from_mode(0o600),
            )
            .await?;
        }

        Ok(())
    }

    /// Rotate the encryption key and re-encrypt the stored credentials
    pub async fn rotate_key(&self) -> Result<()> {
        let _lock = self.acquire_lock()?;

        let current = self.load_from_disk().await?;

        self.key_manager.write().await.rotate(&self.storage_dir).await?;

        if let Some(credentials) = current {
            self.save_to_disk(&credentials).await?;
        }
        debug!("Rotated credential store key");

        Ok(())
    }
}

#[async_trait::async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> Option<StoredCredentials> {
        if let Some(credentials) = self.cache.read().await.as_ref() {
            return Some(credentials.clone());
        }

        match self.load_from_disk().await {
            Ok(Some(credentials)) => {
                *self.cache.write().await = Some(credentials.clone());
                Some(credentials)
            }
            Ok(None) => None,
            Err(e) => {
                error!("Failed to load stored credentials: {}", e);
                None
            }
        }
    }

    async fn save(&self, credentials: &StoredCredentials) -> Result<()> {
        let _lock = self.acquire_lock()?;

        self.save_to_disk(credentials).await?;
        *self.cache.write().await = Some(credentials.clone());

        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let _lock = self.acquire_lock()?;

        if fs::try_exists(&self.credentials_file).await? {
            fs::remove_file(&self.credentials_file).await?;
        }
        *self.cache.write().await = None;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::Credential;
    use crate::secret::StaticSecretProvider;
    use chrono::DateTime;
    use tempfile::TempDir;

    async fn create_test_store(dir: &TempDir) -> FileCredentialStore {
        let secret_provider = Arc::new(StaticSecretProvider::new("test-passphrase"));
        FileCredentialStore::new(dir.path(), secret_provider).await.unwrap()
    }

    fn credentials() -> StoredCredentials {
        StoredCredentials {
            credential: Credential {
                access_token: "access".to_string(),
                entitlement_token: "entitlement".to_string(),
                puuid: "test-puuid".to_string(),
                expires_at: DateTime::from_timestamp(1_900_000_000, 0).unwrap(),
            },
            session_cookie: Some("ssid-value".to_string()),
        }
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let store = create_test_store(&temp).await;

        store.save(&credentials()).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, credentials());
    }

    #[tokio::test]
    async fn test_file_is_encrypted_at_rest() {
        let temp = TempDir::new().unwrap();
        let store = create_test_store(&temp).await;

        store.save(&credentials()).await.unwrap();

        let raw = std::fs::read_to_string(temp.path().join("credentials.json")).unwrap();
        assert!(!raw.contains("ssid-value"));
        assert!(!raw.contains("test-puuid"));
    }

    #[tokio::test]
    async fn test_clear_removes_credentials() {
        let temp = TempDir::new().unwrap();
        let store = create_test_store(&temp).await;

        store.save(&credentials()).await.unwrap();
        assert!(store.load().await.is_some());

        store.clear().await.unwrap();
        assert!(store.load().await.is_none());
        assert!(!temp.path().join("credentials.json").exists());
    }

    #[tokio::test]
    async fn test_rotate_key_keeps_credentials_readable() {
        let temp = TempDir::new().unwrap();
        let store = create_test_store(&temp).await;

        store.save(&credentials()).await.unwrap();
        let before = std::fs::read_to_string(temp.path().join("credentials.json")).unwrap();

        store.rotate_key().await.unwrap();

        let after = std::fs::read_to_string(temp.path().join("credentials.json")).unwrap();
        assert_ne!(before, after);
        assert_eq!(store.load_from_disk().await.unwrap(), Some(credentials()));
    }
}
