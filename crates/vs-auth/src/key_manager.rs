use std::path::Path;
use std::sync::Arc;

use argon2::{Algorithm, Argon2, Params, Version};
use base64::Engine;
use serde::{Deserialize, Serialize};
use tokio::fs;
#[cfg(feature = "keyring-support")]
use zeroize::Zeroizing;

use crate::crypto::{self, EncryptionKey};
use crate::errors::{AuthError, Result};
use crate::secret::SecretProvider;

const SALT_LEN: usize = 32;

#[cfg(feature = "keyring-support")]
const KEYRING_SERVICE: &str = "vshop";
#[cfg(feature = "keyring-support")]
const KEYRING_USER: &str = "vs-auth:v1";

/// Metadata for key derivation and storage format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyMeta {
    pub version: u32,
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Base64-encoded salt for Argon2id (if using passphrase)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passphrase_salt: Option<String>,
}

impl Default for KeyMeta {
    fn default() -> Self {
        Self {
            version: 1,
            created_at: chrono::Utc::now(),
            passphrase_salt: None,
        }
    }
}

/// Owns the credential file key: OS keyring first, passphrase fallback
pub struct KeyManager {
    meta: KeyMeta,
    key: EncryptionKey,
}

impl KeyManager {
    pub async fn new(storage_dir: &Path, secret_provider: Arc<dyn SecretProvider>) -> Result<Self> {
        let meta_path = storage_dir.join("meta.json");

        let mut meta = if fs::try_exists(&meta_path).await? {
            let content = fs::read_to_string(&meta_path).await?;
            serde_json::from_str(&content)
                .map_err(|e| AuthError::InvalidResponse(format!("Invalid meta.json: {}", e)))?
        } else {
            KeyMeta::default()
        };

        let key = Self::resolve_key(&mut meta, &secret_provider).await?;
        Self::write_meta(storage_dir, &meta).await?;

        Ok(Self { meta, key })
    }

    pub fn key(&self) -> &EncryptionKey {
        &self.key
    }

    #[cfg(feature = "keyring-support")]
    async fn resolve_key(
        meta: &mut KeyMeta,
        secret_provider: &Arc<dyn SecretProvider>,
    ) -> Result<EncryptionKey> {
        match Self::load_from_keyring() {
            Ok(key) => {
                tracing::debug!("Loaded encryption key from OS keyring");
                Ok(key)
            }
            Err(e) => {
                tracing::debug!("Keyring unavailable ({}), using passphrase fallback", e);
                let key = Self::derive_from_passphrase(meta, secret_provider).await?;

                if let Err(e) = Self::save_to_keyring(&key) {
                    tracing::warn!("Failed to save key to keyring: {}", e);
                }
                Ok(key)
            }
        }
    }

    #[cfg(not(feature = "keyring-support"))]
    async fn resolve_key(
        meta: &mut KeyMeta,
        secret_provider: &Arc<dyn SecretProvider>,
    ) -> Result<EncryptionKey> {
        Self::derive_from_passphrase(meta, secret_provider).await
    }

    #[cfg(feature = "keyring-support")]
    fn load_from_keyring() -> Result<EncryptionKey> {
        let entry = keyring::Entry::new(KEYRING_SERVICE, KEYRING_USER)
            .map_err(|e| AuthError::Keyring(format!("Failed to access keyring: {}", e)))?;

        let key_b64 = Zeroizing::new(
            entry
                .get_password()
                .map_err(|e| AuthError::Keyring(format!("Failed to read from keyring: {}", e)))?,
        );

        let key_bytes = Zeroizing::new(
            base64::engine::general_purpose::STANDARD
                .decode(key_b64.as_bytes())
                .map_err(|_| AuthError::CorruptedStore)?,
        );

        let key: [u8; 32] = key_bytes
            .as_slice()
            .try_into()
            .map_err(|_| AuthError::CorruptedStore)?;

        Ok(EncryptionKey::from_bytes(key))
    }

    #[cfg(feature = "keyring-support")]
    fn save_to_keyring(key: &EncryptionKey) -> Result<()> {
        let entry = keyring::Entry::new(KEYRING_SERVICE, KEYRING_USER)
            .map_err(|e| AuthError::Keyring(format!("Failed to access keyring: {}", e)))?;

        let key_b64 = Zeroizing::new(base64::engine::general_purpose::STANDARD.encode(key.as_bytes()));

        entry
            .set_password(&key_b64)
            .map_err(|e| AuthError::Keyring(format!("Failed to write to keyring: {}", e)))
    }

    /// Derive key from passphrase using Argon2id (m=64MiB, t=3, p=1)
    async fn derive_from_passphrase(
        meta: &mut KeyMeta,
        secret_provider: &Arc<dyn SecretProvider>,
    ) -> Result<EncryptionKey> {
        let salt = if let Some(ref salt_b64) = meta.passphrase_salt {
            base64::engine::general_purpose::STANDARD
                .decode(salt_b64)
                .map_err(|_| AuthError::CorruptedStore)?
        } else {
            let mut salt = vec![0u8; SALT_LEN];
            crypto::fill_random(&mut salt)?;
            meta.passphrase_salt = Some(base64::engine::general_purpose::STANDARD.encode(&salt));
            salt
        };

        let passphrase = secret_provider
            .get_passphrase("Enter passphrase for credential storage")
            .await
            .ok_or(AuthError::UserCancelled)?;

        let params = Params::new(65536, 3, 1, Some(32))
            .map_err(|e| AuthError::Crypto(format!("Invalid Argon2 params: {}", e)))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut key = [0u8; 32];
        argon2
            .hash_password_into(passphrase.as_bytes(), &salt, &mut key)
            .map_err(|e| AuthError::Crypto(format!("Key derivation failed: {}", e)))?;

        Ok(EncryptionKey::from_bytes(key))
    }

    /// Replace the key with a freshly generated one
    ///
    /// The caller is responsible for re-encrypting data under the new key.
    pub async fn rotate(&mut self, storage_dir: &Path) -> Result<()> {
        let new_key = EncryptionKey::generate()?;
        self.meta.created_at = chrono::Utc::now();

        #[cfg(feature = "keyring-support")]
        if let Err(e) = Self::save_to_keyring(&new_key) {
            tracing::warn!("Failed to save new key to keyring: {}", e);
        }

        Self::write_meta(storage_dir, &self.meta).await?;
        self.key = new_key;
        Ok(())
    }

    async fn write_meta(storage_dir: &Path, meta: &KeyMeta) -> Result<()> {
        let meta_json = serde_json::to_string_pretty(meta)
            .map_err(|e| AuthError::InvalidResponse(format!("Failed to serialize meta: {}", e)))?;
        fs::write(storage_dir.join("meta.json"), meta_json).await?;
        Ok(())
    }
}

impl std::fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyManager")
            .field("meta", &self.meta)
            .field("key", &"[REDACTED]")
            .finish()
    }
}
