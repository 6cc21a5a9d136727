use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use zeroize::ZeroizeOnDrop;

use crate::errors::{AuthError, Result};

const AAD_VERSION: &str = "v1";

/// AES-256 key (32 bytes)
#[derive(Clone, ZeroizeOnDrop)]
pub struct EncryptionKey {
    key: [u8; 32],
}

impl EncryptionKey {
    /// Generate a new random encryption key
    pub fn generate() -> Result<Self> {
        let mut key = [0u8; 32];
        fill_random(&mut key)?;
        Ok(Self { key })
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { key: bytes }
    }

    /// Get key bytes (sensitive)
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey([REDACTED])")
    }
}

/// Fill `buf` from the OS random source
pub fn fill_random(buf: &mut [u8]) -> Result<()> {
    getrandom::fill(buf).map_err(|e| AuthError::Crypto(format!("OS randomness unavailable: {}", e)))
}

/// Encrypted data with nonce and authentication tag
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EncryptedBlob {
    /// Base64url-encoded nonce (12 bytes)
    pub nonce: String,
    /// Base64url-encoded ciphertext + tag
    pub ciphertext: String,
    /// Additional authenticated data version
    pub aad_version: String,
}

fn aad(version: &str, context: &str) -> String {
    format!("vs-auth|{}|{}", version, context)
}

/// Encrypt `plaintext` with AES-256-GCM, binding it to `context`
pub fn encrypt(key: &EncryptionKey, plaintext: &[u8], context: &str) -> Result<EncryptedBlob> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let mut nonce_bytes = [0u8; 12];
    fill_random(&mut nonce_bytes)?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    let aad = aad(AAD_VERSION, context);
    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad: aad.as_bytes(),
            },
        )
        .map_err(|e| AuthError::Crypto(format!("Encryption failed: {}", e)))?;

    Ok(EncryptedBlob {
        nonce: URL_SAFE_NO_PAD.encode(nonce_bytes),
        ciphertext: URL_SAFE_NO_PAD.encode(ciphertext),
        aad_version: AAD_VERSION.to_string(),
    })
}

/// Decrypt a blob produced by [`encrypt`] with the same `context`
pub fn decrypt(key: &EncryptionKey, blob: &EncryptedBlob, context: &str) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let nonce_bytes = URL_SAFE_NO_PAD
        .decode(&blob.nonce)
        .map_err(|e| AuthError::Crypto(format!("Invalid nonce: {}", e)))?;
    if nonce_bytes.len() != 12 {
        return Err(AuthError::CorruptedStore);
    }
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = URL_SAFE_NO_PAD
        .decode(&blob.ciphertext)
        .map_err(|e| AuthError::Crypto(format!("Invalid ciphertext: {}", e)))?;

    let aad = aad(&blob.aad_version, context);
    cipher
        .decrypt(
            nonce,
            Payload {
                msg: &ciphertext,
                aad: aad.as_bytes(),
            },
        )
        .map_err(|_| AuthError::CorruptedStore)
}
