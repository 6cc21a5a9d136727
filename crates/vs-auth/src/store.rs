use std::sync::{Arc, RwLock};

use crate::credential::StoredCredentials;
use crate::errors::{AuthError, Result};

/// Durable, secret-safe storage for the signed-in account's credentials
#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load the persisted credentials, if any
    async fn load(&self) -> Option<StoredCredentials>;

    /// Replace the persisted credentials wholesale
    async fn save(&self, credentials: &StoredCredentials) -> Result<()>;

    /// Erase the credential and session cookie together
    async fn clear(&self) -> Result<()>;
}

/// In-memory credential store for testing and simple use cases
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    credentials: Arc<RwLock<Option<StoredCredentials>>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with `credentials`
    pub fn with_credentials(credentials: StoredCredentials) -> Self {
        Self {
            credentials: Arc::new(RwLock::new(Some(credentials))),
        }
    }
}

#[async_trait::async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> Option<StoredCredentials> {
        self.credentials.read().ok()?.clone()
    }

    async fn save(&self, credentials: &StoredCredentials) -> Result<()> {
        *self
            .credentials
            .write()
            .map_err(|_| AuthError::InvalidResponse("Lock poisoned".to_string()))? =
            Some(credentials.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self
            .credentials
            .write()
            .map_err(|_| AuthError::InvalidResponse("Lock poisoned".to_string()))? = None;
        Ok(())
    }
}
