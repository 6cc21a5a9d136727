use zeroize::Zeroizing;

/// Trait for providing the passphrase the credential file key is derived from
///
/// Used as a fallback when the OS keyring is unavailable or fails.
#[async_trait::async_trait]
pub trait SecretProvider: Send + Sync {
    /// Returns None if the user cancels or no passphrase is available.
    /// The returned string is zeroized when dropped.
    async fn get_passphrase(&self, prompt: &str) -> Option<Zeroizing<String>>;
}

/// Keyring-only operation, never supplies a passphrase
#[derive(Debug, Clone, Default)]
pub struct NoSecretProvider;

#[async_trait::async_trait]
impl SecretProvider for NoSecretProvider {
    async fn get_passphrase(&self, _prompt: &str) -> Option<Zeroizing<String>> {
        None
    }
}

/// Fixed passphrase, for tests and headless setups
#[derive(Clone)]
pub struct StaticSecretProvider {
    secret: Zeroizing<String>,
}

impl StaticSecretProvider {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: Zeroizing::new(secret.into()),
        }
    }
}

impl std::fmt::Debug for StaticSecretProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticSecretProvider([REDACTED])")
    }
}

#[async_trait::async_trait]
impl SecretProvider for StaticSecretProvider {
    async fn get_passphrase(&self, _prompt: &str) -> Option<Zeroizing<String>> {
        Some(self.secret.clone())
    }
}
