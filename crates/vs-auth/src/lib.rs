//! Riot identity client and session management for the storefront
//!
//! This crate turns a username/password (plus an optional multi-factor code)
//! into a working credential set, and keeps it usable by renewing it
//! silently through the long-lived session cookie.
//!
//! # Authentication Flow
//!
//! 1. Cookie bootstrap against the authorization endpoint
//! 2. Password grant, answered either with tokens or a multi-factor challenge
//! 3. Multi-factor grant (when challenged)
//! 4. Entitlement exchange
//! 5. User info lookup for the account puuid
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vs_auth::{AuthClient, AuthConfig, LoginOutcome, MemoryCredentialStore, SessionManager};
//! use vs_core::{EventBus, SettingsStore, SystemClock};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = AuthClient::new(AuthConfig::official()?)?;
//!     let session = SessionManager::new(
//!         client,
//!         Arc::new(MemoryCredentialStore::new()),
//!         Arc::new(SettingsStore::open_default().await?),
//!         Arc::new(SystemClock),
//!         EventBus::default(),
//!     );
//!
//!     match session.login("username", "password").await? {
//!         LoginOutcome::Authenticated(credential) => println!("Logged in as {}", credential.puuid),
//!         LoginOutcome::NeedsMultifactor { email } => {
//!             println!("Code sent to {:?}", email);
//!             session.submit_mfa("123456").await?;
//!         }
//!     }
//!
//!     // Renews silently once the hour is up
//!     let _credential = session.get_valid_credential().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Credential Storage
//!
//! ## In-Memory Storage (Testing)
//!
//! ```
//! use vs_auth::{Credential, CredentialStore, MemoryCredentialStore, StoredCredentials};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store = MemoryCredentialStore::new();
//!
//! # let credentials = StoredCredentials {
//! #     credential: Credential {
//! #         access_token: "access".to_string(),
//! #         entitlement_token: "entitlement".to_string(),
//! #         puuid: "puuid".to_string(),
//! #         expires_at: chrono::Utc::now(),
//! #     },
//! #     session_cookie: Some("ssid".to_string()),
//! # };
//! store.save(&credentials).await?;
//!
//! if let Some(stored) = store.load().await {
//!     println!("Loaded credentials for: {}", stored.credential.puuid);
//! }
//! # Ok(())
//! # }
//! # tokio_test::block_on(example()).unwrap();
//! ```
//!
//! ## File-Based Encrypted Storage (Production)
//!
//! ```no_run
//! use std::sync::Arc;
//! use vs_auth::{FileCredentialStore, NoSecretProvider};
//!
//! # async fn example() -> anyhow::Result<()> {
//! // Key lives in the OS keyring; no passphrase needed
//! let storage_dir = FileCredentialStore::default_storage_dir()?;
//! let store = FileCredentialStore::new(storage_dir, Arc::new(NoSecretProvider)).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Important Notes
//!
//! - Tokens, cookies and passwords are never logged; their `Debug` output is redacted
//! - A failed renewal surfaces as [`AuthError::NoToken`]; the cause is only in the logs

pub mod client;
pub mod config;
pub mod cookies;
pub mod credential;
pub mod crypto;
pub mod errors;
pub mod file_store;
pub mod key_manager;
pub mod models;
pub mod secret;
pub mod session;
pub mod store;
pub mod token;

// Re-export main types
pub use client::{AuthClient, GrantOutcome};
pub use config::{AuthConfig, AuthEndpoints, HttpTimeouts};
pub use cookies::AuthCookies;
pub use credential::{Credential, StoredCredentials};
pub use errors::{AuthError, Result};
pub use file_store::FileCredentialStore;
pub use secret::{NoSecretProvider, SecretProvider, StaticSecretProvider};
pub use session::{LoginOutcome, LogoutHook, SessionManager, SessionState};
pub use store::{CredentialStore, MemoryCredentialStore};
pub use token::{TokenGrant, extract_tokens};
