use std::sync::Arc;

use thiserror::Error;
use vs_auth::AuthError;
use vs_core::{ResourceKind, SettingsError};

/// Storefront sync error types
///
/// `Clone` so one failed refetch can be handed to every caller that
/// waited on it.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("No valid token available - interactive login required")]
    NoToken,

    #[error("Network error: {0}")]
    Network(Arc<reqwest::Error>),

    #[error("HTTP error {status}: {body_snippet}")]
    Http {
        status: reqwest::StatusCode,
        body_snippet: String,
    },

    #[error("Failed to parse response: {0}")]
    Parsing(Arc<serde_json::Error>),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Failed to sync {kind}: {source}")]
    SyncFailed {
        kind: ResourceKind,
        #[source]
        source: Box<StoreError>,
    },
}

impl StoreError {
    /// Build a [`StoreError::Http`] from a non-2xx response
    pub async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Self::Http {
            status,
            body_snippet: body.chars().take(200).collect(),
        }
    }

    /// Attach the resource kind whose sync failed
    ///
    /// [`StoreError::NoToken`] is left bare so callers can route to login.
    pub fn during(self, kind: ResourceKind) -> Self {
        match self {
            Self::NoToken | Self::SyncFailed { .. } => self,
            other => Self::SyncFailed {
                kind,
                source: Box::new(other),
            },
        }
    }

    pub fn is_no_token(&self) -> bool {
        match self {
            Self::NoToken => true,
            Self::SyncFailed { source, .. } => source.is_no_token(),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(Arc::new(e))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parsing(Arc::new(e))
    }
}

impl From<SettingsError> for StoreError {
    fn from(e: SettingsError) -> Self {
        Self::Storage(e.to_string())
    }
}

/// Anything the session layer reports means no credential is available
impl From<AuthError> for StoreError {
    fn from(e: AuthError) -> Self {
        tracing::debug!("Session unavailable: {}", e);
        Self::NoToken
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_during_wraps_but_keeps_no_token_bare() {
        let wrapped = StoreError::Storage("disk full".to_string()).during(ResourceKind::Wallet);
        assert!(matches!(
            wrapped,
            StoreError::SyncFailed {
                kind: ResourceKind::Wallet,
                ..
            }
        ));
        assert!(!wrapped.is_no_token());

        let bare = StoreError::NoToken.during(ResourceKind::Wallet);
        assert!(matches!(bare, StoreError::NoToken));
    }
}
