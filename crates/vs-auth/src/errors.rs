use thiserror::Error;

/// Identity and credential error types
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid input: {0}")]
    InvalidInput(&'static str),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP error {status}: {body_snippet}")]
    Http {
        status: reqwest::StatusCode,
        body_snippet: String,
    },

    #[error("Failed to parse response: {0}")]
    Parsing(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("No valid token available - interactive login required")]
    NoToken,

    #[error("Username or password rejected")]
    InvalidCredentials,

    #[error("Multi-factor code rejected")]
    InvalidCode,

    #[error("Operation not valid in the current session state: {0}")]
    InvalidState(&'static str),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("User cancelled the passphrase prompt")]
    UserCancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cryptography error: {0}")]
    Crypto(String),

    #[error("Credential store is corrupted or was encrypted with another key")]
    CorruptedStore,

    #[error("Keyring error: {0}")]
    Keyring(String),

    #[error("Credential store is locked by another process")]
    LockTimeout,
}

impl AuthError {
    /// Build an [`AuthError::Http`] from a non-2xx response
    pub async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Self::Http {
            status,
            body_snippet: body.chars().take(200).collect(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
