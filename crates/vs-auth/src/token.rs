use std::fmt;

use url::form_urlencoded;

use crate::config::DEFAULT_TOKEN_LIFETIME_SECS;
use crate::errors::{AuthError, Result};

/// Bearer token pulled out of the identity provider's redirect target
#[derive(Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub id_token: Option<String>,
    /// Lifetime in seconds as announced by the provider
    pub expires_in: i64,
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"[REDACTED]")
            .field("id_token", &self.id_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Extract the token parameters from a redirect URI
///
/// Parameters are read from the fragment, or from the query when there is
/// no fragment, in any order and percent-decoded. A missing or empty
/// `access_token` is [`AuthError::NoToken`]; a lifetime that is not a
/// positive, representable number of seconds falls back to the default.
pub fn extract_tokens(uri: &str) -> Result<TokenGrant> {
    let params = match uri.split_once('#') {
        Some((_, fragment)) => fragment,
        None => uri.split_once('?').map(|(_, query)| query).unwrap_or(uri),
    };

    let mut access_token = None;
    let mut id_token = None;
    let mut expires_in = None;

    for (key, value) in form_urlencoded::parse(params.as_bytes()) {
        match key.as_ref() {
            "access_token" if !value.is_empty() => access_token = Some(value.into_owned()),
            "id_token" if !value.is_empty() => id_token = Some(value.into_owned()),
            "expires_in" => {
                expires_in = value
                    .parse::<i64>()
                    .ok()
                    .filter(|secs| *secs > 0 && chrono::Duration::try_seconds(*secs).is_some())
            }
            _ => {}
        }
    }

    Ok(TokenGrant {
        access_token: access_token.ok_or(AuthError::NoToken)?,
        id_token,
        expires_in: expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS),
    })
}
