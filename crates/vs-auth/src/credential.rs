use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bearer token, entitlement and account id with an explicit expiry
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    pub entitlement_token: String,
    pub puuid: String,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// Usable for resource fetches at `now`
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field("entitlement_token", &"[REDACTED]")
            .field("puuid", &self.puuid)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Everything the credential store persists for the signed-in account
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredCredentials {
    pub credential: Credential,
    /// Long-lived cookie used for silent re-auth; its expiry is server-enforced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_cookie: Option<String>,
}

impl fmt::Debug for StoredCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredCredentials")
            .field("credential", &self.credential)
            .field(
                "session_cookie",
                &self.session_cookie.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}
