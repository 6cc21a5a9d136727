use std::time::Duration;

use url::Url;

use crate::errors::Result;

/// Riot identity provider endpoints
pub mod endpoints {
    pub const AUTHORIZE: &str = "https://auth.riotgames.com/api/v1/authorization";
    pub const SILENT_AUTHORIZE: &str = "https://auth.riotgames.com/authorize";
    pub const ENTITLEMENT: &str = "https://entitlements.auth.riotgames.com/api/token/v1";
    pub const USERINFO: &str = "https://auth.riotgames.com/userinfo";
}

/// Web client registration used by the official storefront
pub mod official {
    pub const CLIENT_ID: &str = "play-valorant-web-prod";
    pub const REDIRECT_URI: &str = "https://playvalorant.com/opt_in";
    pub const RESPONSE_TYPE: &str = "token id_token";
    pub const NONCE: &str = "1";
}

/// Name of the long-lived cookie that allows silent re-auth
pub const SESSION_COOKIE_NAME: &str = "ssid";

/// Lifetime granted to a credential renewed through silent re-auth
pub const SILENT_REAUTH_LIFETIME_SECS: i64 = 3600;

/// Lifetime assumed when the provider omits `expires_in`
pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpTimeouts {
    pub connect: Duration,
    pub request: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(15),
            request: Duration::from_secs(30),
        }
    }
}

/// Identity endpoint URLs
#[derive(Debug, Clone)]
pub struct AuthEndpoints {
    pub authorize: Url,
    pub silent_authorize: Url,
    pub entitlement: Url,
    pub userinfo: Url,
}

impl AuthEndpoints {
    pub fn official() -> Result<Self> {
        Ok(Self {
            authorize: Url::parse(endpoints::AUTHORIZE)?,
            silent_authorize: Url::parse(endpoints::SILENT_AUTHORIZE)?,
            entitlement: Url::parse(endpoints::ENTITLEMENT)?,
            userinfo: Url::parse(endpoints::USERINFO)?,
        })
    }

    /// Same paths as production, served from `base`
    pub fn with_base_url(base: &Url) -> Result<Self> {
        Ok(Self {
            authorize: base.join("/api/v1/authorization")?,
            silent_authorize: base.join("/authorize")?,
            entitlement: base.join("/api/token/v1")?,
            userinfo: base.join("/userinfo")?,
        })
    }
}

/// Configuration for [`AuthClient`](crate::AuthClient)
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub client_id: String,
    pub redirect_uri: String,
    pub response_type: String,
    pub nonce: String,
    pub endpoints: AuthEndpoints,
    pub http_timeouts: HttpTimeouts,
    pub user_agent: Option<String>,
}

impl AuthConfig {
    /// Production identity provider with the official web client
    pub fn official() -> Result<Self> {
        Ok(Self::with_endpoints(AuthEndpoints::official()?))
    }

    /// Official client registration against an alternative host
    pub fn with_base_url(base: &Url) -> Result<Self> {
        Ok(Self::with_endpoints(AuthEndpoints::with_base_url(base)?))
    }

    fn with_endpoints(endpoints: AuthEndpoints) -> Self {
        Self {
            client_id: official::CLIENT_ID.to_string(),
            redirect_uri: official::REDIRECT_URI.to_string(),
            response_type: official::RESPONSE_TYPE.to_string(),
            nonce: official::NONCE.to_string(),
            endpoints,
            http_timeouts: HttpTimeouts::default(),
            user_agent: Some("vshop".to_string()),
        }
    }
}
