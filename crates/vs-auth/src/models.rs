use serde::{Deserialize, Serialize};

/// Cookie bootstrap request (`POST authorization`)
#[derive(Debug, Clone, Serialize)]
pub struct AuthCookiesRequest {
    pub client_id: String,
    pub nonce: String,
    pub redirect_uri: String,
    pub response_type: String,
}

/// Credential grant (`PUT authorization`)
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GrantRequest {
    Auth {
        username: String,
        password: String,
        /// Asks the provider for a long-lived session cookie
        remember: bool,
    },
    Multifactor {
        code: String,
        #[serde(rename = "rememberDevice")]
        remember_device: bool,
    },
}

/// Response to both the cookie bootstrap and the credential grants
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub response: Option<AuthResponseBody>,
    #[serde(default)]
    pub multifactor: Option<MultifactorInfo>,
    #[serde(default)]
    pub error: Option<String>,
}

impl AuthResponse {
    /// Redirect target carrying the bearer token, if the grant succeeded
    pub fn redirect_uri(&self) -> Option<&str> {
        self.response
            .as_ref()
            .map(|body| body.parameters.uri.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponseBody {
    pub parameters: AuthParameters,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthParameters {
    pub uri: String,
}

/// Challenge details for a multi-factor step
#[derive(Debug, Clone, Deserialize)]
pub struct MultifactorInfo {
    /// Masked destination the code was sent to
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
}

/// Entitlement exchange response
#[derive(Debug, Clone, Deserialize)]
pub struct EntitlementResponse {
    pub entitlements_token: String,
}

/// Identity lookup response
#[derive(Debug, Clone, Deserialize)]
pub struct UserInfo {
    /// Account puuid
    pub sub: String,
}
