use reqwest::header::{AUTHORIZATION, COOKIE, LOCATION};
use reqwest::{Client, RequestBuilder, redirect};
use tracing::{debug, instrument, warn};

use crate::config::{AuthConfig, SESSION_COOKIE_NAME};
use crate::cookies::AuthCookies;
use crate::errors::{AuthError, Result};
use crate::models::*;
use crate::token::{TokenGrant, extract_tokens};

/// Scope requested when renewing through the session cookie
const SILENT_SCOPE: &str = "account openid";

/// Result of a password or multi-factor grant
#[derive(Debug, Clone)]
pub enum GrantOutcome {
    /// Tokens were issued; `cookies` holds the session cookie if one was set
    Authorized {
        grant: TokenGrant,
        cookies: AuthCookies,
    },
    /// The provider wants a verification code before issuing tokens
    Multifactor {
        email: Option<String>,
        cookies: AuthCookies,
    },
}

/// Stateless client for the identity provider
///
/// Cookies that tie the login steps together are passed in and handed back
/// explicitly instead of living in a shared jar.
#[derive(Debug, Clone)]
pub struct AuthClient {
    config: AuthConfig,
    http: Client,
}

impl AuthClient {
    pub fn new(config: AuthConfig) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(config.http_timeouts.connect)
            .timeout(config.http_timeouts.request)
            .user_agent(config.user_agent.as_deref().unwrap_or("vshop"))
            .redirect(redirect::Policy::none())
            .build()?;

        Ok(Self { config, http })
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Start an anonymous authorization session and collect its cookies
    #[instrument(skip(self))]
    pub async fn acquire_cookies(&self) -> Result<AuthCookies> {
        let request = AuthCookiesRequest {
            client_id: self.config.client_id.clone(),
            nonce: self.config.nonce.clone(),
            redirect_uri: self.config.redirect_uri.clone(),
            response_type: self.config.response_type.clone(),
        };

        debug!("Acquiring anonymous authorization cookies");
        let response = self
            .http
            .post(self.config.endpoints.authorize.clone())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AuthError::from_response(response).await);
        }

        let mut cookies = AuthCookies::new();
        cookies.absorb(response.headers());
        Ok(cookies)
    }

    /// Submit username and password within the session started by [`Self::acquire_cookies`]
    #[instrument(skip(self, cookies, password))]
    pub async fn submit_password(
        &self,
        cookies: AuthCookies,
        username: &str,
        password: &str,
    ) -> Result<GrantOutcome> {
        let request = GrantRequest::Auth {
            username: username.to_string(),
            password: password.to_string(),
            remember: true,
        };

        debug!("Submitting password grant");
        self.put_grant(cookies, &request).await
    }

    /// Submit the verification code for a pending multi-factor challenge
    #[instrument(skip(self, cookies, code))]
    pub async fn submit_multifactor(&self, cookies: AuthCookies, code: &str) -> Result<GrantOutcome> {
        let request = GrantRequest::Multifactor {
            code: code.to_string(),
            remember_device: true,
        };

        debug!("Submitting multi-factor grant");
        self.put_grant(cookies, &request).await
    }

    async fn put_grant(&self, mut cookies: AuthCookies, request: &GrantRequest) -> Result<GrantOutcome> {
        let response = with_cookies(
            self.http.put(self.config.endpoints.authorize.clone()),
            &cookies,
        )
        .json(request)
        .send()
        .await?;

        if !response.status().is_success() {
            return Err(AuthError::from_response(response).await);
        }

        cookies.absorb(response.headers());
        let body: AuthResponse = serde_json::from_slice(&response.bytes().await?)?;

        match (body.kind.as_str(), body.error.as_deref()) {
            ("response", _) => {
                let uri = body.redirect_uri().ok_or(AuthError::NoToken)?;
                let grant = extract_tokens(uri)?;
                Ok(GrantOutcome::Authorized { grant, cookies })
            }
            ("multifactor", None) => Ok(GrantOutcome::Multifactor {
                email: body.multifactor.and_then(|m| m.email),
                cookies,
            }),
            ("multifactor", Some(error)) => {
                debug!(error, "Multi-factor code rejected");
                Err(AuthError::InvalidCode)
            }
            ("auth", Some("auth_failure")) => Err(AuthError::InvalidCredentials),
            (kind, error) => {
                warn!(kind, error, "Unexpected authorization response");
                Err(AuthError::InvalidResponse(format!(
                    "unexpected authorization response '{}' ({})",
                    kind,
                    error.unwrap_or("no error")
                )))
            }
        }
    }

    /// Obtain fresh tokens using the long-lived session cookie
    ///
    /// Returns the grant and the session cookie to keep, which is the
    /// rotated one if the provider issued a replacement.
    #[instrument(skip(self, session_cookie))]
    pub async fn silent_reauth(&self, session_cookie: &str) -> Result<(TokenGrant, String)> {
        let mut url = self.config.endpoints.silent_authorize.clone();
        url.query_pairs_mut()
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("client_id", &self.config.client_id)
            .append_pair("response_type", &self.config.response_type)
            .append_pair("nonce", &self.config.nonce)
            .append_pair("scope", SILENT_SCOPE);

        let mut cookies = AuthCookies::new();
        cookies.insert(SESSION_COOKIE_NAME, session_cookie);

        debug!("Renewing tokens with session cookie");
        let response = with_cookies(self.http.get(url), &cookies).send().await?;
        let status = response.status();
        cookies.absorb(response.headers());

        let grant = if status.is_redirection() {
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .ok_or(AuthError::NoToken)?;
            extract_tokens(location)?
        } else if status.is_success() {
            let body: AuthResponse = serde_json::from_slice(&response.bytes().await?)?;
            extract_tokens(body.redirect_uri().ok_or(AuthError::NoToken)?)?
        } else {
            return Err(AuthError::from_response(response).await);
        };

        let session_cookie = cookies
            .session_cookie()
            .unwrap_or(session_cookie)
            .to_string();
        Ok((grant, session_cookie))
    }

    /// Exchange an access token for an entitlement token
    #[instrument(skip(self, access_token))]
    pub async fn fetch_entitlement(&self, access_token: &str) -> Result<String> {
        debug!("Fetching entitlement token");
        let response = self
            .http
            .post(self.config.endpoints.entitlement.clone())
            .header(AUTHORIZATION, format!("Bearer {}", access_token))
            .json(&serde_json::json!({}))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AuthError::from_response(response).await);
        }

        let body: EntitlementResponse = serde_json::from_slice(&response.bytes().await?)?;
        Ok(body.entitlements_token)
    }

    /// Look up the account behind an access token
    #[instrument(skip(self, access_token))]
    pub async fn fetch_user_info(&self, access_token: &str) -> Result<UserInfo> {
        debug!("Fetching user info");
        let response = self
            .http
            .get(self.config.endpoints.userinfo.clone())
            .header(AUTHORIZATION, format!("Bearer {}", access_token))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AuthError::from_response(response).await);
        }

        Ok(serde_json::from_slice(&response.bytes().await?)?)
    }
}

fn with_cookies(request: RequestBuilder, cookies: &AuthCookies) -> RequestBuilder {
    match cookies.header_value() {
        Some(value) => request.header(COOKIE, value),
        None => request,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use url::Url;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const REDIRECT: &str = "https://playvalorant.com/opt_in#access_token=AAA&scope=openid&id_token=BBB&token_type=Bearer&expires_in=3600";

    fn client(server: &MockServer) -> AuthClient {
        let base = Url::parse(&server.uri()).unwrap();
        AuthClient::new(AuthConfig::with_base_url(&base).unwrap()).unwrap()
    }

    fn bootstrap_cookies() -> AuthCookies {
        let mut cookies = AuthCookies::new();
        cookies.insert("asid", "bootstrap");
        cookies
    }

    #[tokio::test]
    async fn test_acquire_cookies_collects_set_cookie_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/authorization"))
            .and(body_partial_json(json!({
                "client_id": "play-valorant-web-prod",
                "nonce": "1",
                "redirect_uri": "https://playvalorant.com/opt_in",
                "response_type": "token id_token"
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"type": "auth", "country": "usa"}))
                    .append_header("set-cookie", "asid=bootstrap; Path=/; HttpOnly")
                    .append_header("set-cookie", "clid=uw1; Path=/"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let cookies = client(&server).acquire_cookies().await.unwrap();

        assert_eq!(cookies.get("asid"), Some("bootstrap"));
        assert_eq!(cookies.get("clid"), Some("uw1"));
    }

    #[tokio::test]
    async fn test_password_grant_returns_tokens_and_session_cookie() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/v1/authorization"))
            .and(header("cookie", "asid=bootstrap"))
            .and(body_partial_json(json!({"type": "auth", "username": "a", "password": "p"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({
                        "type": "response",
                        "response": {"mode": "fragment", "parameters": {"uri": REDIRECT}}
                    }))
                    .append_header("set-cookie", "ssid=long-lived; Path=/; HttpOnly"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let outcome = client(&server)
            .submit_password(bootstrap_cookies(), "a", "p")
            .await
            .unwrap();

        match outcome {
            GrantOutcome::Authorized { grant, cookies } => {
                assert_eq!(grant.access_token, "AAA");
                assert_eq!(grant.expires_in, 3600);
                assert_eq!(cookies.session_cookie(), Some("long-lived"));
            }
            other => panic!("Expected Authorized, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_password_grant_surfaces_multifactor_challenge() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/v1/authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "type": "multifactor",
                "multifactor": {"email": "a***@example.com", "method": "email"}
            })))
            .mount(&server)
            .await;

        let outcome = client(&server)
            .submit_password(bootstrap_cookies(), "a", "p")
            .await
            .unwrap();

        match outcome {
            GrantOutcome::Multifactor { email, cookies } => {
                assert_eq!(email.as_deref(), Some("a***@example.com"));
                assert_eq!(cookies.get("asid"), Some("bootstrap"));
            }
            other => panic!("Expected Multifactor, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rejected_password_is_invalid_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/v1/authorization"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"type": "auth", "error": "auth_failure"})),
            )
            .mount(&server)
            .await;

        let result = client(&server)
            .submit_password(bootstrap_cookies(), "a", "wrong")
            .await;

        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_rejected_code_is_invalid_code() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/v1/authorization"))
            .and(body_partial_json(json!({"type": "multifactor", "code": "000000"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "type": "multifactor",
                "error": "multifactor_attempt_failed"
            })))
            .mount(&server)
            .await;

        let result = client(&server)
            .submit_multifactor(bootstrap_cookies(), "000000")
            .await;

        assert!(matches!(result, Err(AuthError::InvalidCode)));
    }

    #[tokio::test]
    async fn test_non_success_status_is_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/v1/authorization"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let result = client(&server)
            .submit_password(bootstrap_cookies(), "a", "p")
            .await;

        match result {
            Err(AuthError::Http { status, body_snippet }) => {
                assert_eq!(status.as_u16(), 429);
                assert_eq!(body_snippet, "slow down");
            }
            other => panic!("Expected Http error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_silent_reauth_reads_redirect_location() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/authorize"))
            .and(query_param("client_id", "play-valorant-web-prod"))
            .and(header("cookie", "ssid=old-cookie"))
            .respond_with(
                ResponseTemplate::new(303)
                    .insert_header("location", REDIRECT)
                    .append_header("set-cookie", "ssid=new-cookie; Path=/"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let (grant, cookie) = client(&server).silent_reauth("old-cookie").await.unwrap();

        assert_eq!(grant.access_token, "AAA");
        assert_eq!(cookie, "new-cookie");
    }

    #[tokio::test]
    async fn test_silent_reauth_without_token_is_no_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/authorize"))
            .respond_with(
                ResponseTemplate::new(303)
                    .insert_header("location", "https://authenticate.riotgames.com/login"),
            )
            .mount(&server)
            .await;

        let result = client(&server).silent_reauth("expired-cookie").await;

        assert!(matches!(result, Err(AuthError::NoToken)));
    }

    #[tokio::test]
    async fn test_entitlement_and_user_info() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token/v1"))
            .and(header("authorization", "Bearer AAA"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"entitlements_token": "ENT"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .and(header("authorization", "Bearer AAA"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sub": "puuid-1",
                "acct": {"game_name": "Player", "tag_line": "NA1"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server);
        assert_eq!(client.fetch_entitlement("AAA").await.unwrap(), "ENT");
        assert_eq!(client.fetch_user_info("AAA").await.unwrap().sub, "puuid-1");
    }
}
