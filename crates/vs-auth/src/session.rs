use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use chrono::Duration;
use tracing::{debug, info, instrument, warn};
use vs_core::{Clock, Event, EventBus, SettingsStore, SingleFlight, keys};

use crate::client::{AuthClient, GrantOutcome};
use crate::config::SILENT_REAUTH_LIFETIME_SECS;
use crate::cookies::AuthCookies;
use crate::credential::{Credential, StoredCredentials};
use crate::errors::{AuthError, Result};
use crate::store::CredentialStore;
use crate::token::TokenGrant;

/// Observable session state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    NoCredential,
    /// Bootstrap cookies acquired, password grant in progress
    AwaitingPassword,
    /// The provider sent a verification code to `email`
    AwaitingMultifactor { email: Option<String> },
    Authenticated,
    /// A credential is held but past its expiry
    Expired,
    RenewalInFlight,
}

/// Result of a login step that did not fail
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    Authenticated(Credential),
    /// Submit the code with [`SessionManager::submit_mfa`]
    NeedsMultifactor { email: Option<String> },
}

/// Work that must finish before [`SessionManager::logout`] returns
///
/// Hooks run after the credential is erased and before
/// [`Event::LoggedOut`] is published.
#[async_trait::async_trait]
pub trait LogoutHook: Send + Sync {
    async fn on_logout(&self);
}

/// Transient step of an interactive or renewal flow
#[derive(Debug, Clone, Default)]
enum Phase {
    #[default]
    Idle,
    AwaitingPassword,
    AwaitingMultifactor {
        email: Option<String>,
        cookies: AuthCookies,
    },
    Renewing,
}

/// Single source of truth for whether a usable credential exists
///
/// Interactive login and MFA go through [`AuthClient`]; renewals use the
/// stored session cookie and are collapsed by a [`SingleFlight`] gate so
/// concurrent callers share one silent re-auth. Every logout bumps an
/// epoch, and a credential produced by a flow that started before the
/// bump is discarded instead of written.
pub struct SessionManager {
    client: AuthClient,
    store: Arc<dyn CredentialStore>,
    settings: Arc<SettingsStore>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    renewal: SingleFlight<Option<Credential>>,
    epoch: AtomicU64,
    /// Serializes credential commits against logout
    write_lock: tokio::sync::Mutex<()>,
    current: RwLock<Option<StoredCredentials>>,
    phase: Mutex<Phase>,
    logout_hooks: Mutex<Vec<Weak<dyn LogoutHook>>>,
}

impl SessionManager {
    pub fn new(
        client: AuthClient,
        store: Arc<dyn CredentialStore>,
        settings: Arc<SettingsStore>,
        clock: Arc<dyn Clock>,
        events: EventBus,
    ) -> Self {
        Self {
            client,
            store,
            settings,
            clock,
            events,
            renewal: SingleFlight::new(),
            epoch: AtomicU64::new(0),
            write_lock: tokio::sync::Mutex::new(()),
            current: RwLock::new(None),
            phase: Mutex::new(Phase::Idle),
            logout_hooks: Mutex::new(Vec::new()),
        }
    }

    /// Register a hook run on every logout; dropped hooks are pruned
    pub fn on_logout(&self, hook: Weak<dyn LogoutHook>) {
        self.logout_hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(hook);
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Logout counter; results of flows started under an older epoch are dropped
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> SessionState {
        match &*self.phase() {
            Phase::AwaitingPassword => return SessionState::AwaitingPassword,
            Phase::AwaitingMultifactor { email, .. } => {
                return SessionState::AwaitingMultifactor {
                    email: email.clone(),
                };
            }
            Phase::Renewing => return SessionState::RenewalInFlight,
            Phase::Idle => {}
        }

        match self.current_credential() {
            Some(credential) if credential.is_valid_at(self.clock.now()) => {
                SessionState::Authenticated
            }
            Some(_) => SessionState::Expired,
            None => SessionState::NoCredential,
        }
    }

    /// Load persisted credentials, typically once at startup
    #[instrument(skip(self))]
    pub async fn restore(&self) -> SessionState {
        let stored = self.store.load().await;
        debug!(found = stored.is_some(), "Restored persisted credentials");
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = stored;
        self.state()
    }

    /// Interactive login with username and password
    #[instrument(skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginOutcome> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(AuthError::InvalidInput("username and password are required"));
        }

        let epoch = self.epoch();
        self.set_phase(Phase::AwaitingPassword);

        let grant = async {
            let cookies = self.client.acquire_cookies().await?;
            self.client.submit_password(cookies, username, password).await
        }
        .await;

        match grant {
            Ok(outcome) => self.handle_grant(outcome, epoch).await,
            Err(e) => {
                debug!("Password login failed: {}", e);
                self.set_phase(Phase::Idle);
                Err(e)
            }
        }
    }

    /// Answer a pending multi-factor challenge
    ///
    /// A rejected code leaves the challenge pending so the user can retry.
    #[instrument(skip(self, code))]
    pub async fn submit_mfa(&self, code: &str) -> Result<LoginOutcome> {
        let cookies = match &*self.phase() {
            Phase::AwaitingMultifactor { cookies, .. } => cookies.clone(),
            _ => return Err(AuthError::InvalidState("no multi-factor challenge is pending")),
        };
        if code.trim().is_empty() {
            return Err(AuthError::InvalidInput("verification code is required"));
        }

        let epoch = self.epoch();
        let outcome = self.client.submit_multifactor(cookies, code.trim()).await?;
        self.handle_grant(outcome, epoch).await
    }

    /// Credential for resource fetches, renewing it silently when expired
    ///
    /// Returns [`AuthError::NoToken`] when interactive login is needed.
    pub async fn get_valid_credential(&self) -> Result<Credential> {
        if let Some(credential) = self.valid_credential() {
            return Ok(credential);
        }

        let epoch = self.epoch();
        self.renewal
            .run(keys::TOKEN_RENEWAL, move || self.renew(epoch))
            .await
            .ok_or(AuthError::NoToken)
    }

    /// Erase the credential and session cookie
    ///
    /// In-flight renewals resolve with [`AuthError::NoToken`] and their
    /// results are never written.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<()> {
        let cleared = {
            let _guard = self.write_lock.lock().await;
            self.epoch.fetch_add(1, Ordering::SeqCst);
            self.renewal.resolve(keys::TOKEN_RENEWAL, None);
            *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;
            self.set_phase(Phase::Idle);
            self.store.clear().await
        };

        if let Err(e) = self
            .settings
            .update(|s| {
                s.is_logged_in = false;
                s.token_expiry = None;
            })
            .await
        {
            warn!("Failed to record logout in settings: {}", e);
        }

        let hooks: Vec<Arc<dyn LogoutHook>> = {
            let mut registered = self
                .logout_hooks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            registered.retain(|hook| hook.strong_count() > 0);
            registered.iter().filter_map(Weak::upgrade).collect()
        };
        for hook in hooks {
            hook.on_logout().await;
        }

        info!("Logged out");
        self.events.publish(Event::LoggedOut);
        cleared
    }

    async fn handle_grant(&self, outcome: GrantOutcome, epoch: u64) -> Result<LoginOutcome> {
        match outcome {
            GrantOutcome::Multifactor { email, cookies } => {
                info!("Multi-factor verification required");
                self.set_phase(Phase::AwaitingMultifactor {
                    email: email.clone(),
                    cookies,
                });
                Ok(LoginOutcome::NeedsMultifactor { email })
            }
            GrantOutcome::Authorized { grant, cookies } => {
                let lifetime = grant.expires_in;
                let session_cookie = cookies.session_cookie().map(str::to_string);
                if session_cookie.is_none() {
                    warn!("Provider did not issue a session cookie; silent renewal will be unavailable");
                }

                let completed = self.complete(grant, session_cookie, lifetime, epoch).await;
                self.set_phase(Phase::Idle);
                let credential = completed?;

                self.record_expiry(&credential, true).await;
                info!(puuid = %credential.puuid, "Logged in");
                self.events.publish(Event::LoggedIn);
                Ok(LoginOutcome::Authenticated(credential))
            }
        }
    }

    /// Leader side of the renewal gate; `None` means renewal is impossible
    async fn renew(&self, epoch: u64) -> Option<Credential> {
        // Another flight may have finished between the caller's check and now
        if let Some(credential) = self.valid_credential() {
            return Some(credential);
        }

        let cookie = match self.session_cookie().await {
            Some(cookie) => cookie,
            None => {
                warn!("Credential renewal impossible: no session cookie stored");
                self.expire(epoch);
                return None;
            }
        };

        let entered = self.enter_renewal();
        let renewed = self.silent_renew(&cookie, epoch).await;
        if entered {
            self.leave_renewal();
        }

        match renewed {
            Ok(credential) => {
                info!(expires_at = %credential.expires_at, "Credential renewed");
                self.record_expiry(&credential, false).await;
                Some(credential)
            }
            Err(e) => {
                warn!(error = %e, "Credential renewal failed");
                self.expire(epoch);
                None
            }
        }
    }

    #[instrument(skip_all)]
    async fn silent_renew(&self, session_cookie: &str, epoch: u64) -> Result<Credential> {
        let (grant, session_cookie) = self.client.silent_reauth(session_cookie).await?;
        self.complete(grant, Some(session_cookie), SILENT_REAUTH_LIFETIME_SECS, epoch)
            .await
    }

    /// Exchange a token grant for a full credential and commit it
    async fn complete(
        &self,
        grant: TokenGrant,
        session_cookie: Option<String>,
        lifetime_secs: i64,
        epoch: u64,
    ) -> Result<Credential> {
        let entitlement_token = self.client.fetch_entitlement(&grant.access_token).await?;
        let user = self.client.fetch_user_info(&grant.access_token).await?;

        let expires_at = Duration::try_seconds(lifetime_secs)
            .and_then(|lifetime| self.clock.now().checked_add_signed(lifetime))
            .ok_or_else(|| {
                AuthError::InvalidResponse(format!("token lifetime out of range: {}s", lifetime_secs))
            })?;

        let credential = Credential {
            access_token: grant.access_token,
            entitlement_token,
            puuid: user.sub,
            expires_at,
        };

        self.commit(
            StoredCredentials {
                credential: credential.clone(),
                session_cookie,
            },
            epoch,
        )
        .await?;

        Ok(credential)
    }

    async fn commit(&self, stored: StoredCredentials, epoch: u64) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if self.epoch() != epoch {
            warn!("Discarding credential obtained before logout");
            return Err(AuthError::NoToken);
        }

        self.store.save(&stored).await?;
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(stored);
        Ok(())
    }

    async fn record_expiry(&self, credential: &Credential, logged_in: bool) {
        let expiry = credential.expires_at;
        if let Err(e) = self
            .settings
            .update(|s| {
                s.token_expiry = Some(expiry);
                if logged_in {
                    s.is_logged_in = true;
                }
            })
            .await
        {
            warn!("Failed to record token expiry in settings: {}", e);
        }
    }

    /// Drop the in-memory credential after a failed renewal
    ///
    /// The persisted cookie is kept so a later call can retry once the
    /// provider is reachable again.
    fn expire(&self, epoch: u64) {
        if self.epoch() != epoch {
            return;
        }
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;
        self.events.publish(Event::SessionExpired);
    }

    async fn session_cookie(&self) -> Option<String> {
        let in_memory = self
            .current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(|stored| stored.session_cookie.clone());
        match in_memory {
            Some(cookie) => Some(cookie),
            None => self.store.load().await.and_then(|stored| stored.session_cookie),
        }
    }

    fn current_credential(&self) -> Option<Credential> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|stored| stored.credential.clone())
    }

    fn valid_credential(&self) -> Option<Credential> {
        self.current_credential()
            .filter(|credential| credential.is_valid_at(self.clock.now()))
    }

    fn phase(&self) -> std::sync::MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, phase: Phase) {
        *self.phase() = phase;
    }

    /// Mark a renewal unless an interactive step owns the phase
    fn enter_renewal(&self) -> bool {
        let mut phase = self.phase();
        if matches!(*phase, Phase::Idle) {
            *phase = Phase::Renewing;
            true
        } else {
            false
        }
    }

    fn leave_renewal(&self) {
        let mut phase = self.phase();
        if matches!(*phase, Phase::Renewing) {
            *phase = Phase::Idle;
        }
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("state", &self.state())
            .field("epoch", &self.epoch())
            .finish_non_exhaustive()
    }
}
