use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock, Weak};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, trace, warn};
use vs_auth::{Credential, LogoutHook, SessionManager};
use vs_core::{ClientVersion, Clock, Event, EventBus, ResourceKind, SettingsStore, SingleFlight, keys};

use crate::cache::{AnyResourceCache, CacheDecision, RefetchReason, ResourceCache, RotationWindow, Snapshot};
use crate::client::StoreClient;
use crate::documents::DocumentStore;
use crate::errors::{Result, StoreError};
use crate::models::*;
use crate::scheduler::{RotationSource, RotationWindows};
use crate::views::*;

/// Outcome of comparing the recorded client build with the live one
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionCheck {
    UpToDate,
    /// Reference data may no longer match the storefront; call
    /// [`SyncEngine::acknowledge_update`] before syncing again
    UpdateRequired {
        current: ClientVersion,
        latest: ClientVersion,
    },
}

#[derive(Debug, Clone)]
struct ReferenceData {
    catalog: Arc<Snapshot<Vec<CatalogEntry>>>,
    prices: Arc<Snapshot<Vec<PriceEntry>>>,
}

impl ReferenceData {
    fn catalog(&self) -> Catalog<'_> {
        Catalog::new(&self.catalog.payload, &self.prices.payload)
    }
}

#[derive(Debug, Default)]
struct Assembled {
    skins: Option<SkinRotationView>,
    bundles: Option<BundleRotationView>,
}

type Gate<T> = SingleFlight<Result<Arc<Snapshot<T>>>>;

/// Pulls storefront resources through the session and the caches
///
/// Every operation first asks the session for a valid credential, so a
/// missing login short-circuits with [`StoreError::NoToken`] before any
/// cache or network access. The engine registers itself as a logout hook
/// on its session, so account data is gone by the time a logout returns.
pub struct SyncEngine {
    session: Arc<SessionManager>,
    client: StoreClient,
    settings: Arc<SettingsStore>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    wallet: ResourceCache<Wallet>,
    identity: ResourceCache<PlayerIdentity>,
    skins: ResourceCache<SkinRotation>,
    bundles: ResourceCache<BundleRotation>,
    catalog: ResourceCache<Vec<CatalogEntry>>,
    prices: ResourceCache<Vec<PriceEntry>>,
    owned: ResourceCache<OwnedItems>,
    skin_gate: Gate<SkinRotation>,
    bundle_gate: Gate<BundleRotation>,
    reference_gate: SingleFlight<Result<ReferenceData>>,
    /// Serializes snapshot commits against logout
    commit_lock: tokio::sync::Mutex<()>,
    assembled: RwLock<Assembled>,
}

impl SyncEngine {
    pub fn new(
        session: Arc<SessionManager>,
        client: StoreClient,
        settings: Arc<SettingsStore>,
        documents: Arc<dyn DocumentStore>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|engine: &Weak<Self>| {
            let hook: Weak<dyn LogoutHook> = engine.clone();
            session.on_logout(hook);

            Self {
                clock: session.clock(),
                events: session.events().clone(),
                session,
                client,
                settings,
                wallet: ResourceCache::new(ResourceKind::Wallet, Arc::clone(&documents)),
                identity: ResourceCache::new(ResourceKind::PlayerIdentity, Arc::clone(&documents)),
                skins: ResourceCache::new(ResourceKind::SkinRotation, Arc::clone(&documents)),
                bundles: ResourceCache::new(ResourceKind::BundleRotations, Arc::clone(&documents)),
                catalog: ResourceCache::new(ResourceKind::Catalog, Arc::clone(&documents)),
                prices: ResourceCache::new(ResourceKind::Prices, Arc::clone(&documents)),
                owned: ResourceCache::new(ResourceKind::OwnedItems, documents),
                skin_gate: SingleFlight::new(),
                bundle_gate: SingleFlight::new(),
                reference_gate: SingleFlight::new(),
                commit_lock: tokio::sync::Mutex::new(()),
                assembled: RwLock::new(Assembled::default()),
            }
        })
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Reload persisted snapshots and rebuild the assembled views
    #[instrument(skip(self))]
    pub async fn restore(&self) {
        let settings = self.settings.get().await;
        self.client.set_client_version(settings.client_version.as_ref());

        let mut restored = 0;
        for cache in self.caches() {
            restored += usize::from(cache.restore().await);
        }

        if let (Some(catalog), Some(prices)) = (self.catalog.snapshot(), self.prices.snapshot()) {
            let reference = ReferenceData { catalog, prices };
            let mut assembled = self.assembled();
            assembled.skins = self
                .skins
                .snapshot()
                .map(|snapshot| skin_view(&reference, &snapshot));
            assembled.bundles = self
                .bundles
                .snapshot()
                .map(|snapshot| bundle_view(&reference, &snapshot));
        }

        debug!(restored, "Restored cached snapshots");
    }

    #[instrument(skip(self))]
    pub async fn get_wallet(&self, force: bool) -> Result<Wallet> {
        let epoch = self.session.epoch();
        let credential = self.session.get_valid_credential().await?;
        let client = &self.client;

        let snapshot = self
            .load(&self.wallet, force, epoch, move || async move {
                client.fetch_wallet(&credential).await.map(|wallet| (wallet, Vec::new()))
            })
            .await?;
        Ok(snapshot.payload.clone())
    }

    #[instrument(skip(self))]
    pub async fn get_player_identity(&self, force: bool) -> Result<PlayerIdentity> {
        let epoch = self.session.epoch();
        let credential = self.session.get_valid_credential().await?;
        let client = &self.client;

        let snapshot = self
            .load(&self.identity, force, epoch, move || async move {
                client
                    .fetch_player_identity(&credential)
                    .await
                    .map(|identity| (identity, Vec::new()))
            })
            .await?;
        Ok(snapshot.payload.clone())
    }

    /// Daily skin offers joined with catalog and prices
    #[instrument(skip(self))]
    pub async fn get_skin_rotation(&self, force: bool) -> Result<SkinRotationView> {
        let epoch = self.session.epoch();
        let credential = self.session.get_valid_credential().await?;
        let reference = self.reference(&credential, epoch).await?;

        let snapshot = self
            .skin_gate
            .run(keys::SKIN_SYNC, move || {
                self.load(&self.skins, force, epoch, move || async move {
                    self.fetch_skins(&credential).await
                })
            })
            .await?;

        let view = skin_view(&reference, &snapshot);
        self.assembled().skins = Some(view.clone());
        Ok(view)
    }

    /// Featured bundles, each with its own deadline, joined with catalog and prices
    #[instrument(skip(self))]
    pub async fn get_bundle_rotations(&self, force: bool) -> Result<BundleRotationView> {
        let epoch = self.session.epoch();
        let credential = self.session.get_valid_credential().await?;
        let reference = self.reference(&credential, epoch).await?;

        let snapshot = self
            .bundle_gate
            .run(keys::BUNDLE_SYNC, move || {
                self.load(&self.bundles, force, epoch, move || async move {
                    self.fetch_bundles(&credential).await
                })
            })
            .await?;

        let view = bundle_view(&reference, &snapshot);
        self.assembled().bundles = Some(view.clone());
        Ok(view)
    }

    /// Owned skins; always refetched since purchases happen outside the app
    #[instrument(skip(self))]
    pub async fn get_owned_items(&self) -> Result<OwnedItemsView> {
        let epoch = self.session.epoch();
        let credential = self.session.get_valid_credential().await?;
        let reference = self.reference(&credential, epoch).await?;
        let client = &self.client;

        let snapshot = self
            .load(&self.owned, true, epoch, move || async move {
                client
                    .fetch_owned_items(&credential)
                    .await
                    .map(|owned| (owned, Vec::new()))
            })
            .await?;

        Ok(OwnedItemsView {
            offers: reference.catalog().assemble(&snapshot.payload.item_ids),
        })
    }

    /// Compare the recorded client build with the live one
    ///
    /// The first check on a fresh install records the live build and
    /// reports [`VersionCheck::UpToDate`].
    #[instrument(skip(self))]
    pub async fn check_version(&self) -> Result<VersionCheck> {
        self.session.get_valid_credential().await?;

        let latest = self.client.fetch_version().await?;
        let recorded = self.settings.get().await.client_version;
        let now = self.clock.now();

        let check = match recorded {
            Some(current) if current != latest => {
                info!(
                    current = %current.riot_client_version,
                    latest = %latest.riot_client_version,
                    "Client update required"
                );
                VersionCheck::UpdateRequired {
                    current,
                    latest: latest.clone(),
                }
            }
            Some(_) => VersionCheck::UpToDate,
            None => {
                debug!(version = %latest.riot_client_version, "Recording client version");
                VersionCheck::UpToDate
            }
        };

        let record = check == VersionCheck::UpToDate;
        self.settings
            .update(|s| {
                s.last_update_check = Some(now);
                if record {
                    s.client_version = Some(latest.clone());
                }
            })
            .await?;

        if record {
            self.client.set_client_version(Some(&latest));
        }
        Ok(check)
    }

    /// Adopt a new client build and drop the reference data tied to the old one
    #[instrument(skip(self))]
    pub async fn acknowledge_update(&self, version: ClientVersion) -> Result<()> {
        self.client.set_client_version(Some(&version));
        self.settings
            .update(|s| s.client_version = Some(version))
            .await?;

        let _guard = self.commit_lock.lock().await;
        self.catalog.invalidate().await;
        self.prices.invalidate().await;
        *self.assembled() = Assembled::default();
        info!("Acknowledged client update, reference data will be refetched");
        Ok(())
    }

    /// Version check, then identity, wallet, skins and bundles in order
    ///
    /// Stops before any store fetch when an update is required.
    #[instrument(skip(self))]
    pub async fn sync_all(&self, force: bool) -> Result<VersionCheck> {
        let check = self.check_version().await?;
        if check != VersionCheck::UpToDate {
            return Ok(check);
        }

        self.get_player_identity(force).await?;
        self.get_wallet(force).await?;
        self.get_skin_rotation(force).await?;
        self.get_bundle_rotations(force).await?;

        if let Err(e) = self.settings.update(|s| s.is_data_downloaded = true).await {
            warn!("Failed to record completed download: {}", e);
        }

        info!("Full sync completed");
        self.events.publish(Event::FullSyncCompleted);
        Ok(check)
    }

    /// Log out and drop every account-scoped snapshot and assembled view
    ///
    /// Catalog and prices are kept; they are revalidated by version check.
    /// Logging out through the session directly has the same effect.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<()> {
        self.session
            .logout()
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to clear credentials: {}", e)))
    }

    pub fn assembled_skins(&self) -> Option<SkinRotationView> {
        self.assembled().skins.clone()
    }

    pub fn assembled_bundles(&self) -> Option<BundleRotationView> {
        self.assembled().bundles.clone()
    }

    async fn clear_account_data(&self) {
        let _guard = self.commit_lock.lock().await;

        self.skin_gate.resolve(keys::SKIN_SYNC, Err(StoreError::NoToken));
        self.bundle_gate.resolve(keys::BUNDLE_SYNC, Err(StoreError::NoToken));

        for cache in self.caches() {
            if cache.kind().is_account_scoped() {
                cache.invalidate().await;
            }
        }
        *self.assembled() = Assembled::default();

        if let Err(e) = self.settings.update(|s| s.is_data_downloaded = false).await {
            warn!("Failed to reset download flag: {}", e);
        }
        debug!("Dropped account data");
    }

    fn caches(&self) -> [&dyn AnyResourceCache; 7] {
        [
            &self.wallet,
            &self.identity,
            &self.skins,
            &self.bundles,
            &self.catalog,
            &self.prices,
            &self.owned,
        ]
    }

    /// Catalog and prices, fetched once and kept until a client update
    async fn reference(&self, credential: &Credential, epoch: u64) -> Result<ReferenceData> {
        if let (Some(catalog), Some(prices)) = (self.catalog.snapshot(), self.prices.snapshot()) {
            return Ok(ReferenceData { catalog, prices });
        }

        self.reference_gate
            .run(keys::REFERENCE_SYNC, move || self.load_reference(credential, epoch))
            .await
    }

    async fn load_reference(&self, credential: &Credential, epoch: u64) -> Result<ReferenceData> {
        let client = &self.client;
        let catalog = self
            .load(&self.catalog, false, epoch, move || async move {
                client.fetch_catalog().await.map(|catalog| (catalog, Vec::new()))
            })
            .await?;
        let prices = self
            .load(&self.prices, false, epoch, move || async move {
                client
                    .fetch_prices(credential)
                    .await
                    .map(|prices| (prices, Vec::new()))
            })
            .await?;
        Ok(ReferenceData { catalog, prices })
    }

    async fn fetch_skins(&self, credential: &Credential) -> Result<(SkinRotation, Vec<RotationWindow>)> {
        let storefront = self
            .client
            .fetch_storefront(credential, self.clock.now())
            .await?;
        let window = RotationWindow::new(storefront.skins_renewal_at);
        Ok((storefront.skins, vec![window]))
    }

    async fn fetch_bundles(
        &self,
        credential: &Credential,
    ) -> Result<(BundleRotation, Vec<RotationWindow>)> {
        let storefront = self
            .client
            .fetch_storefront(credential, self.clock.now())
            .await?;
        let mut windows: Vec<RotationWindow> = storefront
            .bundles
            .bundles
            .iter()
            .map(|bundle| RotationWindow::new(bundle.renewal_at))
            .collect();
        // Nothing featured: look again when the daily rotation turns over
        if windows.is_empty() {
            windows.push(RotationWindow::new(storefront.skins_renewal_at));
        }
        Ok((storefront.bundles, windows))
    }

    /// Serve from `cache` or run `fetch` and replace the snapshot
    ///
    /// A failed fetch leaves the previous snapshot in place.
    async fn load<T, F, Fut>(
        &self,
        cache: &ResourceCache<T>,
        force: bool,
        epoch: u64,
        fetch: F,
    ) -> Result<Arc<Snapshot<T>>>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(T, Vec<RotationWindow>)>>,
    {
        let kind = cache.kind();
        let reason = match cache.decide(force, self.clock.now()) {
            CacheDecision::Serve(snapshot) => {
                trace!(%kind, "Serving cached snapshot");
                return Ok(snapshot);
            }
            CacheDecision::Refetch(reason) => reason,
        };

        debug!(%kind, ?reason, "Refetching");
        let fetched_at = self.clock.now();
        let (payload, windows) = fetch().await.map_err(|e| {
            if cache.snapshot().is_some() {
                warn!(%kind, "Refetch failed, keeping previous snapshot: {}", e);
            }
            e.during(kind)
        })?;

        let _guard = self.commit_lock.lock().await;
        if self.session.epoch() != epoch {
            warn!(%kind, "Discarding snapshot fetched before logout");
            return Err(StoreError::NoToken);
        }

        let snapshot = cache
            .replace(Snapshot::new(payload, windows, fetched_at))
            .await;
        self.events.publish(Event::SyncCompleted {
            kind,
            forced: reason == RefetchReason::Forced,
        });
        Ok(snapshot)
    }

    fn assembled(&self) -> std::sync::RwLockWriteGuard<'_, Assembled> {
        self.assembled.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn skin_view(reference: &ReferenceData, snapshot: &Snapshot<SkinRotation>) -> SkinRotationView {
    SkinRotationView {
        offers: reference.catalog().assemble(&snapshot.payload.item_ids),
        renewal_at: snapshot.next_renewal(),
    }
}

fn bundle_view(reference: &ReferenceData, snapshot: &Snapshot<BundleRotation>) -> BundleRotationView {
    let catalog = reference.catalog();
    BundleRotationView {
        bundles: snapshot
            .payload
            .bundles
            .iter()
            .map(|bundle| catalog.bundle(bundle))
            .collect(),
    }
}

#[async_trait::async_trait]
impl RotationSource for SyncEngine {
    fn rotation_windows(&self) -> RotationWindows {
        RotationWindows {
            skins: self
                .skins
                .snapshot()
                .and_then(|snapshot| snapshot.windows.first().copied()),
            bundles: self
                .bundles
                .snapshot()
                .map(|snapshot| {
                    snapshot
                        .payload
                        .bundles
                        .iter()
                        .map(|bundle| (bundle.id.clone(), RotationWindow::new(bundle.renewal_at)))
                        .collect()
                })
                .unwrap_or_default(),
            bundles_refresh: self
                .bundles
                .snapshot()
                .and_then(|snapshot| snapshot.next_renewal())
                .map(RotationWindow::new),
        }
    }

    async fn refresh(&self, kind: ResourceKind) -> Result<()> {
        match kind {
            ResourceKind::SkinRotation => self.get_skin_rotation(false).await.map(|_| ()),
            ResourceKind::BundleRotations => self.get_bundle_rotations(false).await.map(|_| ()),
            other => {
                debug!(kind = %other, "No rotation to refresh");
                Ok(())
            }
        }
    }
}

#[async_trait::async_trait]
impl LogoutHook for SyncEngine {
    async fn on_logout(&self) {
        self.clear_account_data().await;
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("session", &self.session)
            .field("skins", &self.skins)
            .field("bundles", &self.bundles)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::documents::MemoryDocumentStore;
    use chrono::{DateTime, Duration, Utc};
    use serde_json::{Value, json};
    use url::Url;
    use vs_auth::{AuthClient, AuthConfig, LoginOutcome, MemoryCredentialStore};
    use vs_core::ManualClock;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PUUID: &str = "puuid-1";
    const VP: &str = "85ad13f7-3d1b-5128-9eb2-7cd8ee0b5741";

    struct Harness {
        server: MockServer,
        engine: Arc<SyncEngine>,
        settings: Arc<SettingsStore>,
        documents: MemoryDocumentStore,
        clock: ManualClock,
    }

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_800_000_000, 0).unwrap()
    }

    async fn harness() -> Harness {
        let server = MockServer::start().await;
        let base = Url::parse(&server.uri()).unwrap();
        let settings = Arc::new(SettingsStore::ephemeral());
        let clock = ManualClock::new(t0());
        let documents = MemoryDocumentStore::new();

        let session = SessionManager::new(
            AuthClient::new(AuthConfig::with_base_url(&base).unwrap()).unwrap(),
            Arc::new(MemoryCredentialStore::new()),
            Arc::clone(&settings),
            Arc::new(clock.clone()),
            EventBus::default(),
        );
        let engine = SyncEngine::new(
            Arc::new(session),
            StoreClient::new(StoreConfig::with_base_urls(base.clone(), base)).unwrap(),
            Arc::clone(&settings),
            Arc::new(documents.clone()),
        );

        Harness {
            server,
            engine,
            settings,
            documents,
            clock,
        }
    }

    /// Identity endpoints for a password login issuing a week-long token
    async fn mount_login(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/api/v1/authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"type": "auth"})))
            .mount(server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/api/v1/authorization"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({
                        "type": "response",
                        "response": {"parameters": {"uri":
                            "https://playvalorant.com/opt_in#access_token=AAA&id_token=BBB&expires_in=604800"}}
                    }))
                    .append_header("set-cookie", "ssid=cookie; Path=/"),
            )
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/token/v1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"entitlements_token": "ENT"})),
            )
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"sub": PUUID})))
            .mount(server)
            .await;
    }

    fn catalog_body(first_levels: &[&str]) -> Value {
        let skins: Vec<Value> = first_levels
            .iter()
            .map(|level| {
                json!({
                    "uuid": format!("skin-{}", level),
                    "displayName": format!("Skin {}", level),
                    "levels": [{"uuid": level, "displayName": "Level 1"}]
                })
            })
            .collect();
        json!({"status": 200, "data": skins})
    }

    fn offers_body(offers: &[(&str, u64)]) -> Value {
        let offers: Vec<Value> = offers
            .iter()
            .map(|(id, cost)| json!({"OfferID": id, "Cost": {VP: cost}}))
            .collect();
        json!({"Offers": offers})
    }

    fn storefront_body(skins: &[&str], skins_secs: i64, bundles: &[(&str, i64)]) -> Value {
        let bundles: Vec<Value> = bundles
            .iter()
            .map(|(id, secs)| {
                json!({
                    "ID": id,
                    "DataAssetID": format!("asset-{}", id),
                    "Items": [{"Item": {"ItemTypeID": "t", "ItemID": "u1"}, "BasePrice": 1775, "DiscountedPrice": 1200}],
                    "DurationRemainingInSeconds": secs
                })
            })
            .collect();
        json!({
            "FeaturedBundle": {"Bundles": bundles},
            "SkinsPanelLayout": {
                "SingleItemOffers": skins,
                "SingleItemOffersRemainingDurationInSeconds": skins_secs
            }
        })
    }

    async fn mount_reference(server: &MockServer, catalog: Value, offers: Value) {
        Mock::given(method("GET"))
            .and(path("/v1/weapons/skins"))
            .respond_with(ResponseTemplate::new(200).set_body_json(catalog))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/store/v1/offers/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(offers))
            .mount(server)
            .await;
    }

    async fn mount_storefront(server: &MockServer, body: Value) {
        Mock::given(method("GET"))
            .and(path(format!("/store/v2/storefront/{}", PUUID)))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    async fn requests_to(server: &MockServer, route: &str) -> usize {
        server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|request| request.url.path() == route)
            .count()
    }

    async fn login(h: &Harness) {
        mount_login(&h.server).await;
        let outcome = h.engine.session().login("a", "p").await.unwrap();
        assert!(matches!(outcome, LoginOutcome::Authenticated(_)));
    }

    const STOREFRONT: &str = "/store/v2/storefront/puuid-1";

    #[tokio::test]
    async fn test_skin_rotation_refetches_only_when_window_elapses() {
        let h = harness().await;
        login(&h).await;
        mount_reference(
            &h.server,
            catalog_body(&["u1", "u2"]),
            offers_body(&[("u1", 1775), ("u2", 875)]),
        )
        .await;
        mount_storefront(&h.server, storefront_body(&["u1", "u2"], 1800, &[])).await;

        let first = h.engine.get_skin_rotation(false).await.unwrap();
        assert_eq!(first.offers.len(), 2);
        assert_eq!(first.renewal_at, Some(t0() + Duration::seconds(1800)));
        assert_eq!(requests_to(&h.server, STOREFRONT).await, 1);

        h.engine.get_skin_rotation(false).await.unwrap();
        assert_eq!(requests_to(&h.server, STOREFRONT).await, 1);

        h.clock.advance(Duration::seconds(1801));
        h.engine.get_skin_rotation(false).await.unwrap();
        assert_eq!(requests_to(&h.server, STOREFRONT).await, 2);

        // Reference data is never expired by time
        assert_eq!(requests_to(&h.server, "/v1/weapons/skins").await, 1);
        assert_eq!(requests_to(&h.server, "/store/v1/offers/").await, 1);
    }

    #[tokio::test]
    async fn test_bundles_are_stale_once_any_window_elapses() {
        let h = harness().await;
        login(&h).await;
        mount_reference(&h.server, catalog_body(&["u1"]), offers_body(&[("u1", 1775)])).await;
        mount_storefront(
            &h.server,
            storefront_body(&[], 86400, &[("b1", 3600), ("b2", 3 * 86400)]),
        )
        .await;

        let view = h.engine.get_bundle_rotations(false).await.unwrap();
        assert_eq!(view.bundles.len(), 2);
        assert_eq!(view.bundles[0].data_asset_id, "asset-b1");
        assert_eq!(view.bundles[0].total_discounted_price, 1200);
        assert_eq!(view.bundles[0].offers[0].cost, 1775);

        h.clock.advance(Duration::hours(2));
        h.engine.get_bundle_rotations(false).await.unwrap();

        assert_eq!(requests_to(&h.server, STOREFRONT).await, 2);
    }

    #[tokio::test]
    async fn test_unmatched_items_yield_empty_view() {
        let h = harness().await;
        login(&h).await;
        mount_reference(&h.server, catalog_body(&["u1"]), offers_body(&[("u2", 875)])).await;
        mount_storefront(&h.server, storefront_body(&["u1", "u2"], 1800, &[])).await;

        let view = h.engine.get_skin_rotation(false).await.unwrap();

        assert!(view.offers.is_empty());
    }

    #[tokio::test]
    async fn test_failed_refetch_keeps_previous_snapshot() {
        let h = harness().await;
        login(&h).await;
        mount_reference(&h.server, catalog_body(&["u1"]), offers_body(&[("u1", 1775)])).await;
        Mock::given(method("GET"))
            .and(path(STOREFRONT))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(storefront_body(&["u1"], 1800, &[])),
            )
            .up_to_n_times(1)
            .mount(&h.server)
            .await;
        Mock::given(method("GET"))
            .and(path(STOREFRONT))
            .respond_with(ResponseTemplate::new(503))
            .mount(&h.server)
            .await;

        let before = h.engine.get_skin_rotation(false).await.unwrap();

        let forced = h.engine.get_skin_rotation(true).await;
        match forced {
            Err(StoreError::SyncFailed { kind, source }) => {
                assert_eq!(kind, ResourceKind::SkinRotation);
                assert!(matches!(*source, StoreError::Http { .. }));
            }
            other => panic!("Expected SyncFailed, got {:?}", other),
        }

        let after = h.engine.get_skin_rotation(false).await.unwrap();
        assert_eq!(after, before);
        assert_eq!(requests_to(&h.server, STOREFRONT).await, 2);
    }

    #[tokio::test]
    async fn test_concurrent_skin_requests_share_one_fetch() {
        let h = harness().await;
        login(&h).await;
        mount_reference(&h.server, catalog_body(&["u1"]), offers_body(&[("u1", 1775)])).await;
        Mock::given(method("GET"))
            .and(path(STOREFRONT))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(storefront_body(&["u1"], 1800, &[]))
                    .set_delay(std::time::Duration::from_millis(200)),
            )
            .mount(&h.server)
            .await;

        let e = &h.engine;
        let (a, b, c) = tokio::join!(
            e.get_skin_rotation(false),
            e.get_skin_rotation(false),
            e.get_skin_rotation(false),
        );

        assert_eq!(a.unwrap(), b.unwrap());
        assert!(c.is_ok());
        assert_eq!(requests_to(&h.server, STOREFRONT).await, 1);
    }

    #[tokio::test]
    async fn test_missing_login_short_circuits_without_requests() {
        let h = harness().await;

        let result = h.engine.get_wallet(false).await;

        assert!(matches!(result, Err(StoreError::NoToken)));
        assert!(h.server.received_requests().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn test_wallet_is_served_until_forced() {
        let h = harness().await;
        login(&h).await;
        Mock::given(method("GET"))
            .and(path(format!("/store/v1/wallet/{}", PUUID)))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"Balances": {VP: 500}})),
            )
            .mount(&h.server)
            .await;

        assert_eq!(h.engine.get_wallet(false).await.unwrap().valorant_points, 500);
        h.clock.advance(Duration::days(3));
        h.engine.get_wallet(false).await.unwrap();
        assert_eq!(requests_to(&h.server, "/store/v1/wallet/puuid-1").await, 1);

        h.engine.get_wallet(true).await.unwrap();
        assert_eq!(requests_to(&h.server, "/store/v1/wallet/puuid-1").await, 2);
    }

    #[tokio::test]
    async fn test_owned_items_are_always_refetched() {
        let h = harness().await;
        login(&h).await;
        mount_reference(
            &h.server,
            catalog_body(&["u1", "u2"]),
            offers_body(&[("u1", 1775), ("u2", 875)]),
        )
        .await;
        let route = format!(
            "/store/v1/entitlements/{}/{}",
            PUUID,
            crate::config::SKIN_LEVEL_ITEM_TYPE
        );
        Mock::given(method("GET"))
            .and(path(route.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Entitlements": [{"ItemID": "u2"}, {"ItemID": "unknown"}]
            })))
            .mount(&h.server)
            .await;

        let owned = h.engine.get_owned_items().await.unwrap();
        h.engine.get_owned_items().await.unwrap();

        assert_eq!(owned.offers.len(), 1);
        assert_eq!(owned.offers[0].skin_uuid, "skin-u2");
        assert_eq!(requests_to(&h.server, &route).await, 2);
    }

    #[tokio::test]
    async fn test_logout_drops_account_data_but_keeps_reference() {
        let h = harness().await;
        login(&h).await;
        mount_reference(&h.server, catalog_body(&["u1"]), offers_body(&[("u1", 1775)])).await;
        mount_storefront(&h.server, storefront_body(&["u1"], 1800, &[])).await;
        h.engine.get_skin_rotation(false).await.unwrap();
        assert!(h.engine.assembled_skins().is_some());

        h.engine.logout().await.unwrap();

        assert!(h.engine.assembled_skins().is_none());
        assert!(h.engine.skins.snapshot().is_none());
        assert!(!h.documents.contains("skin_rotation"));
        assert!(h.engine.catalog.snapshot().is_some());
        assert!(h.engine.prices.snapshot().is_some());
        assert!(matches!(
            h.engine.get_skin_rotation(false).await,
            Err(StoreError::NoToken)
        ));
    }

    #[tokio::test]
    async fn test_session_logout_drops_account_data() {
        let h = harness().await;
        login(&h).await;
        mount_reference(&h.server, catalog_body(&["u1"]), offers_body(&[("u1", 1775)])).await;
        mount_storefront(&h.server, storefront_body(&["u1"], 1800, &[])).await;
        Mock::given(method("GET"))
            .and(path(format!("/store/v1/wallet/{}", PUUID)))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"Balances": {VP: 500}})),
            )
            .mount(&h.server)
            .await;
        h.engine.get_wallet(false).await.unwrap();
        h.engine.get_skin_rotation(false).await.unwrap();

        h.engine.session().logout().await.unwrap();

        assert!(h.engine.assembled_skins().is_none());
        assert!(h.engine.wallet.snapshot().is_none());
        assert!(!h.documents.contains("wallet"));
        assert!(!h.settings.get().await.is_data_downloaded);

        let outcome = h.engine.session().login("a", "p").await.unwrap();
        assert!(matches!(outcome, LoginOutcome::Authenticated(_)));
        h.engine.get_wallet(false).await.unwrap();
        assert_eq!(requests_to(&h.server, "/store/v1/wallet/puuid-1").await, 2);
    }

    #[tokio::test]
    async fn test_empty_bundle_list_goes_stale_with_the_daily_rotation() {
        let h = harness().await;
        login(&h).await;
        mount_reference(&h.server, catalog_body(&["u1"]), offers_body(&[("u1", 1775)])).await;
        mount_storefront(&h.server, storefront_body(&["u1"], 1800, &[])).await;

        let view = h.engine.get_bundle_rotations(false).await.unwrap();
        assert!(view.bundles.is_empty());
        assert_eq!(
            h.engine.rotation_windows().bundles_refresh,
            Some(RotationWindow::new(t0() + Duration::seconds(1800)))
        );
        h.engine.get_bundle_rotations(false).await.unwrap();
        assert_eq!(requests_to(&h.server, STOREFRONT).await, 1);

        h.clock.advance(Duration::seconds(1801));
        h.engine.get_bundle_rotations(false).await.unwrap();
        assert_eq!(requests_to(&h.server, STOREFRONT).await, 2);
    }

    #[tokio::test]
    async fn test_version_mismatch_requires_update_and_ack_drops_reference() {
        let h = harness().await;
        login(&h).await;
        Mock::given(method("GET"))
            .and(path("/v1/version"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": 200,
                "data": {"riotClientVersion": "release-09.00", "riotClientBuild": "1"}
            })))
            .up_to_n_times(1)
            .mount(&h.server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/version"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": 200,
                "data": {"riotClientVersion": "release-09.01", "riotClientBuild": "2"}
            })))
            .mount(&h.server)
            .await;
        mount_reference(&h.server, catalog_body(&["u1"]), offers_body(&[("u1", 1775)])).await;
        mount_storefront(&h.server, storefront_body(&["u1"], 1800, &[])).await;

        assert_eq!(h.engine.check_version().await.unwrap(), VersionCheck::UpToDate);
        h.engine.get_skin_rotation(false).await.unwrap();

        let check = h.engine.sync_all(false).await.unwrap();
        let VersionCheck::UpdateRequired { current, latest } = check else {
            panic!("Expected UpdateRequired");
        };
        assert_eq!(current.riot_client_version, "release-09.00");
        assert_eq!(latest.riot_client_version, "release-09.01");
        assert!(h.settings.get().await.last_update_check.is_some());

        h.engine.acknowledge_update(latest.clone()).await.unwrap();
        assert!(h.engine.catalog.snapshot().is_none());
        assert_eq!(h.settings.get().await.client_version, Some(latest));

        h.engine.get_skin_rotation(false).await.unwrap();
        assert_eq!(requests_to(&h.server, "/v1/weapons/skins").await, 2);
    }

    #[tokio::test]
    async fn test_sync_all_fetches_everything_and_announces_it() {
        let h = harness().await;
        login(&h).await;
        let mut events = h.engine.events().subscribe();
        Mock::given(method("GET"))
            .and(path("/v1/version"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": 200,
                "data": {"riotClientVersion": "release-09.00", "riotClientBuild": "1"}
            })))
            .mount(&h.server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/name-service/v2/players"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"Subject": PUUID, "GameName": "Player", "TagLine": "NA1"}
            ])))
            .mount(&h.server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/store/v1/wallet/{}", PUUID)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Balances": {}})))
            .mount(&h.server)
            .await;
        mount_reference(&h.server, catalog_body(&["u1"]), offers_body(&[("u1", 1775)])).await;
        mount_storefront(&h.server, storefront_body(&["u1"], 1800, &[("b1", 7200)])).await;

        let check = h.engine.sync_all(false).await.unwrap();

        assert_eq!(check, VersionCheck::UpToDate);
        assert!(h.settings.get().await.is_data_downloaded);
        assert!(h.engine.assembled_skins().is_some());
        assert!(h.engine.assembled_bundles().is_some());

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert!(seen.contains(&Event::SyncCompleted {
            kind: ResourceKind::SkinRotation,
            forced: false,
        }));
        assert_eq!(seen.last(), Some(&Event::FullSyncCompleted));
    }

    #[tokio::test]
    async fn test_restore_rebuilds_views_from_documents() {
        let h = harness().await;
        login(&h).await;
        mount_reference(&h.server, catalog_body(&["u1"]), offers_body(&[("u1", 1775)])).await;
        mount_storefront(&h.server, storefront_body(&["u1"], 1800, &[])).await;
        let fetched = h.engine.get_skin_rotation(false).await.unwrap();

        let restarted = SyncEngine::new(
            Arc::clone(h.engine.session()),
            StoreClient::new(StoreConfig::with_base_urls(
                Url::parse(&h.server.uri()).unwrap(),
                Url::parse(&h.server.uri()).unwrap(),
            ))
            .unwrap(),
            Arc::clone(&h.settings),
            Arc::new(h.documents.clone()),
        );
        restarted.restore().await;

        assert_eq!(restarted.assembled_skins(), Some(fetched.clone()));
        assert_eq!(restarted.get_skin_rotation(false).await.unwrap(), fetched);
        assert_eq!(requests_to(&h.server, STOREFRONT).await, 1);
    }
}
