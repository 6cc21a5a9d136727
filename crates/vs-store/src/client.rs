use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use vs_auth::Credential;
use vs_core::ClientVersion;

use crate::config::{SKIN_LEVEL_ITEM_TYPE, StoreConfig, currency};
use crate::errors::{Result, StoreError};
use crate::models::*;

const ENTITLEMENTS_HEADER: &str = "X-Riot-Entitlements-JWT";
const CLIENT_PLATFORM_HEADER: &str = "X-Riot-ClientPlatform";
const CLIENT_VERSION_HEADER: &str = "X-Riot-ClientVersion";

/// `now` pushed forward by a remaining duration reported by the server
fn deadline(now: DateTime<Utc>, remaining_secs: i64) -> Result<DateTime<Utc>> {
    if remaining_secs < 0 {
        return Err(StoreError::InvalidResponse(format!(
            "negative remaining duration: {}s",
            remaining_secs
        )));
    }
    Duration::try_seconds(remaining_secs)
        .and_then(|remaining| now.checked_add_signed(remaining))
        .ok_or_else(|| {
            StoreError::InvalidResponse(format!(
                "remaining duration out of range: {}s",
                remaining_secs
            ))
        })
}

/// Storefront as returned by one storefront call, split per resource kind
#[derive(Debug, Clone)]
pub struct Storefront {
    pub skins: SkinRotation,
    pub skins_renewal_at: DateTime<Utc>,
    pub bundles: BundleRotation,
}

/// Stateless client for the player data and catalog hosts
#[derive(Debug)]
pub struct StoreClient {
    config: StoreConfig,
    http: Client,
    client_version: RwLock<Option<String>>,
}

impl StoreClient {
    pub fn new(config: StoreConfig) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(config.http_timeouts.connect)
            .timeout(config.http_timeouts.request)
            .user_agent(config.user_agent.as_deref().unwrap_or("vshop"))
            .build()?;

        Ok(Self {
            config,
            http,
            client_version: RwLock::new(None),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Client version sent with player data requests
    pub fn set_client_version(&self, version: Option<&ClientVersion>) {
        *self
            .client_version
            .write()
            .unwrap_or_else(PoisonError::into_inner) =
            version.map(|v| v.riot_client_version.clone());
    }

    fn authorized(&self, request: RequestBuilder, credential: &Credential) -> RequestBuilder {
        let request = request
            .header(AUTHORIZATION, format!("Bearer {}", credential.access_token))
            .header(ENTITLEMENTS_HEADER, &credential.entitlement_token)
            .header(CLIENT_PLATFORM_HEADER, &self.config.client_platform);

        let version = self
            .client_version
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match version {
            Some(version) => request.header(CLIENT_VERSION_HEADER, version),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.send().await?;

        if !response.status().is_success() {
            return Err(StoreError::from_response(response).await);
        }

        Ok(serde_json::from_slice(&response.bytes().await?)?)
    }

    /// Daily skin rotation and featured bundles, with deadlines relative to `now`
    #[instrument(skip(self, credential))]
    pub async fn fetch_storefront(
        &self,
        credential: &Credential,
        now: DateTime<Utc>,
    ) -> Result<Storefront> {
        let url = self
            .config
            .pd_base
            .join(&format!("/store/v2/storefront/{}", credential.puuid))?;

        debug!("Fetching storefront");
        let response: StorefrontResponse =
            self.send(self.authorized(self.http.get(url), credential)).await?;

        let layout = response.skins_panel_layout;
        let bundles = response
            .featured_bundle
            .bundles
            .into_iter()
            .map(|bundle| {
                Ok(Bundle {
                    id: bundle.id,
                    data_asset_id: bundle.data_asset_id,
                    renewal_at: deadline(now, bundle.duration_remaining_in_seconds)?,
                    items: bundle
                        .items
                        .into_iter()
                        .map(|offer| BundleEntry {
                            item_id: offer.item.item_id,
                            item_type_id: offer.item.item_type_id,
                            base_price: offer.base_price,
                            discounted_price: offer.discounted_price,
                        })
                        .collect(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Storefront {
            skins: SkinRotation {
                item_ids: layout.single_item_offers,
            },
            skins_renewal_at: deadline(
                now,
                layout.single_item_offers_remaining_duration_in_seconds,
            )?,
            bundles: BundleRotation { bundles },
        })
    }

    /// Valorant Points price of every offer
    #[instrument(skip(self, credential))]
    pub async fn fetch_prices(&self, credential: &Credential) -> Result<Vec<PriceEntry>> {
        let url = self.config.pd_base.join("/store/v1/offers/")?;

        debug!("Fetching offer prices");
        let response: OffersResponse =
            self.send(self.authorized(self.http.get(url), credential)).await?;

        Ok(response
            .offers
            .into_iter()
            .filter_map(|offer| {
                let base_cost = *offer.cost.get(currency::VALORANT_POINTS)?;
                Some(PriceEntry {
                    offer_id: offer.offer_id,
                    base_cost,
                })
            })
            .collect())
    }

    #[instrument(skip(self, credential))]
    pub async fn fetch_wallet(&self, credential: &Credential) -> Result<Wallet> {
        let url = self
            .config
            .pd_base
            .join(&format!("/store/v1/wallet/{}", credential.puuid))?;

        debug!("Fetching wallet");
        let response: WalletResponse =
            self.send(self.authorized(self.http.get(url), credential)).await?;

        let balance = |id: &str| response.balances.get(id).copied().unwrap_or(0);
        Ok(Wallet {
            valorant_points: balance(currency::VALORANT_POINTS),
            radianite_points: balance(currency::RADIANITE_POINTS),
            kingdom_credits: balance(currency::KINGDOM_CREDITS),
        })
    }

    #[instrument(skip(self, credential))]
    pub async fn fetch_player_identity(&self, credential: &Credential) -> Result<PlayerIdentity> {
        let url = self.config.pd_base.join("/name-service/v2/players")?;

        debug!("Fetching player name");
        let entries: Vec<NameServiceEntry> = self
            .send(
                self.authorized(self.http.put(url), credential)
                    .json(&[&credential.puuid]),
            )
            .await?;

        let entry = entries
            .into_iter()
            .find(|entry| entry.subject == credential.puuid)
            .ok_or_else(|| {
                StoreError::InvalidResponse("name service returned no entry for account".to_string())
            })?;

        Ok(PlayerIdentity {
            puuid: entry.subject,
            game_name: entry.game_name,
            tag_line: entry.tag_line,
        })
    }

    /// Skin levels the account owns
    #[instrument(skip(self, credential))]
    pub async fn fetch_owned_items(&self, credential: &Credential) -> Result<OwnedItems> {
        let url = self.config.pd_base.join(&format!(
            "/store/v1/entitlements/{}/{}",
            credential.puuid, SKIN_LEVEL_ITEM_TYPE
        ))?;

        debug!("Fetching owned skins");
        let response: EntitlementsResponse =
            self.send(self.authorized(self.http.get(url), credential)).await?;

        Ok(OwnedItems {
            item_ids: response
                .entitlements
                .into_iter()
                .map(|entitlement| entitlement.item_id)
                .collect(),
        })
    }

    /// Weapon skin reference data from the public catalog host
    #[instrument(skip(self))]
    pub async fn fetch_catalog(&self) -> Result<Vec<CatalogEntry>> {
        let url = self.config.catalog_base.join("/v1/weapons/skins")?;

        debug!("Fetching skin catalog");
        let envelope: ApiEnvelope<Vec<CatalogEntry>> = self.send(self.http.get(url)).await?;
        Ok(envelope.data)
    }

    /// Current game client build identifiers
    #[instrument(skip(self))]
    pub async fn fetch_version(&self) -> Result<ClientVersion> {
        let url = self.config.catalog_base.join("/v1/version")?;

        debug!("Fetching client version");
        let envelope: ApiEnvelope<VersionData> = self.send(self.http.get(url)).await?;
        Ok(ClientVersion {
            riot_client_version: envelope.data.riot_client_version,
            riot_client_build: envelope.data.riot_client_build,
        })
    }
}
