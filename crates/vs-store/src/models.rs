use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Player data host wire shapes
// ---------------------------------------------------------------------------

/// `GET /store/v2/storefront/{puuid}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StorefrontResponse {
    pub featured_bundle: FeaturedBundle,
    pub skins_panel_layout: SkinsPanelLayout,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FeaturedBundle {
    #[serde(default)]
    pub bundles: Vec<BundleOffer>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BundleOffer {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "DataAssetID")]
    pub data_asset_id: String,
    #[serde(default)]
    pub items: Vec<BundleItemOffer>,
    pub duration_remaining_in_seconds: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BundleItemOffer {
    pub item: BundleItem,
    #[serde(default)]
    pub base_price: u64,
    #[serde(default)]
    pub discounted_price: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BundleItem {
    #[serde(rename = "ItemTypeID")]
    pub item_type_id: String,
    #[serde(rename = "ItemID")]
    pub item_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SkinsPanelLayout {
    pub single_item_offers: Vec<String>,
    pub single_item_offers_remaining_duration_in_seconds: i64,
}

/// `GET /store/v1/offers/`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OffersResponse {
    pub offers: Vec<Offer>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Offer {
    #[serde(rename = "OfferID")]
    pub offer_id: String,
    /// Amount keyed by currency id
    #[serde(default)]
    pub cost: HashMap<String, u64>,
}

/// `GET /store/v1/wallet/{puuid}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WalletResponse {
    #[serde(default)]
    pub balances: HashMap<String, u64>,
}

/// Entry of `PUT /name-service/v2/players`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NameServiceEntry {
    pub subject: String,
    pub game_name: String,
    pub tag_line: String,
}

/// `GET /store/v1/entitlements/{puuid}/{item_type}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EntitlementsResponse {
    #[serde(default)]
    pub entitlements: Vec<Entitlement>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Entitlement {
    #[serde(rename = "ItemID")]
    pub item_id: String,
}

// ---------------------------------------------------------------------------
// Catalog host wire shapes
// ---------------------------------------------------------------------------

/// Every catalog host response wraps its payload in `{status, data}`
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    pub status: u16,
    pub data: T,
}

/// `GET /v1/version`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionData {
    pub riot_client_version: String,
    pub riot_client_build: String,
}

// ---------------------------------------------------------------------------
// Cached payloads
// ---------------------------------------------------------------------------

/// Weapon skin reference data, as served by `GET /v1/weapons/skins`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub uuid: String,
    pub display_name: String,
    /// Rarity tier
    #[serde(default)]
    pub content_tier_uuid: Option<String>,
    #[serde(default)]
    pub display_icon: Option<String>,
    #[serde(default)]
    pub chromas: Vec<Chroma>,
    #[serde(default)]
    pub levels: Vec<SkinLevel>,
}

impl CatalogEntry {
    /// Uuid that storefront offers and prices refer to
    pub fn offer_uuid(&self) -> Option<&str> {
        self.levels.first().map(|level| level.uuid.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chroma {
    pub uuid: String,
    pub display_name: String,
    #[serde(default)]
    pub display_icon: Option<String>,
    #[serde(default)]
    pub full_render: Option<String>,
    #[serde(default)]
    pub swatch: Option<String>,
    #[serde(default)]
    pub streamed_video: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkinLevel {
    pub uuid: String,
    pub display_name: String,
    #[serde(default)]
    pub display_icon: Option<String>,
    #[serde(default)]
    pub streamed_video: Option<String>,
}

/// Valorant Points cost of one offer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceEntry {
    /// Equal to the first level uuid of the skin on sale
    pub offer_id: String,
    pub base_cost: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub valorant_points: u64,
    pub radianite_points: u64,
    pub kingdom_credits: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerIdentity {
    pub puuid: String,
    pub game_name: String,
    pub tag_line: String,
}

impl PlayerIdentity {
    /// `Name#TAG`
    pub fn riot_id(&self) -> String {
        format!("{}#{}", self.game_name, self.tag_line)
    }
}

/// Skin level uuids on sale in the daily rotation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkinRotation {
    pub item_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleRotation {
    pub bundles: Vec<Bundle>,
}

/// One featured bundle and its own rotation deadline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    pub id: String,
    pub data_asset_id: String,
    pub items: Vec<BundleEntry>,
    pub renewal_at: DateTime<Utc>,
}

impl Bundle {
    pub fn item_ids(&self) -> Vec<String> {
        self.items.iter().map(|item| item.item_id.clone()).collect()
    }

    /// Sum of every item's discounted price, including items the catalog
    /// does not describe
    pub fn total_discounted_price(&self) -> u64 {
        self.items.iter().map(|item| item.discounted_price).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleEntry {
    pub item_id: String,
    pub item_type_id: String,
    pub base_price: u64,
    pub discounted_price: u64,
}

/// Skin level uuids the account owns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnedItems {
    pub item_ids: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storefront_shape() {
        let body = r#"{
            "FeaturedBundle": {
                "Bundle": {},
                "Bundles": [{
                    "ID": "b1",
                    "DataAssetID": "asset-1",
                    "CurrencyID": "85ad13f7-3d1b-5128-9eb2-7cd8ee0b5741",
                    "Items": [{
                        "Item": {"ItemTypeID": "e7c63390-eda7-46e0-bb7a-a6abdacd2433", "ItemID": "lvl-1", "Amount": 1},
                        "BasePrice": 1775,
                        "CurrencyID": "85ad13f7-3d1b-5128-9eb2-7cd8ee0b5741",
                        "DiscountPercent": 0.33,
                        "DiscountedPrice": 1189,
                        "IsPromoItem": false
                    }],
                    "DurationRemainingInSeconds": 86400,
                    "WholesaleOnly": false
                }],
                "BundleRemainingDurationInSeconds": 86400
            },
            "SkinsPanelLayout": {
                "SingleItemOffers": ["lvl-2", "lvl-3"],
                "SingleItemOffersRemainingDurationInSeconds": 3600
            }
        }"#;

        let storefront: StorefrontResponse = serde_json::from_str(body).unwrap();
        let bundle = &storefront.featured_bundle.bundles[0];
        assert_eq!(bundle.data_asset_id, "asset-1");
        assert_eq!(bundle.items[0].item.item_id, "lvl-1");
        assert_eq!(bundle.items[0].discounted_price, 1189);
        assert_eq!(storefront.skins_panel_layout.single_item_offers.len(), 2);
        assert_eq!(
            storefront
                .skins_panel_layout
                .single_item_offers_remaining_duration_in_seconds,
            3600
        );
    }

    #[test]
    fn test_catalog_entry_offer_uuid_is_first_level() {
        let entry: CatalogEntry = serde_json::from_str(
            r#"{"uuid":"skin-1","displayName":"Prime Vandal","themeUuid":"t","contentTierUuid":"tier","displayIcon":null,
                "chromas":[],"levels":[{"uuid":"lvl-1","displayName":"Prime Vandal","levelItem":null},{"uuid":"lvl-2","displayName":"Level 2"}]}"#,
        )
        .unwrap();

        assert_eq!(entry.offer_uuid(), Some("lvl-1"));
        assert_eq!(entry.content_tier_uuid.as_deref(), Some("tier"));
    }
}
