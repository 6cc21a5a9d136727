use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{Bundle, CatalogEntry, Chroma, PriceEntry, SkinLevel};

/// A sellable skin with its catalog metadata and price
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssembledOffer {
    /// Offer uuid, equal to the skin's first level uuid
    pub uuid: String,
    pub skin_uuid: String,
    pub display_name: String,
    pub content_tier_uuid: Option<String>,
    pub display_icon: Option<String>,
    pub chromas: Vec<Chroma>,
    pub levels: Vec<SkinLevel>,
    pub cost: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkinRotationView {
    pub offers: Vec<AssembledOffer>,
    pub renewal_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BundleView {
    pub id: String,
    pub data_asset_id: String,
    pub renewal_at: DateTime<Utc>,
    pub total_discounted_price: u64,
    pub offers: Vec<AssembledOffer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BundleRotationView {
    pub bundles: Vec<BundleView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OwnedItemsView {
    pub offers: Vec<AssembledOffer>,
}

/// Reference data indexed for the join
pub struct Catalog<'a> {
    by_offer: HashMap<&'a str, &'a CatalogEntry>,
    prices: HashMap<&'a str, u64>,
}

impl<'a> Catalog<'a> {
    pub fn new(entries: &'a [CatalogEntry], prices: &'a [PriceEntry]) -> Self {
        Self {
            by_offer: entries
                .iter()
                .filter_map(|entry| Some((entry.offer_uuid()?, entry)))
                .collect(),
            prices: prices
                .iter()
                .map(|price| (price.offer_id.as_str(), price.base_cost))
                .collect(),
        }
    }

    /// Inner join of `ids` against catalog and prices
    ///
    /// Ids missing either a catalog entry or a price are skipped; order of
    /// `ids` is preserved.
    pub fn assemble(&self, ids: &[String]) -> Vec<AssembledOffer> {
        ids.iter()
            .filter_map(|id| {
                let entry = self.by_offer.get(id.as_str())?;
                let cost = *self.prices.get(id.as_str())?;
                Some(AssembledOffer {
                    uuid: id.clone(),
                    skin_uuid: entry.uuid.clone(),
                    display_name: entry.display_name.clone(),
                    content_tier_uuid: entry.content_tier_uuid.clone(),
                    display_icon: entry.display_icon.clone(),
                    chromas: entry.chromas.clone(),
                    levels: entry.levels.clone(),
                    cost,
                })
            })
            .collect()
    }

    pub fn bundle(&self, bundle: &Bundle) -> BundleView {
        BundleView {
            id: bundle.id.clone(),
            data_asset_id: bundle.data_asset_id.clone(),
            renewal_at: bundle.renewal_at,
            total_discounted_price: bundle.total_discounted_price(),
            offers: self.assemble(&bundle.item_ids()),
        }
    }
}
