use std::time::Duration;

use base64::Engine;
use url::Url;
use vs_auth::HttpTimeouts;

use crate::errors::Result;

/// Public catalog and version host
pub const CATALOG_BASE: &str = "https://valorant-api.com";

/// Region shard used when none is configured
pub const DEFAULT_SHARD: &str = "na";

/// Currency ids found in wallet balances and offer costs
pub mod currency {
    pub const VALORANT_POINTS: &str = "85ad13f7-3d1b-5128-9eb2-7cd8ee0b5741";
    pub const RADIANITE_POINTS: &str = "e59aa87c-4cbf-517a-5983-6e81511be9b7";
    pub const KINGDOM_CREDITS: &str = "85ca954a-41f2-ce94-9b45-8ca3dd39a00d";
}

/// Entitlement item type of weapon skin levels
pub const SKIN_LEVEL_ITEM_TYPE: &str = "e7c63390-eda7-46e0-bb7a-a6abdacd2433";

const CLIENT_PLATFORM: &str = r#"{"platformType":"PC","platformOS":"Windows","platformOSVersion":"10.0.19042.1.256.64bit","platformChipset":"Unknown"}"#;

/// Configuration for [`StoreClient`](crate::StoreClient)
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub shard: String,
    /// Player data host, `https://pd.{shard}.a.pvp.net`
    pub pd_base: Url,
    pub catalog_base: Url,
    /// Base64 JSON sent as `X-Riot-ClientPlatform`
    pub client_platform: String,
    pub http_timeouts: HttpTimeouts,
    pub user_agent: Option<String>,
}

impl StoreConfig {
    /// Production hosts for `shard` (`na`, `eu`, `ap`, `kr`)
    pub fn for_shard(shard: &str) -> Result<Self> {
        let pd_base = Url::parse(&format!("https://pd.{}.a.pvp.net", shard))?;
        let catalog_base = Url::parse(CATALOG_BASE)?;

        let mut config = Self::with_base_urls(pd_base, catalog_base);
        config.shard = shard.to_string();
        Ok(config)
    }

    pub fn official() -> Result<Self> {
        Self::for_shard(DEFAULT_SHARD)
    }

    /// Same paths as production, served from alternative hosts
    pub fn with_base_urls(pd_base: Url, catalog_base: Url) -> Self {
        Self {
            shard: DEFAULT_SHARD.to_string(),
            pd_base,
            catalog_base,
            client_platform: base64::engine::general_purpose::STANDARD.encode(CLIENT_PLATFORM),
            http_timeouts: HttpTimeouts {
                connect: Duration::from_secs(15),
                request: Duration::from_secs(30),
            },
            user_agent: Some("vshop".to_string()),
        }
    }
}

/// Configuration for [`RotationScheduler`](crate::RotationScheduler)
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Countdown refresh cadence
    pub tick: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_selects_pd_host() {
        let config = StoreConfig::for_shard("eu").unwrap();
        assert_eq!(config.pd_base.as_str(), "https://pd.eu.a.pvp.net/");
        assert_eq!(config.shard, "eu");
    }

    #[test]
    fn test_client_platform_is_base64_json() {
        let config = StoreConfig::official().unwrap();
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(&config.client_platform)
            .unwrap();
        let platform: serde_json::Value = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(platform["platformType"], "PC");
    }
}
