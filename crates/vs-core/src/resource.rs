use std::fmt;

use serde::{Deserialize, Serialize};

/// Kinds of storefront data tracked by the resource cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Wallet,
    PlayerIdentity,
    SkinRotation,
    BundleRotations,
    Catalog,
    Prices,
    OwnedItems,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 7] = [
        Self::Wallet,
        Self::PlayerIdentity,
        Self::SkinRotation,
        Self::BundleRotations,
        Self::Catalog,
        Self::Prices,
        Self::OwnedItems,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wallet => "wallet",
            Self::PlayerIdentity => "player_identity",
            Self::SkinRotation => "skin_rotation",
            Self::BundleRotations => "bundle_rotations",
            Self::Catalog => "catalog",
            Self::Prices => "prices",
            Self::OwnedItems => "owned_items",
        }
    }

    /// Kinds tied to the logged-in account, dropped on logout
    ///
    /// Catalog and prices are server reference data and survive a logout.
    pub fn is_account_scoped(&self) -> bool {
        !matches!(self, Self::Catalog | Self::Prices)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
