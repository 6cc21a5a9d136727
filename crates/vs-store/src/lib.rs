//! Storefront data for a logged-in account
//!
//! Resources are fetched through the session's credential, cached as
//! snapshots bounded by their rotation windows and joined with the skin
//! catalog and price list before they are handed out.
//!
//! # Components
//!
//! - [`StoreClient`] talks to the shard's store endpoints and the public catalog host
//! - [`ResourceCache`] holds the latest [`Snapshot`] of each resource kind
//! - [`SyncEngine`] decides between serving and refetching, one fetch per kind at a time
//! - [`RotationScheduler`] keeps a countdown and refreshes rotations as they elapse
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vs_auth::{AuthClient, AuthConfig, MemoryCredentialStore, SessionManager};
//! use vs_core::{EventBus, SettingsStore, SystemClock};
//! use vs_store::{
//!     JsonFileDocumentStore, RotationScheduler, SchedulerConfig, StoreClient, StoreConfig,
//!     SyncEngine, VersionCheck,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Arc::new(SettingsStore::open_default().await?);
//!     let session = Arc::new(SessionManager::new(
//!         AuthClient::new(AuthConfig::official()?)?,
//!         Arc::new(MemoryCredentialStore::new()),
//!         Arc::clone(&settings),
//!         Arc::new(SystemClock),
//!         EventBus::default(),
//!     ));
//!     session.login("username", "password").await?;
//!
//!     let documents = JsonFileDocumentStore::new(JsonFileDocumentStore::default_dir()?).await?;
//!     let engine = SyncEngine::new(
//!         Arc::clone(&session),
//!         StoreClient::new(StoreConfig::for_shard("eu")?)?,
//!         settings,
//!         Arc::new(documents),
//!     );
//!     engine.restore().await;
//!
//!     let scheduler = RotationScheduler::new(
//!         engine.clone(),
//!         session.clock(),
//!         SchedulerConfig::default(),
//!     );
//!     let _listener = scheduler.attach(engine.events());
//!
//!     if let VersionCheck::UpdateRequired { latest, .. } = engine.sync_all(false).await? {
//!         engine.acknowledge_update(latest).await?;
//!         engine.sync_all(true).await?;
//!     }
//!
//!     for offer in engine.get_skin_rotation(false).await?.offers {
//!         println!("{} - {} VP", offer.display_name, offer.cost);
//!     }
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod client;
pub mod config;
pub mod documents;
pub mod errors;
pub mod models;
pub mod scheduler;
pub mod sync;
pub mod views;

pub use cache::{AnyResourceCache, CacheDecision, RefetchReason, ResourceCache, RotationWindow, Snapshot};
pub use client::{StoreClient, Storefront};
pub use config::{SchedulerConfig, StoreConfig};
pub use documents::{DocumentStore, JsonFileDocumentStore, MemoryDocumentStore};
pub use errors::{Result, StoreError};
pub use models::{
    Bundle, BundleEntry, BundleRotation, CatalogEntry, Chroma, OwnedItems, PlayerIdentity,
    PriceEntry, SkinLevel, SkinRotation, Wallet,
};
pub use scheduler::{
    BundleCountdown, Countdown, RotationScheduler, RotationSource, RotationWindows,
    format_remaining,
};
pub use sync::{SyncEngine, VersionCheck};
pub use views::{
    AssembledOffer, BundleRotationView, BundleView, Catalog, OwnedItemsView, SkinRotationView,
};
