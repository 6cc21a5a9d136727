use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use vs_core::ResourceKind;

use crate::documents::DocumentStore;

/// Moment a cached offer set stops being valid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationWindow {
    pub renewal_at: DateTime<Utc>,
}

impl RotationWindow {
    pub fn new(renewal_at: DateTime<Utc>) -> Self {
        Self { renewal_at }
    }

    pub fn has_elapsed(&self, now: DateTime<Utc>) -> bool {
        now >= self.renewal_at
    }

    /// Time left, clamped at zero
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.renewal_at - now).max(Duration::zero())
    }
}

/// One fetched payload with the windows that bound its validity
///
/// A snapshot without windows never expires by time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot<T> {
    pub payload: T,
    #[serde(default)]
    pub windows: Vec<RotationWindow>,
    pub fetched_at: DateTime<Utc>,
}

impl<T> Snapshot<T> {
    pub fn new(payload: T, windows: Vec<RotationWindow>, fetched_at: DateTime<Utc>) -> Self {
        Self {
            payload,
            windows,
            fetched_at,
        }
    }

    /// Stale as soon as any window has elapsed
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.windows.iter().any(|window| window.has_elapsed(now))
    }

    /// Earliest deadline among the windows
    pub fn next_renewal(&self) -> Option<DateTime<Utc>> {
        self.windows.iter().map(|window| window.renewal_at).min()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefetchReason {
    Forced,
    Missing,
    Expired,
}

#[derive(Debug, Clone)]
pub enum CacheDecision<T> {
    Serve(Arc<Snapshot<T>>),
    Refetch(RefetchReason),
}

/// Latest snapshot of one resource kind, mirrored to a [`DocumentStore`]
///
/// Snapshots are swapped whole behind an `Arc`, so readers see either the
/// previous or the next one and never a mix.
pub struct ResourceCache<T> {
    kind: ResourceKind,
    documents: Arc<dyn DocumentStore>,
    current: RwLock<Option<Arc<Snapshot<T>>>>,
}

impl<T> ResourceCache<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    pub fn new(kind: ResourceKind, documents: Arc<dyn DocumentStore>) -> Self {
        Self {
            kind,
            documents,
            current: RwLock::new(None),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn snapshot(&self) -> Option<Arc<Snapshot<T>>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Serve or refetch
    pub fn decide(&self, force: bool, now: DateTime<Utc>) -> CacheDecision<T> {
        if force {
            return CacheDecision::Refetch(RefetchReason::Forced);
        }

        match self.snapshot() {
            None => CacheDecision::Refetch(RefetchReason::Missing),
            Some(snapshot) if snapshot.is_stale(now) => {
                CacheDecision::Refetch(RefetchReason::Expired)
            }
            Some(snapshot) => CacheDecision::Serve(snapshot),
        }
    }

    /// Swap in a freshly fetched snapshot and persist it
    ///
    /// A persistence failure is logged; the in-memory snapshot is still
    /// replaced since the data itself is good.
    pub async fn replace(&self, snapshot: Snapshot<T>) -> Arc<Snapshot<T>> {
        match serde_json::to_value(&snapshot) {
            Ok(document) => {
                if let Err(e) = self.documents.save(self.kind.as_str(), &document).await {
                    warn!(kind = %self.kind, "Failed to persist snapshot: {}", e);
                }
            }
            Err(e) => warn!(kind = %self.kind, "Failed to serialize snapshot: {}", e),
        }

        let snapshot = Arc::new(snapshot);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&snapshot));
        debug!(kind = %self.kind, "Replaced snapshot");
        snapshot
    }

    /// Drop the snapshot so the next read refetches
    pub async fn invalidate(&self) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;
        if let Err(e) = self.documents.remove(self.kind.as_str()).await {
            warn!(kind = %self.kind, "Failed to remove persisted snapshot: {}", e);
        }
    }

    /// Reload the persisted snapshot; returns whether one was found
    pub async fn restore(&self) -> bool {
        let document = match self.documents.load(self.kind.as_str()).await {
            Ok(Some(document)) => document,
            Ok(None) => return false,
            Err(e) => {
                warn!(kind = %self.kind, "Failed to load persisted snapshot: {}", e);
                return false;
            }
        };

        match serde_json::from_value::<Snapshot<T>>(document) {
            Ok(snapshot) => {
                *self.current.write().unwrap_or_else(PoisonError::into_inner) =
                    Some(Arc::new(snapshot));
                debug!(kind = %self.kind, "Restored snapshot");
                true
            }
            Err(e) => {
                warn!(kind = %self.kind, "Discarding unreadable snapshot: {}", e);
                false
            }
        }
    }
}

/// Payload-independent view of a [`ResourceCache`]
///
/// Lets the caches of every kind be walked together, e.g. on logout.
#[async_trait::async_trait]
pub trait AnyResourceCache: Send + Sync {
    fn kind(&self) -> ResourceKind;

    async fn invalidate(&self);

    async fn restore(&self) -> bool;
}

#[async_trait::async_trait]
impl<T> AnyResourceCache for ResourceCache<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    fn kind(&self) -> ResourceKind {
        ResourceCache::kind(self)
    }

    async fn invalidate(&self) {
        ResourceCache::invalidate(self).await
    }

    async fn restore(&self) -> bool {
        ResourceCache::restore(self).await
    }
}

impl<T> std::fmt::Debug for ResourceCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cached = self
            .current
            .read()
            .map(|current| current.is_some())
            .unwrap_or(false);
        f.debug_struct("ResourceCache")
            .field("kind", &self.kind)
            .field("cached", &cached)
            .finish()
    }
}
