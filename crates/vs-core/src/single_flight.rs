use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::{debug, trace};

/// Well-known flight keys
pub mod keys {
    /// Silent re-auth of the credential set
    pub const TOKEN_RENEWAL: &str = "token-renewal";
    /// Daily skin rotation refetch
    pub const SKIN_SYNC: &str = "skin-sync";
    /// Bundle rotations refetch
    pub const BUNDLE_SYNC: &str = "bundle-sync";
    /// Catalog + price reference data refetch
    pub const REFERENCE_SYNC: &str = "reference-sync";
}

type Slot<T> = Arc<watch::Sender<Option<T>>>;
type Flights<T> = Arc<Mutex<HashMap<String, Slot<T>>>>;

/// Collapses concurrent operations sharing a key into one execution
///
/// The first caller for a key becomes the leader and runs the operation;
/// every caller arriving while it is in flight waits on a watch channel and
/// receives a clone of the leader's output. If the leader is dropped before
/// publishing, waiters contend again and one of them takes over.
pub struct SingleFlight<T> {
    flights: Flights<T>,
}

enum Role<T> {
    Leader(Flight<T>),
    Follower(watch::Receiver<Option<T>>),
}

/// Leader registration, removed from the map when dropped
struct Flight<T> {
    flights: Flights<T>,
    key: String,
    slot: Slot<T>,
}

fn lock<T>(flights: &Flights<T>) -> MutexGuard<'_, HashMap<String, Slot<T>>> {
    flights.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T: Clone> SingleFlight<T> {
    pub fn new() -> Self {
        Self {
            flights: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Run `op` unless an operation for `key` is already running, in which
    /// case wait for it and return its output instead.
    pub async fn run<F, Fut>(&self, key: &str, op: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let flight = loop {
            match self.join(key) {
                Role::Leader(flight) => break flight,
                Role::Follower(rx) => {
                    trace!(key, "waiting on in-flight operation");
                    if let Some(value) = wait(rx).await {
                        return value;
                    }
                    debug!(key, "in-flight operation abandoned, contending again");
                }
            }
        };

        let value = op().await;
        flight.publish(value)
    }

    /// Resolve every waiter of `key` with `value` and detach the running
    /// leader, whose own output is then discarded in favour of `value`.
    ///
    /// Returns false when nothing was in flight.
    pub fn resolve(&self, key: &str, value: T) -> bool {
        let Some(slot) = lock(&self.flights).remove(key) else {
            return false;
        };

        slot.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(value);
                true
            } else {
                false
            }
        });
        debug!(key, "in-flight operation resolved externally");
        true
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        lock(&self.flights).contains_key(key)
    }

    fn join(&self, key: &str) -> Role<T> {
        let mut flights = lock(&self.flights);

        if let Some(slot) = flights.get(key) {
            return Role::Follower(slot.subscribe());
        }

        let (tx, _) = watch::channel(None);
        let slot = Arc::new(tx);
        flights.insert(key.to_string(), Arc::clone(&slot));

        Role::Leader(Flight {
            flights: Arc::clone(&self.flights),
            key: key.to_string(),
            slot,
        })
    }
}

async fn wait<T: Clone>(mut rx: watch::Receiver<Option<T>>) -> Option<T> {
    loop {
        let current = rx.borrow_and_update().clone();
        if current.is_some() {
            return current;
        }
        if rx.changed().await.is_err() {
            return rx.borrow().clone();
        }
    }
}

impl<T: Clone> Flight<T> {
    /// Publish the leader's output; an earlier external resolution wins.
    fn publish(&self, value: T) -> T {
        let mut outcome = value;
        self.slot.send_if_modified(|current| match current {
            Some(existing) => {
                outcome = existing.clone();
                false
            }
            None => {
                *current = Some(outcome.clone());
                true
            }
        });
        outcome
    }
}

impl<T> Drop for Flight<T> {
    fn drop(&mut self) {
        let mut flights = lock(&self.flights);
        if flights
            .get(&self.key)
            .is_some_and(|slot| Arc::ptr_eq(slot, &self.slot))
        {
            flights.remove(&self.key);
        }
    }
}

impl<T: Clone> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for SingleFlight<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<String> = lock(&self.flights).keys().cloned().collect();
        f.debug_struct("SingleFlight")
            .field("in_flight", &keys)
            .finish()
    }
}
