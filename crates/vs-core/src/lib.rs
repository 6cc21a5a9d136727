//! Shared building blocks for the storefront client
//!
//! - [`SingleFlight`] collapses concurrent renewals and syncs into one call
//! - [`Clock`] injects wall-clock time into expiry decisions
//! - [`EventBus`] carries typed session and sync notifications
//! - [`timer`] schedules cancellable one-shot and periodic work
//! - [`SettingsStore`] persists non-secret app state as TOML

pub mod clock;
pub mod events;
pub mod logging;
pub mod resource;
pub mod settings;
pub mod single_flight;
pub mod timer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use events::{Event, EventBus};
pub use resource::ResourceKind;
pub use settings::{ClientVersion, Settings, SettingsError, SettingsStore};
pub use single_flight::{SingleFlight, keys};
pub use timer::TimerHandle;
