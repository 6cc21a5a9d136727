use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use vs_core::{Clock, Event, EventBus, ResourceKind, TimerHandle, timer};

use crate::cache::RotationWindow;
use crate::config::SchedulerConfig;
use crate::errors::Result;

/// Current rotation deadlines
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RotationWindows {
    pub skins: Option<RotationWindow>,
    /// Keyed by bundle id
    pub bundles: Vec<(String, RotationWindow)>,
    /// Earliest deadline of the bundle snapshot; still set when nothing is featured
    pub bundles_refresh: Option<RotationWindow>,
}

impl RotationWindows {
    fn bundles_elapsed(&self, now: DateTime<Utc>) -> bool {
        self.bundles_refresh.is_some_and(|w| w.has_elapsed(now))
            || self.bundles.iter().any(|(_, w)| w.has_elapsed(now))
    }
}

/// Something that knows its rotation deadlines and can refresh past them
#[async_trait::async_trait]
pub trait RotationSource: Send + Sync {
    fn rotation_windows(&self) -> RotationWindows;

    async fn refresh(&self, kind: ResourceKind) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleCountdown {
    pub id: String,
    pub remaining: String,
}

/// Time left until each rotation, formatted for display
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Countdown {
    pub skins: Option<String>,
    pub bundles: Vec<BundleCountdown>,
}

/// `HH:MM:SS`, prefixed with `Nd ` once more than a day is left
pub fn format_remaining(remaining: Duration) -> String {
    let total = remaining.num_seconds().max(0);
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;

    if days > 0 {
        format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    }
}

/// Per-kind guard allowing one auto-refresh per elapsed window
#[derive(Debug, Default)]
struct Latches {
    skins: bool,
    bundles: bool,
}

impl Latches {
    fn slot(&mut self, kind: ResourceKind) -> Option<&mut bool> {
        match kind {
            ResourceKind::SkinRotation => Some(&mut self.skins),
            ResourceKind::BundleRotations => Some(&mut self.bundles),
            _ => None,
        }
    }
}

struct Inner {
    source: Arc<dyn RotationSource>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    countdown: watch::Sender<Countdown>,
    latches: Mutex<Latches>,
    ticker: Mutex<Option<TimerHandle>>,
}

/// Ticks the rotation countdown and refreshes rotations once they elapse
///
/// A refresh is attempted at most once per elapsed window until the app
/// re-enters the foreground or the rotation is refreshed manually.
#[derive(Clone)]
pub struct RotationScheduler {
    inner: Arc<Inner>,
}

impl RotationScheduler {
    pub fn new(
        source: Arc<dyn RotationSource>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        let (countdown, _) = watch::channel(Countdown::default());
        Self {
            inner: Arc::new(Inner {
                source,
                clock,
                config,
                countdown,
                latches: Mutex::new(Latches::default()),
                ticker: Mutex::new(None),
            }),
        }
    }

    /// Start ticking; does nothing when already running
    #[instrument(skip(self))]
    pub fn start(&self) {
        let mut ticker = self.inner.ticker();
        if ticker.as_ref().is_some_and(|handle| !handle.is_cancelled()) {
            return;
        }

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        *ticker = Some(timer::every(self.inner.config.tick, move || {
            let inner = weak.upgrade();
            async move {
                if let Some(inner) = inner {
                    inner.tick().await;
                }
            }
        }));
        info!("Rotation scheduler started");
    }

    /// Stop ticking and clear the countdown
    #[instrument(skip(self))]
    pub fn stop(&self) {
        if let Some(handle) = self.inner.ticker().take() {
            handle.cancel();
            info!("Rotation scheduler stopped");
        }
        self.inner.countdown.send_replace(Countdown::default());
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .ticker()
            .as_ref()
            .is_some_and(|handle| !handle.is_cancelled())
    }

    /// Re-arm auto-refresh for every rotation
    pub fn enter_foreground(&self) {
        *self.inner.latches() = Latches::default();
        debug!("Auto-refresh re-armed");
    }

    pub fn countdown(&self) -> watch::Receiver<Countdown> {
        self.inner.countdown.subscribe()
    }

    /// Follow session and sync events until the returned token is cancelled
    ///
    /// Logout stops the scheduler, a full sync starts it and a forced
    /// refresh re-arms the refreshed rotation.
    pub fn attach(&self, events: &EventBus) -> CancellationToken {
        let token = CancellationToken::new();
        let cancel = token.clone();
        let mut rx = events.subscribe();
        let scheduler = self.clone();

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = rx.recv() => event,
                };

                match event {
                    Ok(event) => scheduler.on_event(event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Scheduler missed events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        token
    }

    fn on_event(&self, event: Event) {
        match event {
            Event::LoggedOut => self.stop(),
            Event::FullSyncCompleted => self.start(),
            Event::SyncCompleted { kind, forced: true } => self.inner.rearm(kind),
            _ => {}
        }
    }
}

impl Inner {
    async fn tick(&self) {
        let now = self.clock.now();
        let windows = self.source.rotation_windows();
        self.countdown.send_replace(countdown(&windows, now));

        if windows.skins.is_some_and(|window| window.has_elapsed(now)) {
            self.auto_refresh(ResourceKind::SkinRotation, now).await;
        }
        if windows.bundles_elapsed(now) {
            self.auto_refresh(ResourceKind::BundleRotations, now).await;
        }
    }

    async fn auto_refresh(&self, kind: ResourceKind, now: DateTime<Utc>) {
        {
            let mut latches = self.latches();
            let Some(fired) = latches.slot(kind) else {
                return;
            };
            if *fired {
                return;
            }
            *fired = true;
        }

        debug!(%kind, "Rotation elapsed, refreshing");
        if let Err(e) = self.source.refresh(kind).await {
            warn!(%kind, "Auto-refresh failed: {}", e);
            return;
        }

        // A window in the future means the boundary was crossed; arm the next one
        let windows = self.source.rotation_windows();
        let renewed = match kind {
            ResourceKind::SkinRotation => windows.skins.is_some_and(|w| !w.has_elapsed(now)),
            _ => !windows.bundles_elapsed(now),
        };
        if renewed {
            self.rearm(kind);
        }
    }

    fn rearm(&self, kind: ResourceKind) {
        if let Some(fired) = self.latches().slot(kind) {
            *fired = false;
        }
    }

    fn latches(&self) -> MutexGuard<'_, Latches> {
        self.latches.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ticker(&self) -> MutexGuard<'_, Option<TimerHandle>> {
        self.ticker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(handle) = self.ticker.get_mut().unwrap_or_else(PoisonError::into_inner).take() {
            handle.cancel();
        }
    }
}

fn countdown(windows: &RotationWindows, now: DateTime<Utc>) -> Countdown {
    Countdown {
        skins: windows
            .skins
            .map(|window| format_remaining(window.remaining(now))),
        bundles: windows
            .bundles
            .iter()
            .map(|(id, window)| BundleCountdown {
                id: id.clone(),
                remaining: format_remaining(window.remaining(now)),
            })
            .collect(),
    }
}

impl std::fmt::Debug for RotationScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RotationScheduler")
            .field("running", &self.is_running())
            .field("latches", &*self.inner.latches())
            .finish()
    }
}
