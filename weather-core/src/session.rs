//! The screen and the chain that feeds it.
//!
//! `Session` runs permission → location → fetch on background tasks and
//! posts results to a `Screen`, the only task that touches the view.
//! Each fetch carries a sequence token; the screen never lets an older
//! completion overwrite a newer render.

use std::{
    fmt::Display,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use chrono::TimeZone;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, info};

use crate::{
    config::{Config, FallbackConfig},
    error::WeatherError,
    fetcher::{IconLoader, WeatherSource},
    location::{FallbackCause, LocationAcquirer, LocationFix, LocationRequest},
    model::{FetchOutcome, WeatherQuery},
    permission::{PermissionGate, PermissionStatus},
    presenter::{Presenter, WeatherView},
};

#[derive(Debug)]
enum ScreenEvent {
    Requesting(u64),
    Completed {
        token: u64,
        outcome: FetchOutcome,
        icon: oneshot::Sender<Option<String>>,
    },
    Icon {
        token: u64,
        image: Vec<u8>,
    },
    Notice(&'static str),
    Close,
}

/// Owns the presenter and applies events in arrival order.
#[derive(Debug)]
pub struct Screen<V, Tz> {
    presenter: Presenter<V, Tz>,
    events: mpsc::UnboundedReceiver<ScreenEvent>,
    latest_applied: u64,
}

impl<V, Tz> Screen<V, Tz>
where
    V: WeatherView,
    Tz: TimeZone + Send,
    Tz::Offset: Display,
{
    /// Process events until the session closes; hands the view back.
    pub async fn run(mut self) -> V {
        while let Some(event) = self.events.recv().await {
            match event {
                ScreenEvent::Requesting(token) => {
                    debug!(token, "fetch issued");
                    self.presenter.begin_request();
                }
                ScreenEvent::Completed { token, outcome, icon } => {
                    if token < self.latest_applied {
                        debug!(token, latest = self.latest_applied, "dropping stale completion");
                        let _ = icon.send(None);
                        continue;
                    }
                    self.latest_applied = token;
                    let _ = icon.send(self.presenter.render(outcome));
                }
                ScreenEvent::Icon { token, image } => {
                    if token == self.latest_applied {
                        self.presenter.apply_icon(&image);
                    } else {
                        debug!(token, "dropping icon for superseded cycle");
                    }
                }
                ScreenEvent::Notice(text) => self.presenter.notify(text),
                ScreenEvent::Close => break,
            }
        }
        self.presenter.into_view()
    }
}

/// Everything a session needs besides the view.
#[derive(Debug, Clone)]
pub struct SessionDeps {
    pub permission: Arc<dyn PermissionGate>,
    pub acquirer: Arc<LocationAcquirer>,
    pub source: Arc<dyn WeatherSource>,
    pub icons: Arc<dyn IconLoader>,
    pub fallback: FallbackConfig,
    pub location_request: LocationRequest,
    pub fix_timeout: Duration,
}

impl SessionDeps {
    /// Location timing and fallback cities from config; collaborators supplied by the caller.
    pub fn from_config(
        config: &Config,
        permission: Arc<dyn PermissionGate>,
        acquirer: Arc<LocationAcquirer>,
        source: Arc<dyn WeatherSource>,
        icons: Arc<dyn IconLoader>,
    ) -> Self {
        Self {
            permission,
            acquirer,
            source,
            icons,
            fallback: config.fallback.clone(),
            location_request: config.location.request(),
            fix_timeout: config.location.fix_timeout(),
        }
    }
}

/// Drives fetch cycles for one screen.
#[derive(Debug)]
pub struct Session {
    deps: SessionDeps,
    events: mpsc::UnboundedSender<ScreenEvent>,
    next_token: AtomicU64,
    closed: AtomicBool,
}

impl Session {
    pub fn new<V, Tz>(deps: SessionDeps, presenter: Presenter<V, Tz>) -> (Self, Screen<V, Tz>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Self {
            deps,
            events: tx,
            next_token: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        };
        let screen = Screen { presenter, events: rx, latest_applied: 0 };
        (session, screen)
    }

    /// Permission and location, resolved to the query the fetcher should run.
    ///
    /// `None` when the location request was cancelled by [`pause`](Self::pause).
    pub async fn resolve_location_query(&self) -> Option<WeatherQuery> {
        let cause = match self.deps.permission.ensure_location_permission().await {
            PermissionStatus::Denied => FallbackCause::PermissionDenied,
            PermissionStatus::Granted => {
                let fix = self
                    .deps
                    .acquirer
                    .get_one_location_fix(self.deps.fix_timeout, &self.deps.location_request)
                    .await;
                match fix {
                    LocationFix::Fix(coordinates) => {
                        return Some(WeatherQuery::Coordinates(coordinates));
                    }
                    LocationFix::Unavailable(reason) => match FallbackCause::try_from(reason) {
                        Ok(cause) => cause,
                        Err(_) => {
                            debug!("location request cancelled");
                            return None;
                        }
                    },
                }
            }
        };

        let city = self.deps.fallback.city_for(cause);
        info!(reason = %WeatherError::from(cause), city, "using fallback city");
        self.post(ScreenEvent::Notice(cause.notice()));
        Some(WeatherQuery::city(city))
    }

    /// Run the location-based cycle. The handle completes once the icon leg is done.
    pub async fn start(&self) -> Option<JoinHandle<()>> {
        let query = self.resolve_location_query().await?;
        self.submit(query)
    }

    /// User search. Blank input is ignored.
    pub fn search(&self, city: &str) -> Option<JoinHandle<()>> {
        let city = city.trim();
        if city.is_empty() {
            return None;
        }
        self.submit(WeatherQuery::city(city))
    }

    /// Start one independent fetch cycle; `None` once the session is closed.
    pub fn submit(&self, query: WeatherQuery) -> Option<JoinHandle<()>> {
        if self.closed.load(Ordering::SeqCst) {
            debug!(%query, "session closed; not fetching");
            return None;
        }

        let token = self.next_token.fetch_add(1, Ordering::SeqCst) + 1;
        self.post(ScreenEvent::Requesting(token));

        let source = Arc::clone(&self.deps.source);
        let icons = Arc::clone(&self.deps.icons);
        let events = self.events.clone();

        Some(tokio::spawn(async move {
            let outcome = source.fetch(&query).await;
            debug!(token, %query, success = outcome.is_success(), "fetch finished");

            let (icon_tx, icon_rx) = oneshot::channel();
            let completed = ScreenEvent::Completed { token, outcome, icon: icon_tx };
            if events.send(completed).is_err() {
                debug!(token, "screen gone; discarding result");
                return;
            }

            let Ok(Some(url)) = icon_rx.await else {
                return;
            };
            match icons.load_icon(&url).await {
                Ok(image) => {
                    let _ = events.send(ScreenEvent::Icon { token, image });
                }
                Err(e) => debug!(error = %e, %url, "icon load failed"),
            }
        }))
    }

    /// Screen went inactive: drop any pending location subscription.
    pub fn pause(&self) {
        self.deps.acquirer.cancel();
    }

    /// Screen is gone. Later completions become no-ops.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.pause();
        self.post(ScreenEvent::Close);
    }

    fn post(&self, event: ScreenEvent) {
        if self.events.send(event).is_err() {
            debug!("screen already closed");
        }
    }
}
