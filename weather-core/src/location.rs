//! Single-shot location fixes.
//!
//! A [`LocationProvider`] stands in for the platform location service: it
//! reports whether location services are on and hands out subscriptions that
//! deliver batches of readings. [`LocationAcquirer`] turns a subscription into
//! exactly one answer and deregisters as soon as it has it.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::{
    fmt::Debug,
    future::Future,
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tokio::{
    sync::mpsc,
    task::{AbortHandle, JoinHandle},
};
use tracing::{Instrument, debug, info, warn};

use crate::{error::WeatherError, model::Coordinates};

pub const IP_API_URL: &str = "http://ip-api.com/json/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    #[default]
    HighAccuracy,
    Balanced,
    LowPower,
}

/// Subscription parameters passed to the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationRequest {
    pub priority: Priority,
    pub interval: Duration,
    pub min_update_interval: Duration,
    pub max_update_delay: Duration,
}

impl Default for LocationRequest {
    fn default() -> Self {
        Self {
            priority: Priority::HighAccuracy,
            interval: Duration::from_secs(10),
            min_update_interval: Duration::from_secs(5),
            max_update_delay: Duration::from_secs(15),
        }
    }
}

/// Why no coordinates came back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unavailable {
    ServicesDisabled,
    NoValidFix,
    TimedOut,
    /// The subscription was removed before any reading arrived.
    Cancelled,
}

/// Why the fallback city is being shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackCause {
    ServicesDisabled,
    PermissionDenied,
    NoValidFix,
    TimedOut,
}

impl FallbackCause {
    pub fn notice(&self) -> &'static str {
        WeatherError::from(*self).user_message()
    }
}

impl From<FallbackCause> for WeatherError {
    fn from(cause: FallbackCause) -> Self {
        match cause {
            FallbackCause::PermissionDenied => WeatherError::PermissionDenied,
            FallbackCause::ServicesDisabled => {
                WeatherError::LocationUnavailable(Unavailable::ServicesDisabled)
            }
            FallbackCause::NoValidFix => WeatherError::LocationUnavailable(Unavailable::NoValidFix),
            FallbackCause::TimedOut => WeatherError::LocationUnavailable(Unavailable::TimedOut),
        }
    }
}

impl TryFrom<Unavailable> for FallbackCause {
    type Error = Unavailable;

    fn try_from(value: Unavailable) -> Result<Self, Self::Error> {
        match value {
            Unavailable::ServicesDisabled => Ok(FallbackCause::ServicesDisabled),
            Unavailable::NoValidFix => Ok(FallbackCause::NoValidFix),
            Unavailable::TimedOut => Ok(FallbackCause::TimedOut),
            Unavailable::Cancelled => Err(value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocationFix {
    Fix(Coordinates),
    Unavailable(Unavailable),
}

/// One batch of readings; entries may be empty slots.
pub type LocationBatch = Vec<Option<Coordinates>>;

/// A live subscription. Dropping it deregisters.
#[derive(Debug)]
pub struct LocationUpdates {
    rx: mpsc::Receiver<LocationBatch>,
    task: Option<JoinHandle<()>>,
}

impl LocationUpdates {
    /// Calls `poll` every `interval` and forwards each batch until deregistered.
    pub fn spawn_polling<F, Fut>(interval: Duration, mut poll: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = LocationBatch> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(1);
        let task = tokio::spawn(async move {
            loop {
                let batch = poll().await;
                if tx.send(batch).await.is_err() {
                    break;
                }
                tokio::time::sleep(interval).await;
            }
        });
        Self { rx, task: Some(task) }
    }

    /// A subscription that never delivers anything.
    pub fn closed() -> Self {
        let (_, rx) = mpsc::channel(1);
        Self { rx, task: None }
    }

    pub async fn next_batch(&mut self) -> Option<LocationBatch> {
        self.rx.recv().await
    }

    fn abort_handle(&self) -> Option<AbortHandle> {
        self.task.as_ref().map(JoinHandle::abort_handle)
    }

    /// Stop further updates.
    pub fn remove(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.rx.close();
    }
}

impl Drop for LocationUpdates {
    fn drop(&mut self) {
        self.remove();
    }
}

pub trait LocationProvider: Send + Sync + Debug {
    fn services_enabled(&self) -> bool;

    fn request_updates(&self, request: &LocationRequest) -> LocationUpdates;
}

/// Location services switched off.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledLocationProvider;

impl LocationProvider for DisabledLocationProvider {
    fn services_enabled(&self) -> bool {
        false
    }

    fn request_updates(&self, _request: &LocationRequest) -> LocationUpdates {
        LocationUpdates::closed()
    }
}

/// Always reports the same position.
#[derive(Debug, Clone, Copy)]
pub struct FixedLocationProvider {
    coordinates: Coordinates,
}

impl FixedLocationProvider {
    pub fn new(coordinates: Coordinates) -> Self {
        Self { coordinates }
    }
}

impl LocationProvider for FixedLocationProvider {
    fn services_enabled(&self) -> bool {
        true
    }

    fn request_updates(&self, request: &LocationRequest) -> LocationUpdates {
        let coordinates = self.coordinates;
        LocationUpdates::spawn_polling(request.interval, move || async move {
            vec![Some(coordinates)]
        })
    }
}

/// Approximate position from IP geolocation (ip-api.com).
#[derive(Debug, Clone)]
pub struct IpLocationProvider {
    http: Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct IpApiResponse {
    status: String,
    lat: Option<f64>,
    lon: Option<f64>,
    #[serde(default)]
    city: Option<String>,
}

impl IpLocationProvider {
    pub fn new(http: Client) -> Self {
        Self::with_url(http, IP_API_URL)
    }

    pub fn with_url(http: Client, url: impl Into<String>) -> Self {
        Self { http, url: url.into() }
    }

    async fn lookup(http: &Client, url: &str) -> Option<Coordinates> {
        let res = match http.get(url).query(&[("fields", "status,lat,lon,city")]).send().await {
            Ok(res) => res,
            Err(e) => {
                warn!(error = %e, "geolocation service unavailable");
                return None;
            }
        };

        let parsed: IpApiResponse = match res.json().await {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "failed to parse geolocation response");
                return None;
            }
        };

        if parsed.status != "success" {
            warn!(status = %parsed.status, "geolocation lookup rejected");
            return None;
        }

        let coordinates = Coordinates::new(parsed.lat?, parsed.lon?);
        info!(
            lat = coordinates.latitude,
            lon = coordinates.longitude,
            city = parsed.city.as_deref().unwrap_or("?"),
            "geolocation resolution successful"
        );
        Some(coordinates)
    }
}

impl LocationProvider for IpLocationProvider {
    fn services_enabled(&self) -> bool {
        true
    }

    fn request_updates(&self, request: &LocationRequest) -> LocationUpdates {
        let http = self.http.clone();
        let url = self.url.clone();
        LocationUpdates::spawn_polling(request.interval, move || {
            let http = http.clone();
            let url = url.clone();
            async move { vec![Self::lookup(&http, &url).await] }
        })
    }
}

/// Turns a provider subscription into one fix.
///
/// Several fixes may be pending at once; [`cancel`](Self::cancel) removes all
/// of them, including one whose subscription is still being registered.
#[derive(Debug)]
pub struct LocationAcquirer {
    provider: Arc<dyn LocationProvider>,
    active: Mutex<HashMap<u64, AbortHandle>>,
    next_id: AtomicU64,
    cancel_epoch: AtomicU64,
}

impl LocationAcquirer {
    pub fn new(provider: Arc<dyn LocationProvider>) -> Self {
        Self {
            provider,
            active: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            cancel_epoch: AtomicU64::new(0),
        }
    }

    /// Wait up to `timeout` for the first batch of readings.
    pub async fn get_one_location_fix(
        &self,
        timeout: Duration,
        request: &LocationRequest,
    ) -> LocationFix {
        let span = tracing::info_span!("location.fix", priority = ?request.priority);

        async move {
            let epoch = self.cancel_epoch.load(Ordering::SeqCst);

            if !self.provider.services_enabled() {
                info!("location services disabled");
                return LocationFix::Unavailable(Unavailable::ServicesDisabled);
            }

            let mut updates = self.provider.request_updates(request);
            let id = self.register(updates.abort_handle());

            // A cancel that ran before the handle was registered could not abort it.
            if self.cancel_epoch.load(Ordering::SeqCst) != epoch {
                debug!("cancelled while subscribing");
                updates.remove();
                self.unregister(id);
                return LocationFix::Unavailable(Unavailable::Cancelled);
            }

            let first = tokio::time::timeout(timeout, updates.next_batch()).await;
            updates.remove();
            self.unregister(id);

            let fix = match first {
                Err(_) => LocationFix::Unavailable(Unavailable::TimedOut),
                Ok(None) => LocationFix::Unavailable(Unavailable::Cancelled),
                Ok(Some(batch)) => batch
                    .into_iter()
                    .flatten()
                    .find(Coordinates::is_valid)
                    .map_or(LocationFix::Unavailable(Unavailable::NoValidFix), LocationFix::Fix),
            };
            debug!(?fix, "location request finished");
            fix
        }
        .instrument(span)
        .await
    }

    /// Deregister every pending subscription.
    pub fn cancel(&self) {
        self.cancel_epoch.fetch_add(1, Ordering::SeqCst);
        let pending: Vec<_> = self.lock_active().drain().map(|(_, handle)| handle).collect();
        if !pending.is_empty() {
            debug!(count = pending.len(), "removing pending location updates");
        }
        for handle in pending {
            handle.abort();
        }
    }

    fn register(&self, handle: Option<AbortHandle>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = handle {
            self.lock_active().insert(id, handle);
        }
        id
    }

    fn unregister(&self, id: u64) {
        self.lock_active().remove(&id);
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, HashMap<u64, AbortHandle>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
