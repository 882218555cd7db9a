//! Core library for the `weather` CLI.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - The location permission gate and single-shot location acquirer
//! - The OpenWeather fetcher and the presenter that formats its responses
//! - A session controller that chains them for one screen
//!
//! It is used by `weather-cli`, but can also be reused by other front ends.

pub mod config;
pub mod error;
pub mod fetcher;
pub mod location;
pub mod model;
pub mod permission;
pub mod presenter;
pub mod session;

pub use config::{Config, FallbackConfig, LocationConfig, LocationSource, PermissionMode};
pub use error::{ParseError, WeatherError};
pub use fetcher::{HttpIconLoader, IconLoader, WeatherFetcher, WeatherSource};
pub use location::{LocationAcquirer, LocationFix, LocationProvider};
pub use model::{Coordinates, DisplayFields, FetchOutcome, WeatherQuery, WeatherReport};
pub use permission::{PermissionGate, PermissionStatus, SessionPermission, StaticPermission};
pub use presenter::{Presenter, WeatherView};
pub use session::{Screen, Session, SessionDeps};
