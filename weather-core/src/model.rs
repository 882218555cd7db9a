use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A geographic position in decimal degrees (WGS84).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// A fix is usable only when both components are finite and in range.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}, {:.4}", self.latitude, self.longitude)
    }
}

/// What the fetcher is asked to look up. Consumed once per fetch cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum WeatherQuery {
    CityName(String),
    Coordinates(Coordinates),
}

impl WeatherQuery {
    pub fn city(name: impl Into<String>) -> Self {
        WeatherQuery::CityName(name.into())
    }

    pub fn coordinates(latitude: f64, longitude: f64) -> Self {
        WeatherQuery::Coordinates(Coordinates::new(latitude, longitude))
    }
}

impl fmt::Display for WeatherQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeatherQuery::CityName(name) => write!(f, "city '{name}'"),
            WeatherQuery::Coordinates(c) => write!(f, "coordinates ({c})"),
        }
    }
}

/// Parsed result of one successful API response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    pub city: String,
    pub temperature_c: f64,
    pub condition: String,
    pub icon: String,
    pub humidity_pct: i64,
    pub wind_speed_mps: f64,
    pub sunrise: DateTime<Utc>,
}

/// Display-ready strings, one per widget on the screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayFields {
    pub city: String,
    pub temperature: String,
    pub condition: String,
    pub humidity: String,
    pub wind_speed: String,
    pub sunrise: String,
    pub icon_url: String,
}

/// Raw result of a fetch, handed to the presenter exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Success(String),
    NetworkFailure,
    NotFound,
    ParseFailure,
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success(_))
    }
}
