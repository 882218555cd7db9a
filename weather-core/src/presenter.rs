//! Turns a fetch outcome into widget text.
//!
//! Parsing walks the JSON document field by field so a failure names the
//! exact path that was missing or mistyped. The user only ever sees one
//! generic notice for all of them; the detail goes to the log.

use chrono::{DateTime, Local, TimeZone, Utc};
use serde_json::Value;
use std::fmt::Display;
use tracing::{debug, warn};

use crate::{
    config::DEFAULT_ICON_BASE_URL,
    error::{NOTICE_NETWORK_FAILURE, NOTICE_NOT_FOUND, NOTICE_PARSE_FAILURE, ParseError},
    fetcher::icon_url,
    model::{DisplayFields, FetchOutcome, WeatherReport},
};

/// The screen's widgets. Every write happens on the task that owns the view.
pub trait WeatherView: Send {
    fn set_city(&mut self, text: &str);
    fn set_temperature(&mut self, text: &str);
    fn set_condition(&mut self, text: &str);
    fn set_humidity(&mut self, text: &str);
    fn set_wind_speed(&mut self, text: &str);
    fn set_sunrise(&mut self, text: &str);
    fn set_icon(&mut self, image: &[u8]);
    /// Short-lived message; must not touch the other widgets.
    fn show_notice(&mut self, text: &str);

    /// Called once a batch of widget writes is complete.
    fn refresh(&mut self) {}
}

/// Where a fetch cycle currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CycleState {
    #[default]
    Idle,
    Requesting,
    Rendered,
    ErrorShown,
}

pub fn parse_report(body: &str) -> Result<WeatherReport, ParseError> {
    let doc: Value =
        serde_json::from_str(body).map_err(|e| ParseError::Malformed(e.to_string()))?;

    let city = string_at(&doc, &["name"])?;
    let temperature_c = number_at(&doc, &["main", "temp"])?;
    let humidity_pct = integer_at(&doc, &["main", "humidity"])?;

    let first_weather = doc
        .get("weather")
        .ok_or_else(|| ParseError::MissingField("weather".into()))?
        .as_array()
        .ok_or_else(|| wrong_type("weather", "an array"))?
        .first()
        .ok_or_else(|| ParseError::MissingField("weather[0]".into()))?;
    let condition = string_at(first_weather, &["description"])
        .map_err(|e| prefix_path(e, "weather[0]"))?;
    let icon =
        string_at(first_weather, &["icon"]).map_err(|e| prefix_path(e, "weather[0]"))?;

    let wind_speed_mps = number_at(&doc, &["wind", "speed"])?;
    let sunrise_ts = integer_at(&doc, &["sys", "sunrise"])?;
    let sunrise = DateTime::<Utc>::from_timestamp(sunrise_ts, 0)
        .ok_or_else(|| wrong_type("sys.sunrise", "a valid epoch timestamp"))?;

    Ok(WeatherReport {
        city,
        temperature_c,
        condition,
        icon,
        humidity_pct,
        wind_speed_mps,
        sunrise,
    })
}

fn lookup<'a>(doc: &'a Value, path: &[&str]) -> Result<&'a Value, ParseError> {
    let mut current = doc;
    for (depth, key) in path.iter().enumerate() {
        current = current
            .get(key)
            .ok_or_else(|| ParseError::MissingField(path[..=depth].join(".")))?;
    }
    Ok(current)
}

fn string_at(doc: &Value, path: &[&str]) -> Result<String, ParseError> {
    lookup(doc, path)?
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| wrong_type(&path.join("."), "a string"))
}

fn number_at(doc: &Value, path: &[&str]) -> Result<f64, ParseError> {
    lookup(doc, path)?.as_f64().ok_or_else(|| wrong_type(&path.join("."), "a number"))
}

/// Integers may arrive as `80` or `80.0`; fractions are truncated.
fn integer_at(doc: &Value, path: &[&str]) -> Result<i64, ParseError> {
    let value = lookup(doc, path)?;
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
        .ok_or_else(|| wrong_type(&path.join("."), "an integer"))
}

fn wrong_type(field: &str, expected: &'static str) -> ParseError {
    ParseError::WrongType { field: field.to_string(), expected }
}

fn prefix_path(err: ParseError, prefix: &str) -> ParseError {
    match err {
        ParseError::MissingField(f) => ParseError::MissingField(format!("{prefix}.{f}")),
        ParseError::WrongType { field, expected } => {
            ParseError::WrongType { field: format!("{prefix}.{field}"), expected }
        }
        other => other,
    }
}

/// `21.7` → `"22°C"`. Halves round away from zero.
/// Round half away from zero on the shortest decimal form of `value`, so
/// `1.25` keeps its trailing 5 instead of becoming `1.2499999...`. A result
/// of zero never carries a sign.
fn round_half_up(value: f64, places: usize) -> String {
    if !value.is_finite() {
        return format!("{value:.places$}");
    }
    let repr = value.abs().to_string();
    let (whole, frac) = repr.split_once('.').unwrap_or((repr.as_str(), ""));

    let mut digits = whole.to_string();
    digits.extend(frac.chars().chain(std::iter::repeat('0')).take(places));
    let Ok(mut scaled) = digits.parse::<u128>() else {
        return format!("{value:.places$}");
    };
    if frac.as_bytes().get(places).is_some_and(|d| *d >= b'5') {
        scaled += 1;
    }

    let mut out = format!("{scaled:0>width$}", width = places + 1);
    if places > 0 {
        out.insert(out.len() - places, '.');
    }
    if value.is_sign_negative() && scaled != 0 {
        out.insert(0, '-');
    }
    out
}

pub fn format_temperature(celsius: f64) -> String {
    format!("{}°C", round_half_up(celsius, 0))
}

pub fn format_humidity(pct: i64) -> String {
    format!("{pct}%")
}

pub fn format_wind_speed(mps: f64) -> String {
    format!("{} m/s", round_half_up(mps, 1))
}

/// Clock time such as `7:04 AM` in the given zone.
pub fn format_sunrise<Tz>(sunrise: DateTime<Utc>, zone: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    sunrise.with_timezone(zone).format("%-I:%M %p").to_string()
}

pub fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn display_fields<Tz>(report: &WeatherReport, zone: &Tz, icon_base_url: &str) -> DisplayFields
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    DisplayFields {
        city: report.city.clone(),
        temperature: format_temperature(report.temperature_c),
        condition: capitalize(&report.condition),
        humidity: format_humidity(report.humidity_pct),
        wind_speed: format_wind_speed(report.wind_speed_mps),
        sunrise: format_sunrise(report.sunrise, zone),
        icon_url: icon_url(icon_base_url, &report.icon),
    }
}

/// Owns the view and applies fetch outcomes to it.
#[derive(Debug)]
pub struct Presenter<V, Tz = Local> {
    view: V,
    zone: Tz,
    icon_base_url: String,
    state: CycleState,
}

impl<V: WeatherView> Presenter<V, Local> {
    pub fn new(view: V) -> Self {
        Self::with_zone(view, Local)
    }
}

impl<V, Tz> Presenter<V, Tz>
where
    V: WeatherView,
    Tz: TimeZone + Send,
    Tz::Offset: Display,
{
    pub fn with_zone(view: V, zone: Tz) -> Self {
        Self {
            view,
            zone,
            icon_base_url: DEFAULT_ICON_BASE_URL.to_string(),
            state: CycleState::Idle,
        }
    }

    pub fn icon_base_url(mut self, base: impl Into<String>) -> Self {
        self.icon_base_url = base.into();
        self
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn into_view(self) -> V {
        self.view
    }

    pub fn begin_request(&mut self) {
        self.state = CycleState::Requesting;
    }

    /// Apply one outcome. Returns the icon URL to load when the fields were written.
    pub fn render(&mut self, outcome: FetchOutcome) -> Option<String> {
        let body = match outcome {
            FetchOutcome::Success(body) => body,
            FetchOutcome::NetworkFailure => return self.fail(NOTICE_NETWORK_FAILURE),
            FetchOutcome::NotFound => return self.fail(NOTICE_NOT_FOUND),
            FetchOutcome::ParseFailure => return self.fail(NOTICE_PARSE_FAILURE),
        };

        let report = match parse_report(&body) {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "unexpected weather payload");
                return self.fail(NOTICE_PARSE_FAILURE);
            }
        };

        let fields = display_fields(&report, &self.zone, &self.icon_base_url);
        debug!(city = %fields.city, temp = %fields.temperature, "rendering report");

        self.view.set_city(&fields.city);
        self.view.set_temperature(&fields.temperature);
        self.view.set_condition(&fields.condition);
        self.view.set_humidity(&fields.humidity);
        self.view.set_wind_speed(&fields.wind_speed);
        self.view.set_sunrise(&fields.sunrise);
        self.view.refresh();
        self.state = CycleState::Rendered;

        Some(fields.icon_url)
    }

    pub fn apply_icon(&mut self, image: &[u8]) {
        self.view.set_icon(image);
        self.view.refresh();
    }

    pub fn notify(&mut self, text: &str) {
        self.view.show_notice(text);
    }

    fn fail(&mut self, notice: &str) -> Option<String> {
        self.view.show_notice(notice);
        self.state = CycleState::ErrorShown;
        None
    }
}
