use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::location::{FallbackCause, LocationRequest, Priority};

/// Environment variable that overrides the configured API key.
pub const API_KEY_ENV: &str = "OPENWEATHER_API_KEY";

pub const DEFAULT_ENDPOINT: &str = "https://api.openweathermap.org/data/2.5/weather";
pub const DEFAULT_ICON_BASE_URL: &str = "https://openweathermap.org/img/wn";

/// Cities substituted when no location can be used.
///
/// Example TOML:
/// [fallback]
/// city = "London"
/// permission_denied = "Paris"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    pub city: String,
    pub services_disabled: Option<String>,
    pub permission_denied: Option<String>,
    pub no_fix: Option<String>,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            city: "London".to_string(),
            services_disabled: None,
            permission_denied: None,
            no_fix: None,
        }
    }
}

impl FallbackConfig {
    /// City to query for a given cause; falls back to `city` when no override is set.
    pub fn city_for(&self, cause: FallbackCause) -> &str {
        let override_city = match cause {
            FallbackCause::ServicesDisabled => self.services_disabled.as_deref(),
            FallbackCause::PermissionDenied => self.permission_denied.as_deref(),
            FallbackCause::NoValidFix | FallbackCause::TimedOut => self.no_fix.as_deref(),
        };
        override_city.unwrap_or(&self.city)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LocationSource {
    #[default]
    Ip,
    Fixed,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PermissionMode {
    #[default]
    Ask,
    Granted,
    Denied,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    pub source: LocationSource,
    pub permission: PermissionMode,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub priority: Priority,
    pub interval_ms: u64,
    pub min_update_interval_ms: u64,
    pub max_update_delay_ms: u64,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            source: LocationSource::default(),
            permission: PermissionMode::default(),
            latitude: None,
            longitude: None,
            priority: Priority::HighAccuracy,
            interval_ms: 10_000,
            min_update_interval_ms: 5_000,
            max_update_delay_ms: 15_000,
        }
    }
}

impl LocationConfig {
    pub fn request(&self) -> LocationRequest {
        LocationRequest {
            priority: self.priority,
            interval: Duration::from_millis(self.interval_ms),
            min_update_interval: Duration::from_millis(self.min_update_interval_ms),
            max_update_delay: Duration::from_millis(self.max_update_delay_ms),
        }
    }

    /// How long to wait for the first fix before giving up.
    pub fn fix_timeout(&self) -> Duration {
        Duration::from_millis(self.max_update_delay_ms)
    }
}

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// OpenWeather API key; `OPENWEATHER_API_KEY` takes precedence.
    pub api_key: Option<String>,
    pub endpoint: String,
    pub icon_base_url: String,
    pub http_timeout_secs: u64,
    pub fallback: FallbackConfig,
    pub location: LocationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            icon_base_url: DEFAULT_ICON_BASE_URL.to_string(),
            http_timeout_secs: 10,
            fallback: FallbackConfig::default(),
            location: LocationConfig::default(),
        }
    }
}

impl Config {
    /// Load config from disk, or return an empty default if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_file_path()?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "weather-task", "weather-cli")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// API key from the environment, else from the file.
    pub fn resolve_api_key(&self) -> Result<String> {
        self.resolve_api_key_with(std::env::var(API_KEY_ENV).ok())
    }

    fn resolve_api_key_with(&self, from_env: Option<String>) -> Result<String> {
        from_env
            .filter(|k| !k.trim().is_empty())
            .or_else(|| self.api_key.clone().filter(|k| !k.trim().is_empty()))
            .ok_or_else(|| {
                anyhow!(
                    "No OpenWeather API key configured.\n\
                     Hint: run `weather configure` or set {API_KEY_ENV}."
                )
            })
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_errors_when_not_set() {
        let cfg = Config::default();
        let err = cfg.resolve_api_key_with(None).unwrap_err();

        assert!(err.to_string().contains("No OpenWeather API key configured"));
    }

    #[test]
    fn env_api_key_overrides_file() {
        let cfg = Config { api_key: Some("FILE_KEY".into()), ..Config::default() };

        assert_eq!(cfg.resolve_api_key_with(Some("ENV_KEY".into())).unwrap(), "ENV_KEY");
        assert_eq!(cfg.resolve_api_key_with(Some("  ".into())).unwrap(), "FILE_KEY");
        assert_eq!(cfg.resolve_api_key_with(None).unwrap(), "FILE_KEY");
    }

    #[test]
    fn fallback_uses_single_city_by_default() {
        let fallback = FallbackConfig::default();

        assert_eq!(fallback.city_for(FallbackCause::ServicesDisabled), "London");
        assert_eq!(fallback.city_for(FallbackCause::PermissionDenied), "London");
        assert_eq!(fallback.city_for(FallbackCause::NoValidFix), "London");
        assert_eq!(fallback.city_for(FallbackCause::TimedOut), "London");
    }

    #[test]
    fn fallback_overrides_apply_per_cause() {
        let fallback = FallbackConfig {
            city: "London".into(),
            services_disabled: None,
            permission_denied: Some("Paris".into()),
            no_fix: Some("New York".into()),
        };

        assert_eq!(fallback.city_for(FallbackCause::ServicesDisabled), "London");
        assert_eq!(fallback.city_for(FallbackCause::PermissionDenied), "Paris");
        assert_eq!(fallback.city_for(FallbackCause::NoValidFix), "New York");
        assert_eq!(fallback.city_for(FallbackCause::TimedOut), "New York");
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut cfg = Config::default();
        cfg.api_key = Some("KEY".into());
        cfg.location.source = LocationSource::Fixed;
        cfg.location.latitude = Some(51.5);
        cfg.location.longitude = Some(-0.12);
        cfg.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "api_key = \"abc\"\n[fallback]\ncity = \"Oslo\"\n").unwrap();

        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg.api_key.as_deref(), Some("abc"));
        assert_eq!(cfg.fallback.city, "Oslo");
        assert_eq!(cfg.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(cfg.location.interval_ms, 10_000);
        assert_eq!(cfg.location.permission, PermissionMode::Ask);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn location_request_uses_configured_timings() {
        let req = LocationConfig::default().request();
        assert_eq!(req.priority, Priority::HighAccuracy);
        assert_eq!(req.interval, Duration::from_secs(10));
        assert_eq!(req.min_update_interval, Duration::from_secs(5));
        assert_eq!(req.max_update_delay, Duration::from_secs(15));
    }
}
