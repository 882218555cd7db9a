use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use std::{fmt::Debug, time::Duration};
use tracing::{debug, warn};

use crate::{
    config::Config,
    error::{ParseError, WeatherError},
    model::{FetchOutcome, WeatherQuery},
};

/// Build the process-wide HTTP client shared by every fetch.
pub fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("weather-cli/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")
}

/// The presenter labels values as °C and m/s, so only metric is ever requested.
const UNITS: &str = "metric";

/// Issues current-weather requests against an OpenWeather-compatible endpoint.
#[derive(Debug, Clone)]
pub struct WeatherFetcher {
    api_key: String,
    endpoint: Url,
    http: Client,
}

impl WeatherFetcher {
    pub fn new(api_key: String, endpoint: &str, http: Client) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .with_context(|| format!("Invalid weather endpoint URL: {endpoint}"))?;

        Ok(Self { api_key, endpoint, http })
    }

    pub fn from_config(config: &Config, http: Client) -> Result<Self> {
        Self::new(config.resolve_api_key()?, &config.endpoint, http)
    }

    /// Full request URL for a query, API key included.
    pub fn request_url(&self, query: &WeatherQuery) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut pairs = url.query_pairs_mut();
            match query {
                WeatherQuery::CityName(city) => {
                    pairs.append_pair("q", city);
                }
                WeatherQuery::Coordinates(c) => {
                    pairs
                        .append_pair("lat", &c.latitude.to_string())
                        .append_pair("lon", &c.longitude.to_string());
                }
            }
            pairs.append_pair("appid", &self.api_key).append_pair("units", UNITS);
        }
        url
    }

    /// One GET; returns the raw body on a 2xx response.
    pub async fn try_fetch(&self, query: &WeatherQuery) -> Result<String, WeatherError> {
        debug!(%query, endpoint = %self.endpoint, "requesting current weather");

        let res = self.http.get(self.request_url(query)).send().await.map_err(|e| {
            // reqwest includes the URL in its message; drop it so the key stays out of logs.
            let e = e.without_url();
            warn!(error = %e, %query, "weather request failed");
            WeatherError::NetworkFailure(e)
        })?;

        let status = res.status();
        if !status.is_success() {
            warn!(%status, %query, "weather API returned non-success status");
            return Err(WeatherError::NotFound(status.as_u16()));
        }

        res.text().await.map_err(|e| {
            warn!(error = %e.without_url(), "failed to read weather response body");
            WeatherError::ParseFailure(ParseError::Malformed("unreadable response body".into()))
        })
    }

    /// Like [`try_fetch`](Self::try_fetch), folded into the outcome the presenter consumes.
    pub async fn fetch(&self, query: &WeatherQuery) -> FetchOutcome {
        match self.try_fetch(query).await {
            Ok(body) => FetchOutcome::Success(body),
            Err(WeatherError::NotFound(_)) => FetchOutcome::NotFound,
            Err(WeatherError::ParseFailure(_)) => FetchOutcome::ParseFailure,
            Err(_) => FetchOutcome::NetworkFailure,
        }
    }
}

/// Anything that can run one fetch cycle's HTTP leg.
#[async_trait]
pub trait WeatherSource: Send + Sync + Debug {
    async fn fetch(&self, query: &WeatherQuery) -> FetchOutcome;
}

#[async_trait]
impl WeatherSource for WeatherFetcher {
    async fn fetch(&self, query: &WeatherQuery) -> FetchOutcome {
        WeatherFetcher::fetch(self, query).await
    }
}

/// URL of the condition icon for an icon code such as `10d`.
pub fn icon_url(base: &str, code: &str) -> String {
    format!("{}/{}@4x.png", base.trim_end_matches('/'), code)
}

/// Loads icon image bytes. Decoding is left to the view.
#[async_trait]
pub trait IconLoader: Send + Sync + Debug {
    async fn load_icon(&self, url: &str) -> Result<Vec<u8>, WeatherError>;
}

#[derive(Debug, Clone)]
pub struct HttpIconLoader {
    http: Client,
}

impl HttpIconLoader {
    pub fn new(http: Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl IconLoader for HttpIconLoader {
    async fn load_icon(&self, url: &str) -> Result<Vec<u8>, WeatherError> {
        let res = self.http.get(url).send().await?;
        let status = res.status();
        if !status.is_success() {
            return Err(WeatherError::NotFound(status.as_u16()));
        }
        Ok(res.bytes().await?.to_vec())
    }
}
