//! Fetcher and icon loader against a mocked OpenWeather API.

use weather_core::{
    FetchOutcome, HttpIconLoader, IconLoader, Presenter, WeatherError, WeatherFetcher,
    WeatherQuery, WeatherView,
    location::{IpLocationProvider, LocationAcquirer, LocationFix, LocationRequest},
};
use std::{sync::Arc, time::Duration};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path, query_param},
};

// =============================================================================
// Test Helpers
// =============================================================================

fn london_response() -> serde_json::Value {
    serde_json::json!({
        "coord": { "lon": -0.1257, "lat": 51.5085 },
        "name": "London",
        "main": { "temp": 15.2, "feels_like": 14.6, "humidity": 80 },
        "weather": [{ "id": 500, "main": "Rain", "description": "light rain", "icon": "10d" }],
        "wind": { "speed": 4.1, "deg": 240 },
        "sys": { "country": "GB", "sunrise": 1700000000, "sunset": 1700031600 }
    })
}

fn fetcher(server: &MockServer) -> WeatherFetcher {
    WeatherFetcher::new(
        "test_key".to_string(),
        &format!("{}/data/2.5/weather", server.uri()),
        reqwest::Client::new(),
    )
    .expect("valid endpoint")
}

#[derive(Debug, Default)]
struct TextView {
    lines: Vec<String>,
}

impl WeatherView for TextView {
    fn set_city(&mut self, text: &str) {
        self.lines.push(format!("city={text}"));
    }
    fn set_temperature(&mut self, text: &str) {
        self.lines.push(format!("temp={text}"));
    }
    fn set_condition(&mut self, text: &str) {
        self.lines.push(format!("condition={text}"));
    }
    fn set_humidity(&mut self, text: &str) {
        self.lines.push(format!("humidity={text}"));
    }
    fn set_wind_speed(&mut self, text: &str) {
        self.lines.push(format!("wind={text}"));
    }
    fn set_sunrise(&mut self, text: &str) {
        self.lines.push(format!("sunrise={text}"));
    }
    fn set_icon(&mut self, image: &[u8]) {
        self.lines.push(format!("icon={} bytes", image.len()));
    }
    fn show_notice(&mut self, text: &str) {
        self.lines.push(format!("notice={text}"));
    }
}

// =============================================================================
// Weather requests
// =============================================================================

#[tokio::test]
async fn city_query_sends_expected_parameters() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .and(query_param("q", "London"))
        .and(query_param("appid", "test_key"))
        .and(query_param("units", "metric"))
        .respond_with(ResponseTemplate::new(200).set_body_json(london_response()))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = fetcher(&server).fetch(&WeatherQuery::city("London")).await;

    assert!(outcome.is_success());
}

#[tokio::test]
async fn coordinate_query_sends_lat_lon() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .and(query_param("lat", "51.5085"))
        .and(query_param("lon", "-0.1257"))
        .and(query_param("units", "metric"))
        .respond_with(ResponseTemplate::new(200).set_body_json(london_response()))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = fetcher(&server).fetch(&WeatherQuery::coordinates(51.5085, -0.1257)).await;

    assert!(outcome.is_success());
}

#[tokio::test]
async fn non_success_status_maps_to_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(serde_json::json!({ "cod": "404", "message": "city not found" })),
        )
        .mount(&server)
        .await;

    let fetcher = fetcher(&server);
    let query = WeatherQuery::city("Atlantis");

    assert_eq!(fetcher.fetch(&query).await, FetchOutcome::NotFound);
    assert!(matches!(fetcher.try_fetch(&query).await, Err(WeatherError::NotFound(404))));
}

#[tokio::test]
async fn server_error_also_maps_to_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    assert_eq!(
        fetcher(&server).fetch(&WeatherQuery::city("London")).await,
        FetchOutcome::NotFound
    );
}

#[tokio::test]
async fn unreachable_host_is_network_failure() {
    let fetcher = WeatherFetcher::new(
        "test_key".to_string(),
        "http://127.0.0.1:9/data/2.5/weather",
        reqwest::Client::builder().timeout(Duration::from_secs(2)).build().unwrap(),
    )
    .unwrap();

    let err = fetcher.try_fetch(&WeatherQuery::city("London")).await.unwrap_err();
    assert!(matches!(err, WeatherError::NetworkFailure(_)));
    assert!(!err.to_string().contains("test_key"));
}

#[tokio::test]
async fn fetched_body_renders_every_field() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(london_response()))
        .mount(&server)
        .await;

    let outcome = fetcher(&server).fetch(&WeatherQuery::city("London")).await;
    let mut presenter = Presenter::with_zone(TextView::default(), chrono::Utc);
    let icon = presenter.render(outcome);

    assert_eq!(
        presenter.view().lines,
        vec![
            "city=London",
            "temp=15°C",
            "condition=Light rain",
            "humidity=80%",
            "wind=4.1 m/s",
            "sunrise=10:13 PM",
        ]
    );
    assert_eq!(icon.as_deref(), Some("https://openweathermap.org/img/wn/10d@4x.png"));
}

#[tokio::test]
async fn truncated_body_shows_parse_notice() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"name":"London","main":"#))
        .mount(&server)
        .await;

    let outcome = fetcher(&server).fetch(&WeatherQuery::city("London")).await;
    let mut presenter = Presenter::with_zone(TextView::default(), chrono::Utc);
    presenter.render(outcome);

    assert_eq!(presenter.view().lines, vec!["notice=Error parsing weather data"]);
}

// =============================================================================
// Icons
// =============================================================================

#[tokio::test]
async fn icon_loader_returns_image_bytes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/img/wn/10d@4x.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0x89, b'P', b'N', b'G']))
        .mount(&server)
        .await;

    let loader = HttpIconLoader::new(reqwest::Client::new());
    let url = weather_core::fetcher::icon_url(&format!("{}/img/wn", server.uri()), "10d");
    let bytes = loader.load_icon(&url).await.unwrap();

    assert_eq!(bytes, vec![0x89, b'P', b'N', b'G']);
}

#[tokio::test]
async fn missing_icon_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let loader = HttpIconLoader::new(reqwest::Client::new());
    let result = loader.load_icon(&format!("{}/img/wn/xx@4x.png", server.uri())).await;

    assert!(matches!(result, Err(WeatherError::NotFound(404))));
}

// =============================================================================
// IP geolocation
// =============================================================================

#[tokio::test]
async fn ip_geolocation_yields_fix() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/json/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "success", "lat": 52.52, "lon": 13.405, "city": "Berlin"
        })))
        .mount(&server)
        .await;

    let provider =
        IpLocationProvider::with_url(reqwest::Client::new(), format!("{}/json/", server.uri()));
    let acquirer = LocationAcquirer::new(Arc::new(provider));
    let fix = acquirer
        .get_one_location_fix(Duration::from_secs(5), &LocationRequest::default())
        .await;

    assert_eq!(fix, LocationFix::Fix(weather_core::Coordinates::new(52.52, 13.405)));
}

#[tokio::test]
async fn failed_ip_lookup_is_no_valid_fix() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "fail", "message": "private range"
        })))
        .mount(&server)
        .await;

    let provider =
        IpLocationProvider::with_url(reqwest::Client::new(), format!("{}/json/", server.uri()));
    let acquirer = LocationAcquirer::new(Arc::new(provider));
    let fix = acquirer
        .get_one_location_fix(Duration::from_secs(5), &LocationRequest::default())
        .await;

    assert_eq!(
        fix,
        LocationFix::Unavailable(weather_core::location::Unavailable::NoValidFix)
    );
}
