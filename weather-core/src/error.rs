//! Error types surfaced by the fetch cycle.

use thiserror::Error;

use crate::location::Unavailable;

pub const NOTICE_NETWORK_FAILURE: &str = "Failed to fetch weather";
pub const NOTICE_NOT_FOUND: &str = "City not found";
pub const NOTICE_PARSE_FAILURE: &str = "Error parsing weather data";

/// Why a response body could not be turned into a report.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("malformed JSON document: {0}")]
    Malformed(String),

    #[error("missing field `{0}`")]
    MissingField(String),

    #[error("field `{field}` is not {expected}")]
    WrongType {
        field: String,
        expected: &'static str,
    },
}

/// Every failure a fetch cycle can hit. All are recoverable.
#[derive(Error, Debug)]
pub enum WeatherError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("location unavailable: {0:?}")]
    LocationUnavailable(Unavailable),

    #[error("network failure: {0}")]
    NetworkFailure(#[from] reqwest::Error),

    #[error("weather API returned status {0}")]
    NotFound(u16),

    #[error("could not parse weather data: {0}")]
    ParseFailure(#[from] ParseError),
}

impl WeatherError {
    /// Short notice text shown to the user.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::PermissionDenied => "Location permission denied. Showing default weather.",
            Self::LocationUnavailable(Unavailable::ServicesDisabled) => {
                "Please enable location services"
            }
            Self::LocationUnavailable(_) => "Could not get location. Showing default.",
            Self::NetworkFailure(_) => NOTICE_NETWORK_FAILURE,
            Self::NotFound(_) => NOTICE_NOT_FOUND,
            Self::ParseFailure(_) => NOTICE_PARSE_FAILURE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_errors_share_one_user_message() {
        let missing = WeatherError::from(ParseError::MissingField("main.temp".into()));
        let malformed = WeatherError::from(ParseError::Malformed("eof".into()));

        assert_eq!(missing.user_message(), "Error parsing weather data");
        assert_eq!(missing.user_message(), malformed.user_message());
    }

    #[test]
    fn location_notices_depend_on_reason() {
        assert_eq!(
            WeatherError::LocationUnavailable(Unavailable::ServicesDisabled).user_message(),
            "Please enable location services"
        );
        assert_eq!(
            WeatherError::LocationUnavailable(Unavailable::TimedOut).user_message(),
            "Could not get location. Showing default."
        );
    }

    #[test]
    fn parse_error_keeps_field_for_diagnosis() {
        let err = ParseError::WrongType { field: "wind.speed".into(), expected: "a number" };
        assert_eq!(err.to_string(), "field `wind.speed` is not a number");
    }
}
