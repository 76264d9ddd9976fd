//! Geolocation boundary.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::record::GeoLocation;

/// Why a position could not be obtained.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeolocationError {
    /// The user or system refused location access.
    #[error("location permission denied")]
    PermissionDenied,

    /// The device could not determine its position.
    #[error("position unavailable: {0}")]
    PositionUnavailable(String),

    /// No fix arrived within the allowed time.
    #[error("timed out waiting for a position fix")]
    Timeout,
}

/// Options for a single position request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionOptions {
    /// Ask for the most accurate fix the device can give.
    pub high_accuracy: bool,
    /// Give up after this long.
    pub timeout: Duration,
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout: Duration::from_millis(5000),
        }
    }
}

/// A source of the device's current position.
///
/// A request that has started cannot be cancelled through this trait;
/// callers bound it with a timeout instead.
#[async_trait]
pub trait Geolocator: Send + Sync + std::fmt::Debug {
    /// Whether this device can report a position at all.
    fn is_supported(&self) -> bool;

    /// Request the current position.
    ///
    /// # Errors
    ///
    /// Returns a [`GeolocationError`] if no position can be obtained.
    async fn current_position(
        &self,
        options: &PositionOptions,
    ) -> Result<GeoLocation, GeolocationError>;
}

#[derive(Debug, Clone)]
enum Answer {
    Position(GeoLocation),
    Failure(GeolocationError),
    Unsupported,
}

/// A locator with a predetermined answer.
///
/// Used by the CLI for fixed posts (coordinates from configuration) and by
/// tests to drive every geolocation outcome.
#[derive(Debug)]
pub struct FixedGeolocator {
    answer: Answer,
    delay: Duration,
    requests: AtomicUsize,
}

impl FixedGeolocator {
    /// Always report `location`.
    #[must_use]
    pub fn at(location: GeoLocation) -> Self {
        Self::with_answer(Answer::Position(location))
    }

    /// Always fail with `error`.
    #[must_use]
    pub fn failing(error: GeolocationError) -> Self {
        Self::with_answer(Answer::Failure(error))
    }

    /// A device without geolocation.
    #[must_use]
    pub fn unsupported() -> Self {
        Self::with_answer(Answer::Unsupported)
    }

    /// Report `location` when given, otherwise behave as unsupported.
    #[must_use]
    pub fn from_option(location: Option<GeoLocation>) -> Self {
        location.map_or_else(Self::unsupported, Self::at)
    }

    /// Take `delay` to answer each request.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of position requests received so far.
    #[must_use]
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn with_answer(answer: Answer) -> Self {
        Self {
            answer,
            delay: Duration::ZERO,
            requests: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Geolocator for FixedGeolocator {
    fn is_supported(&self) -> bool {
        !matches!(self.answer, Answer::Unsupported)
    }

    async fn current_position(
        &self,
        options: &PositionOptions,
    ) -> Result<GeoLocation, GeolocationError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        debug!(
            high_accuracy = options.high_accuracy,
            timeout_ms = options.timeout.as_millis(),
            "Position requested"
        );

        if self.delay > options.timeout {
            tokio::time::sleep(options.timeout).await;
            return Err(GeolocationError::Timeout);
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match &self.answer {
            Answer::Position(location) => Ok(*location),
            Answer::Failure(error) => Err(error.clone()),
            Answer::Unsupported => Err(GeolocationError::PositionUnavailable(
                "geolocation is not supported on this device".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_options() -> PositionOptions {
        PositionOptions {
            high_accuracy: true,
            timeout: Duration::from_millis(50),
        }
    }

    #[test]
    fn test_position_options_default() {
        let options = PositionOptions::default();
        assert!(options.high_accuracy);
        assert_eq!(options.timeout, Duration::from_millis(5000));
    }

    #[test]
    fn test_geolocation_error_display() {
        assert!(GeolocationError::PermissionDenied
            .to_string()
            .contains("denied"));
        assert!(GeolocationError::Timeout.to_string().contains("timed out"));
        assert!(GeolocationError::PositionUnavailable("no satellites".to_string())
            .to_string()
            .contains("no satellites"));
    }

    #[tokio::test]
    async fn test_fixed_position() {
        let locator = FixedGeolocator::at(GeoLocation::new(10.0, 20.0).unwrap());
        assert!(locator.is_supported());

        let position = locator.current_position(&fast_options()).await.unwrap();
        assert_eq!(position, GeoLocation::new(10.0, 20.0).unwrap());
        assert_eq!(locator.requests(), 1);
    }

    #[tokio::test]
    async fn test_failing_locator() {
        let locator = FixedGeolocator::failing(GeolocationError::PermissionDenied);
        assert!(locator.is_supported());

        let err = locator.current_position(&fast_options()).await.unwrap_err();
        assert_eq!(err, GeolocationError::PermissionDenied);
    }

    #[test]
    fn test_unsupported_locator() {
        assert!(!FixedGeolocator::unsupported().is_supported());
        assert!(!FixedGeolocator::from_option(None).is_supported());
        assert!(FixedGeolocator::from_option(Some(GeoLocation::new(0.0, 0.0).unwrap()))
            .is_supported());
    }

    #[tokio::test]
    async fn test_delay_beyond_timeout_times_out() {
        let locator = FixedGeolocator::at(GeoLocation::new(1.0, 1.0).unwrap())
            .with_delay(Duration::from_secs(10));

        let err = locator.current_position(&fast_options()).await.unwrap_err();
        assert_eq!(err, GeolocationError::Timeout);
    }

    #[tokio::test]
    async fn test_delay_within_timeout_answers() {
        let locator = FixedGeolocator::at(GeoLocation::new(1.0, 1.0).unwrap())
            .with_delay(Duration::from_millis(5));

        assert!(locator.current_position(&fast_options()).await.is_ok());
    }
}
