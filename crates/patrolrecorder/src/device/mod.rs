//! Device boundaries: the code reader and the geolocation source.
//!
//! Both are traits so the scan controller never depends on a concrete
//! camera or GPS. The adapters shipped here cover terminals (a line-based
//! reader for keyboard-wedge scanners), scripted replays for tests and
//! one-shot runs, and a fixed-position locator.

mod geo;
mod line;
mod scripted;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Notify};

use crate::error::Result;

pub use geo::{FixedGeolocator, GeolocationError, Geolocator, PositionOptions};
pub use line::LineReader;
pub use scripted::ScriptedReader;

/// Which camera the reader should open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacingMode {
    /// The rear camera, pointing away from the guard.
    #[default]
    Environment,
    /// The front camera.
    User,
}

impl std::fmt::Display for FacingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Environment => write!(f, "environment"),
            Self::User => write!(f, "user"),
        }
    }
}

/// Size of the square (or rectangle) in the frame where codes are decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DecodeRegion {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// Settings passed to a [`CodeReader`] when it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReaderConfig {
    /// Camera to open.
    pub facing_mode: FacingMode,
    /// Frames examined per second.
    pub fps: u32,
    /// Decode region.
    pub region: DecodeRegion,
}

impl ReaderConfig {
    /// Create a reader configuration.
    #[must_use]
    pub fn new(facing_mode: FacingMode, fps: u32, width: u32, height: u32) -> Self {
        Self {
            facing_mode,
            fps,
            region: DecodeRegion { width, height },
        }
    }

    /// Time between two frames.
    #[must_use]
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.fps.max(1)
    }
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self::new(FacingMode::Environment, 10, 250, 250)
    }
}

/// What a reader reports for each examined frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeEvent {
    /// A code was decoded; carries the raw text.
    Decoded(String),
    /// Nothing usable in this frame. Expected and ignorable.
    FrameError(String),
}

/// A source of decoded checkpoint codes.
///
/// `start` returns once the reader is live; events then arrive on the
/// channel until the reader is stopped or runs out of input, at which point
/// the sender is dropped.
#[async_trait]
pub trait CodeReader: Send + Sync + std::fmt::Debug {
    /// The name of this reader (for logging).
    fn name(&self) -> &'static str;

    /// Open the camera and begin sending decode events.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Camera`](crate::Error::Camera) if the camera cannot
    /// be opened.
    async fn start(&mut self, config: &ReaderConfig, tx: mpsc::Sender<DecodeEvent>) -> Result<()>;

    /// Stop delivering events. Calling this when not running is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the reader fails to shut down cleanly.
    async fn stop(&mut self) -> Result<()>;

    /// Check if the reader is currently running.
    fn is_running(&self) -> bool;
}

/// Shared run/stop signal between a reader and its background task.
///
/// Cloning shares the same signal.
#[derive(Debug, Clone)]
pub struct ReaderHandle {
    running: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ReaderHandle {
    /// Create a handle in the running state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Signal the reader to stop.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Check if the stop signal has not been sent yet.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Resolve once [`stop`](Self::stop) has been called.
    pub async fn stopped(&self) {
        loop {
            let notified = self.notify.notified();
            if !self.is_running() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for ReaderHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_facing_mode_display() {
        assert_eq!(FacingMode::Environment.to_string(), "environment");
        assert_eq!(FacingMode::User.to_string(), "user");
    }

    #[test]
    fn test_facing_mode_serde() {
        let json = serde_json::to_string(&FacingMode::User).unwrap();
        assert_eq!(json, "\"user\"");
        let mode: FacingMode = serde_json::from_str("\"environment\"").unwrap();
        assert_eq!(mode, FacingMode::Environment);
    }

    #[test]
    fn test_reader_config_default() {
        let config = ReaderConfig::default();
        assert_eq!(config.facing_mode, FacingMode::Environment);
        assert_eq!(config.fps, 10);
        assert_eq!(config.region, DecodeRegion { width: 250, height: 250 });
    }

    #[test]
    fn test_frame_interval() {
        assert_eq!(
            ReaderConfig::default().frame_interval(),
            Duration::from_millis(100)
        );
        let zero = ReaderConfig::new(FacingMode::User, 0, 1, 1);
        assert_eq!(zero.frame_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_reader_handle_stop() {
        let handle = ReaderHandle::new();
        assert!(handle.is_running());

        handle.stop();
        assert!(!handle.is_running());
    }

    #[test]
    fn test_reader_handle_clone_shares_signal() {
        let handle1 = ReaderHandle::new();
        let handle2 = handle1.clone();

        handle1.stop();
        assert!(!handle2.is_running());
    }

    #[tokio::test]
    async fn test_reader_handle_stopped_wakes_waiter() {
        let handle = ReaderHandle::new();
        let waiter = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.stopped().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.stop();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter not woken")
            .unwrap();
    }

    #[tokio::test]
    async fn test_reader_handle_stopped_after_stop_returns() {
        let handle = ReaderHandle::new();
        handle.stop();
        handle.stopped().await;
    }
}
