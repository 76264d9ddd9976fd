//! `patrolrecorder` - record security patrol checkpoint visits
//!
//! A guard scans the code posted at a checkpoint; the visit is kept only if
//! the device can report where the guard is. The library provides the
//! checkpoint registry, the scan controller that ties a code reader and a
//! geolocation source together, a capped local history, and a terminal
//! rendering of the patrol screen.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod config;
pub mod controller;
pub mod device;
pub mod error;
pub mod logging;
pub mod record;
pub mod registry;
pub mod storage;
pub mod view;

pub use config::Config;
pub use controller::{ScanController, ScanFailure, ScanOutcome, ScanPhase, ScanSettings, ViewState};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use record::{GeoLocation, PatrolRecord};
pub use registry::PointRegistry;
pub use storage::{HistoryStore, RecordStore};
pub use view::{render, Screen};
