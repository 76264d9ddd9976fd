//! The scan-to-record workflow.
//!
//! [`ScanController`] owns the code reader, asks for a GPS fix once a code
//! is decoded, and hands the resulting record to a [`RecordStore`]. Its
//! observable state is a [`ViewState`] published on a watch channel, which
//! the presentation layer renders.
//!
//! ```text
//! Idle ──start──▶ Scanning ──decode──▶ AwaitingLocation ──fix──▶ Saving ──▶ Idle
//!   ▲                │                        │                    │
//!   └── camera error ┘        no GPS / failure┘       save failure ┘
//! ```
//!
//! Every failure lands back in `Idle` with a [`ScanFailure`] for the user.
//! Only one decode is acted on at a time; decodes that arrive while a
//! location request or save is running are dropped, not queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, trace, warn};

use crate::config::Config;
use crate::device::{CodeReader, DecodeEvent, Geolocator, PositionOptions, ReaderConfig};
use crate::error::{Error, Result};
use crate::record::{GeoLocation, PatrolRecord};
use crate::registry::PointRegistry;
use crate::storage::RecordStore;

/// Buffer between a running reader and its session.
const DECODE_CHANNEL_CAPACITY: usize = 16;

/// Where the controller is in the scan workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ScanPhase {
    /// Waiting for the guard to start a scan.
    #[default]
    Idle,
    /// The camera is open and frames are being decoded.
    Scanning,
    /// A code was decoded; waiting for the GPS fix.
    AwaitingLocation,
    /// The record is being written to the store.
    Saving,
}

impl ScanPhase {
    /// True while a decoded code is being turned into a record.
    #[must_use]
    pub fn is_busy(self) -> bool {
        matches!(self, Self::AwaitingLocation | Self::Saving)
    }
}

impl std::fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Scanning => write!(f, "scanning"),
            Self::AwaitingLocation => write!(f, "awaiting_location"),
            Self::Saving => write!(f, "saving"),
        }
    }
}

/// A scan failure, as reported to the guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanFailure {
    /// The camera could not be opened.
    CameraAccess,
    /// The device has no geolocation capability.
    GeolocationUnsupported,
    /// A position could not be obtained (denied, unavailable, timed out).
    GeolocationFailure,
    /// The record could not be saved.
    Persistence,
}

impl ScanFailure {
    /// The message shown in the error banner.
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::CameraAccess => "Não foi possível acessar a câmera.",
            Self::GeolocationUnsupported => "Seu navegador não suporta geolocalização.",
            Self::GeolocationFailure => {
                "GPS desativado. O registro de ronda é obrigatório com geolocalização."
            }
            Self::Persistence => "Erro ao salvar registro no banco de dados.",
        }
    }
}

impl std::fmt::Display for ScanFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// How a decode (or a whole session) ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    /// A record was saved.
    Recorded(PatrolRecord),
    /// The scan failed; the controller is back in `Idle` with this error.
    Failed(ScanFailure),
    /// The decode was not acted on (blank, or another one is in flight).
    Ignored,
    /// The reader stopped before anything was decoded.
    Cancelled,
}

/// Everything the presentation layer needs to draw the screen.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ViewState {
    /// Current workflow phase.
    pub phase: ScanPhase,
    /// Most recently saved record.
    pub last_record: Option<PatrolRecord>,
    /// Error banner contents, if any.
    pub error: Option<ScanFailure>,
    /// Success notification from the last save.
    pub notice: Option<String>,
    /// Reader settings, for drawing the viewfinder.
    pub reader: ReaderConfig,
}

/// Device settings the controller passes down on each scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanSettings {
    /// Code reader settings.
    pub reader: ReaderConfig,
    /// Geolocation request options.
    pub position: PositionOptions,
}

impl ScanSettings {
    /// Settings from the `[scanner]` and `[geolocation]` sections.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            reader: config.reader_config(),
            position: config.position_options(),
        }
    }
}

/// Decode events from one started reader.
///
/// Dropping the session discards anything the reader sends afterwards.
#[derive(Debug)]
pub struct ScanSession {
    events: mpsc::Receiver<DecodeEvent>,
}

/// Clears the in-flight flag when a decode finishes, however it finishes.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Coordinates reader, geolocation and storage for one guard's device.
#[derive(Debug)]
pub struct ScanController {
    reader: Mutex<Box<dyn CodeReader>>,
    geolocator: Arc<dyn Geolocator>,
    store: Arc<dyn RecordStore>,
    registry: PointRegistry,
    settings: ScanSettings,
    state: watch::Sender<ViewState>,
    in_flight: AtomicBool,
}

impl ScanController {
    /// Build a controller and load the last saved record from the store.
    ///
    /// A store that cannot be read is logged and treated as empty; the
    /// controller is usable either way.
    pub async fn init(
        reader: Box<dyn CodeReader>,
        geolocator: Arc<dyn Geolocator>,
        store: Arc<dyn RecordStore>,
        registry: PointRegistry,
        settings: ScanSettings,
    ) -> Self {
        let last_record = match store.latest().await {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Could not load last patrol record");
                None
            }
        };
        debug!(
            reader = reader.name(),
            points = registry.len(),
            has_last = last_record.is_some(),
            "Scan controller ready"
        );

        let (state, _) = watch::channel(ViewState {
            last_record,
            reader: settings.reader,
            ..ViewState::default()
        });

        Self {
            reader: Mutex::new(reader),
            geolocator,
            store,
            registry,
            settings,
            state,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Snapshot of the current state.
    #[must_use]
    pub fn view_state(&self) -> ViewState {
        self.state.borrow().clone()
    }

    /// Receive every subsequent state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ViewState> {
        self.state.subscribe()
    }

    /// Current workflow phase.
    #[must_use]
    pub fn phase(&self) -> ScanPhase {
        self.state.borrow().phase
    }

    /// The most recently saved record.
    #[must_use]
    pub fn last_record(&self) -> Option<PatrolRecord> {
        self.state.borrow().last_record.clone()
    }

    /// The registry codes are resolved against.
    #[must_use]
    pub fn registry(&self) -> &PointRegistry {
        &self.registry
    }

    /// Clear the error banner.
    pub fn dismiss_error(&self) {
        self.state.send_if_modified(|state| state.error.take().is_some());
    }

    /// Open the camera and begin a scan session.
    ///
    /// Clears any previous error. If the camera cannot be opened the
    /// controller returns to `Idle` showing [`ScanFailure::CameraAccess`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] if the controller is not idle, or the
    /// reader's error if the camera cannot be opened.
    pub async fn start_scan(&self) -> Result<ScanSession> {
        let claimed = self.state.send_if_modified(|state| {
            if state.phase != ScanPhase::Idle || self.in_flight.load(Ordering::SeqCst) {
                return false;
            }
            state.phase = ScanPhase::Scanning;
            state.error = None;
            state.notice = None;
            true
        });
        if !claimed {
            debug!(phase = %self.phase(), "Scan already in progress");
            return Err(Error::Busy);
        }

        let (tx, events) = mpsc::channel(DECODE_CHANNEL_CAPACITY);
        let started = self
            .reader
            .lock()
            .await
            .start(&self.settings.reader, tx)
            .await;

        match started {
            Ok(()) => {
                debug!("Scanner started");
                Ok(ScanSession { events })
            }
            Err(e) => {
                warn!(error = %e, "Camera could not be started");
                self.fail(ScanFailure::CameraAccess);
                Err(e)
            }
        }
    }

    /// Stop the camera. Safe to call at any time.
    ///
    /// Failures to stop are logged and otherwise ignored.
    pub async fn stop_scan(&self) {
        self.stop_reader().await;
        self.state.send_if_modified(|state| {
            if state.phase == ScanPhase::Scanning {
                state.phase = ScanPhase::Idle;
                true
            } else {
                false
            }
        });
    }

    /// Act on a decoded code: stop scanning, get a GPS fix, save the record.
    ///
    /// Returns [`ScanOutcome::Ignored`] without side effects if the text is
    /// blank or another decode is already being handled.
    pub async fn handle_decode(&self, text: &str) -> ScanOutcome {
        let code = text.trim();
        if code.is_empty() {
            trace!("Ignoring blank decode");
            return ScanOutcome::Ignored;
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!(code, "Ignoring decode while another is in flight");
            return ScanOutcome::Ignored;
        }
        let _in_flight = InFlight(&self.in_flight);

        self.stop_reader().await;

        let point_name = self.registry.resolve(code);
        debug!(code, point_name = %point_name, "Checkpoint decoded");
        self.set_phase(ScanPhase::AwaitingLocation, true);

        let location = match self.locate().await {
            Ok(location) => location,
            Err(failure) => return self.fail(failure),
        };

        self.set_phase(ScanPhase::Saving, false);
        let record = PatrolRecord::new(code, point_name, location);

        match self.store.append(&record).await {
            Ok(stored) => {
                info!(point_id = %stored.point_id, point_name = %stored.point_name, "Checkpoint recorded");
                self.state.send_modify(|state| {
                    state.phase = ScanPhase::Idle;
                    state.notice = Some(format!("Registro concluído: {}", stored.point_name));
                    state.last_record = Some(stored.clone());
                });
                ScanOutcome::Recorded(stored)
            }
            Err(e) => {
                warn!(error = %e, "Saving patrol record failed");
                self.fail(ScanFailure::Persistence)
            }
        }
    }

    /// Wait for the first decoded code in `session` and act on it.
    ///
    /// Per-frame decode errors are skipped. Returns
    /// [`ScanOutcome::Cancelled`] if the reader stops before a code is
    /// decoded.
    pub async fn run_session(&self, mut session: ScanSession) -> ScanOutcome {
        while let Some(event) = session.events.recv().await {
            match event {
                DecodeEvent::Decoded(text) => match self.handle_decode(&text).await {
                    ScanOutcome::Ignored => {}
                    outcome => return outcome,
                },
                DecodeEvent::FrameError(reason) => trace!(reason, "Frame not decoded"),
            }
        }

        debug!("Reader closed without a decode");
        self.stop_scan().await;
        ScanOutcome::Cancelled
    }

    /// Start a scan and run it to completion.
    pub async fn scan_once(&self) -> ScanOutcome {
        match self.start_scan().await {
            Ok(session) => self.run_session(session).await,
            Err(e) if e.is_busy() => ScanOutcome::Ignored,
            Err(_) => ScanOutcome::Failed(ScanFailure::CameraAccess),
        }
    }

    async fn stop_reader(&self) {
        let mut reader = self.reader.lock().await;
        if let Err(e) = reader.stop().await {
            debug!(error = %e, "Ignoring scanner stop failure");
        }
    }

    async fn locate(&self) -> std::result::Result<GeoLocation, ScanFailure> {
        if !self.geolocator.is_supported() {
            warn!("Geolocation is not supported on this device");
            return Err(ScanFailure::GeolocationUnsupported);
        }

        let options = self.settings.position;
        let request = self.geolocator.current_position(&options);
        let location = match tokio::time::timeout(options.timeout, request).await {
            Ok(Ok(location)) => location,
            Ok(Err(e)) => {
                warn!(error = %e, "Geolocation failed");
                return Err(ScanFailure::GeolocationFailure);
            }
            Err(_) => {
                warn!(
                    timeout_ms = options.timeout.as_millis(),
                    "Geolocation timed out"
                );
                return Err(ScanFailure::GeolocationFailure);
            }
        };

        if let Err(e) = location.validate() {
            warn!(error = %e, "Geolocation returned an invalid fix");
            return Err(ScanFailure::GeolocationFailure);
        }
        Ok(location)
    }

    fn set_phase(&self, phase: ScanPhase, clear_messages: bool) {
        self.state.send_modify(|state| {
            state.phase = phase;
            if clear_messages {
                state.error = None;
                state.notice = None;
            }
        });
    }

    fn fail(&self, failure: ScanFailure) -> ScanOutcome {
        self.state.send_modify(|state| {
            state.phase = ScanPhase::Idle;
            state.error = Some(failure);
        });
        ScanOutcome::Failed(failure)
    }
}
