//! Presentation of the controller state.
//!
//! [`render`] turns a [`ViewState`] into a [`Screen`], a plain description
//! of what the single patrol screen shows. `Screen` implements `Display`
//! for the terminal.

use std::fmt;

use chrono::{DateTime, Local, TimeZone, Utc};

use crate::controller::{ScanPhase, ViewState};
use crate::device::DecodeRegion;
use crate::record::PatrolRecord;

/// Application title.
pub const TITLE: &str = "Vigilante Pro";
/// Line under the title.
pub const SUBTITLE: &str = "Controle de Ronda Digital";
/// Label of the primary action.
pub const SCAN_ACTION: &str = "ESCANEAR PONTO";
/// Shown in the viewfinder while waiting for a code.
pub const SCAN_HINT: &str = "Aguardando leitura...";
/// Heading of the last-record card.
pub const LAST_RECORD_HEADING: &str = "Último Registro";

/// The large central area of the screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MainPanel {
    /// The scan button. Disabled and spinning while `loading`.
    CallToAction {
        /// A location request or save is in progress.
        loading: bool,
    },
    /// The live camera view with its decode region.
    Viewfinder {
        /// Decode region drawn on the view.
        region: DecodeRegion,
        /// Hint under the view.
        hint: &'static str,
    },
}

/// Summary of the last saved record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordCard {
    /// Point name.
    pub title: String,
    /// Local date and time, `dd/mm/yyyy às HH:MM`.
    pub when: String,
    /// `GPS: <lat>, <lon>`.
    pub gps: String,
}

impl RecordCard {
    /// Build the card for `record`, showing times in `tz`.
    #[must_use]
    pub fn new<Tz>(record: &PatrolRecord, tz: &Tz) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        Self {
            title: record.point_name.clone(),
            when: format_when(&record.timestamp, tz),
            gps: format!("GPS: {}", record.location),
        }
    }
}

/// Everything the screen shows at one moment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screen {
    /// Central panel.
    pub main: MainPanel,
    /// Error banner text.
    pub error_banner: Option<String>,
    /// Last-record card.
    pub last_record: Option<RecordCard>,
    /// Success notification.
    pub notice: Option<String>,
}

/// Render `state` with times in the local timezone.
#[must_use]
pub fn render(state: &ViewState) -> Screen {
    render_in(state, &Local)
}

/// Render `state` with times in `tz`.
#[must_use]
pub fn render_in<Tz>(state: &ViewState, tz: &Tz) -> Screen
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let scanning = state.phase == ScanPhase::Scanning;

    let main = if scanning {
        MainPanel::Viewfinder {
            region: state.reader.region,
            hint: SCAN_HINT,
        }
    } else {
        MainPanel::CallToAction {
            loading: state.phase.is_busy(),
        }
    };

    Screen {
        main,
        error_banner: state
            .error
            .filter(|_| !scanning)
            .map(|failure| failure.message().to_string()),
        last_record: state
            .last_record
            .as_ref()
            .filter(|_| !scanning)
            .map(|record| RecordCard::new(record, tz)),
        notice: state.notice.clone(),
    }
}

fn format_when<Tz>(timestamp: &DateTime<Utc>, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    timestamp
        .with_timezone(tz)
        .format("%d/%m/%Y às %H:%M")
        .to_string()
}

impl fmt::Display for Screen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{TITLE}")?;
        writeln!(f, "{SUBTITLE}")?;
        writeln!(f)?;

        match &self.main {
            MainPanel::CallToAction { loading: true } => writeln!(f, "[ ... ]")?,
            MainPanel::CallToAction { loading: false } => writeln!(f, "[ {SCAN_ACTION} ]")?,
            MainPanel::Viewfinder { region, hint } => {
                writeln!(f, "[ camera {}x{} ]", region.width, region.height)?;
                writeln!(f, "{hint}")?;
            }
        }

        if let Some(error) = &self.error_banner {
            writeln!(f)?;
            writeln!(f, "! {error}")?;
        }
        if let Some(notice) = &self.notice {
            writeln!(f)?;
            writeln!(f, "✓ {notice}")?;
        }
        if let Some(card) = &self.last_record {
            writeln!(f)?;
            writeln!(f, "{}", LAST_RECORD_HEADING.to_uppercase())?;
            writeln!(f, "  {}  [OK]", card.title)?;
            writeln!(f, "  {}", card.when)?;
            writeln!(f, "  {}", card.gps)?;
        }
        Ok(())
    }
}
