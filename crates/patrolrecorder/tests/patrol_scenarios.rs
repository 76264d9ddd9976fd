//! End-to-end patrol scenarios.
//!
//! Each test wires a real controller to a scripted reader, a fixed GPS and
//! an on-disk `SQLite` history, then checks what a guard would see and what
//! was kept.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use patrolrecorder::device::{
    DecodeEvent, FixedGeolocator, GeolocationError, ScriptedReader,
};
use patrolrecorder::storage::{HistoryOptions, SqliteKv};
use patrolrecorder::view::{render_in, MainPanel};
use patrolrecorder::{
    Config, GeoLocation, HistoryStore, PointRegistry, RecordStore, ScanController, ScanFailure,
    ScanOutcome, ScanSettings,
};

/// A database path in its own temporary directory, removed on drop.
struct TempDb {
    dir: PathBuf,
}

impl TempDb {
    fn new() -> Self {
        Self {
            dir: std::env::temp_dir().join(format!("patrolrecorder-it-{}", uuid::Uuid::new_v4())),
        }
    }

    fn path(&self) -> PathBuf {
        self.dir.join("patrol.db")
    }
}

impl Drop for TempDb {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

fn test_config(db: PathBuf) -> Config {
    let mut config = Config::default();
    config.storage.database_path = Some(db);
    config.storage.simulated_latency_ms = 5;
    config.scanner.fps = 200;
    config.geolocation.timeout_ms = 500;
    config
}

fn open_store(config: &Config) -> Arc<HistoryStore<SqliteKv>> {
    Arc::new(HistoryStore::open(config).unwrap())
}

async fn controller(
    config: &Config,
    reader: ScriptedReader,
    geolocator: FixedGeolocator,
    store: Arc<HistoryStore<SqliteKv>>,
) -> ScanController {
    ScanController::init(
        Box::new(reader),
        Arc::new(geolocator),
        store,
        config.point_registry(),
        ScanSettings::from_config(config),
    )
    .await
}

fn position(latitude: f64, longitude: f64) -> FixedGeolocator {
    FixedGeolocator::at(GeoLocation::new(latitude, longitude).unwrap())
}

#[tokio::test]
async fn test_known_point_is_recorded_with_location() {
    let db = TempDb::new();
    let config = test_config(db.path());
    let store = open_store(&config);
    let c = controller(
        &config,
        ScriptedReader::decoding("PONTO_02"),
        position(10.0, 20.0),
        store.clone(),
    )
    .await;

    let ScanOutcome::Recorded(record) = c.scan_once().await else {
        panic!("scan did not record");
    };
    assert_eq!(record.point_name, "Estacionamento Norte");
    assert_eq!(record.location, GeoLocation::new(10.0, 20.0).unwrap());

    let screen = render_in(&c.view_state(), &Utc);
    assert_eq!(screen.main, MainPanel::CallToAction { loading: false });
    assert_eq!(
        screen.notice.as_deref(),
        Some("Registro concluído: Estacionamento Norte")
    );
    let card = screen.last_record.unwrap();
    assert_eq!(card.title, "Estacionamento Norte");
    assert_eq!(card.gps, "GPS: 10.00000, 20.00000");
}

#[tokio::test]
async fn test_unknown_point_keeps_code_in_name() {
    let db = TempDb::new();
    let config = test_config(db.path());
    let c = controller(
        &config,
        ScriptedReader::decoding("XYZ"),
        position(1.0, 1.0),
        open_store(&config),
    )
    .await;

    let ScanOutcome::Recorded(record) = c.scan_once().await else {
        panic!("scan did not record");
    };
    assert_eq!(record.point_id, "XYZ");
    assert!(record.point_name.contains("XYZ"));
}

#[tokio::test]
async fn test_eleven_scans_keep_the_ten_most_recent() {
    let db = TempDb::new();
    let config = test_config(db.path());
    let store = open_store(&config);
    let c = controller(&config, ScriptedReader::default(), position(1.0, 2.0), store.clone()).await;

    for n in 1..=11 {
        let outcome = c.handle_decode(&format!("PONTO_{n:02}")).await;
        assert!(matches!(outcome, ScanOutcome::Recorded(_)), "scan {n}");
    }

    let history = store.history().await.unwrap();
    let codes: Vec<_> = history.iter().map(|r| r.point_id.as_str()).collect();
    assert_eq!(
        codes,
        [
            "PONTO_11", "PONTO_10", "PONTO_09", "PONTO_08", "PONTO_07", "PONTO_06", "PONTO_05",
            "PONTO_04", "PONTO_03", "PONTO_02",
        ]
    );
}

#[tokio::test]
async fn test_gps_failure_records_nothing() {
    let db = TempDb::new();
    let config = test_config(db.path());
    let store = open_store(&config);
    let first = controller(
        &config,
        ScriptedReader::decoding("PONTO_01"),
        position(5.0, 5.0),
        store.clone(),
    )
    .await;
    let ScanOutcome::Recorded(kept) = first.scan_once().await else {
        panic!("first scan did not record");
    };

    let c = controller(
        &config,
        ScriptedReader::decoding("PONTO_03"),
        FixedGeolocator::failing(GeolocationError::PositionUnavailable("no fix".to_string())),
        store.clone(),
    )
    .await;
    assert_eq!(c.last_record(), Some(kept.clone()));

    assert_eq!(
        c.scan_once().await,
        ScanOutcome::Failed(ScanFailure::GeolocationFailure)
    );
    assert_eq!(c.last_record(), Some(kept.clone()));
    assert_eq!(store.history().await.unwrap(), vec![kept]);

    let screen = render_in(&c.view_state(), &Utc);
    assert_eq!(
        screen.error_banner.as_deref(),
        Some("GPS desativado. O registro de ronda é obrigatório com geolocalização.")
    );
}

#[tokio::test]
async fn test_duplicate_decodes_in_one_session_save_once() {
    let db = TempDb::new();
    let config = test_config(db.path());
    let store = open_store(&config);
    let reader = ScriptedReader::new(vec![
        DecodeEvent::Decoded("PONTO_04".to_string()),
        DecodeEvent::Decoded("PONTO_04".to_string()),
        DecodeEvent::Decoded("PONTO_04".to_string()),
    ]);
    let c = controller(
        &config,
        reader,
        position(1.0, 1.0).with_delay(Duration::from_millis(50)),
        store.clone(),
    )
    .await;

    assert!(matches!(c.scan_once().await, ScanOutcome::Recorded(_)));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(store.history().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_history_survives_reopen() {
    let db = TempDb::new();
    let config = test_config(db.path());
    {
        let c = controller(
            &config,
            ScriptedReader::decoding("PONTO_SECURE_01"),
            position(-23.5, -46.6),
            open_store(&config),
        )
        .await;
        assert!(matches!(c.scan_once().await, ScanOutcome::Recorded(_)));
    }

    let reopened = HistoryStore::new(
        SqliteKv::open(db.path()).unwrap(),
        HistoryOptions::from_config(&config),
    );
    let latest = reopened.latest().await.unwrap().unwrap();
    assert_eq!(latest.point_name, "Cofre Central");
    assert_eq!(latest.location, GeoLocation::new(-23.5, -46.6).unwrap());
}

#[tokio::test]
async fn test_registry_overrides_from_config() {
    let db = TempDb::new();
    let mut config = test_config(db.path());
    config
        .registry
        .points
        .insert("PONTO_99".to_string(), "Guarita Sul".to_string());
    assert!(config.validate().is_ok());
    assert_eq!(config.point_registry().resolve("PONTO_99"), "Guarita Sul");
    assert_eq!(
        config.point_registry().resolve("PONTO_01"),
        PointRegistry::builtin().resolve("PONTO_01")
    );

    let c = controller(
        &config,
        ScriptedReader::decoding("PONTO_99"),
        position(1.0, 1.0),
        open_store(&config),
    )
    .await;
    let ScanOutcome::Recorded(record) = c.scan_once().await else {
        panic!("scan did not record");
    };
    assert_eq!(record.point_name, "Guarita Sul");
}

#[test]
fn test_temp_db_is_removed_on_drop() {
    let db = TempDb::new();
    let config = test_config(db.path());
    drop(HistoryStore::open(&config).unwrap());
    let dir = db.dir.clone();
    assert!(dir.exists());

    drop(db);
    assert!(!dir.exists());
}
