//! `patrolrec` - CLI for patrolrecorder

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::Local;
use clap::Parser;

use patrolrecorder::cli::{Cli, Command, ConfigCommand, ScanCommand};
use patrolrecorder::device::{CodeReader, FixedGeolocator, LineReader, ScriptedReader};
use patrolrecorder::view::RecordCard;
use patrolrecorder::{
    init_logging, render, Config, GeoLocation, HistoryStore, RecordStore, ScanController,
    ScanOutcome, ScanSettings,
};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbosity());

    if let Command::Config(config_cmd) = cli.command {
        return handle_config(cli.config, config_cmd);
    }

    let config = Config::load_from(cli.config.clone()).context("failed to load configuration")?;

    // Built by hand so a pending stdin read cannot hold up exit.
    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    let result = runtime.block_on(run(cli.command, config));
    runtime.shutdown_background();
    result
}

async fn run(command: Command, config: Config) -> anyhow::Result<()> {
    match command {
        Command::Scan(scan_cmd) => handle_scan(&config, scan_cmd).await,
        Command::Last(last_cmd) => handle_last(&config, last_cmd.json).await,
        Command::History(history_cmd) => handle_history(&config, history_cmd.json).await,
        Command::Points(points_cmd) => handle_points(&config, points_cmd.json),
        Command::Config(config_cmd) => handle_config(None, config_cmd),
    }
}

fn open_store(config: &Config) -> anyhow::Result<HistoryStore<patrolrecorder::storage::SqliteKv>> {
    HistoryStore::open(config).with_context(|| {
        format!(
            "failed to open history at {}",
            config.database_path().display()
        )
    })
}

async fn handle_scan(config: &Config, cmd: ScanCommand) -> anyhow::Result<()> {
    let location = match (cmd.lat, cmd.lon) {
        (Some(latitude), Some(longitude)) => {
            Some(GeoLocation::new(latitude, longitude).context("invalid --lat/--lon")?)
        }
        _ => config.fixed_location(),
    };

    let reader: Box<dyn CodeReader> = match cmd.code {
        Some(code) => Box::new(ScriptedReader::decoding(code).close_when_done()),
        None => Box::new(LineReader::stdin()),
    };
    let store: Arc<dyn RecordStore> = Arc::new(open_store(config)?);

    let controller = ScanController::init(
        reader,
        Arc::new(FixedGeolocator::from_option(location)),
        store,
        config.point_registry(),
        ScanSettings::from_config(config),
    )
    .await;

    let mut updates = controller.subscribe();
    println!("{}", render(&updates.borrow_and_update()));
    let printer = tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let screen = render(&updates.borrow_and_update());
            println!("{screen}");
        }
    });

    let mut last_outcome = ScanOutcome::Cancelled;
    loop {
        let outcome = controller.scan_once().await;
        let finished = matches!(outcome, ScanOutcome::Cancelled) || !cmd.continuous;
        if !matches!(outcome, ScanOutcome::Cancelled) {
            last_outcome = outcome;
        }
        if finished {
            break;
        }
    }

    drop(controller);
    printer.await.context("screen printer failed")?;

    match last_outcome {
        ScanOutcome::Failed(failure) => bail!("{failure}"),
        _ => Ok(()),
    }
}

async fn handle_last(config: &Config, json: bool) -> anyhow::Result<()> {
    let latest = open_store(config)?.latest().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&latest)?);
        return Ok(());
    }

    match latest {
        Some(record) => {
            let card = RecordCard::new(&record, &Local);
            println!("{}", card.title);
            println!("  {}", card.when);
            println!("  {}", card.gps);
        }
        None => println!("Nenhum registro."),
    }
    Ok(())
}

async fn handle_history(config: &Config, json: bool) -> anyhow::Result<()> {
    let history = open_store(config)?.history().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&history)?);
        return Ok(());
    }

    if history.is_empty() {
        println!("Nenhum registro.");
        return Ok(());
    }
    for record in &history {
        let card = RecordCard::new(record, &Local);
        println!(
            "{:<20} {:<16} {:<28} {}",
            card.when, record.point_id, card.title, record.location
        );
    }
    Ok(())
}

fn handle_points(config: &Config, json: bool) -> anyhow::Result<()> {
    let registry = config.point_registry();

    if json {
        let points: serde_json::Map<String, serde_json::Value> = registry
            .iter()
            .map(|(code, name)| (code.to_string(), serde_json::Value::from(name)))
            .collect();
        println!("{}", serde_json::to_string_pretty(&points)?);
        return Ok(());
    }

    for (code, name) in registry.iter() {
        println!("{code:<16} {name}");
    }
    Ok(())
}

fn handle_config(config_path: Option<PathBuf>, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            let config = Config::load_from(config_path).context("failed to load configuration")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                print_config(&config);
            }
        }
        ConfigCommand::Path => {
            let path = config_path.unwrap_or_else(Config::default_config_path);
            println!("{}", path.display());
        }
        ConfigCommand::Validate { file } => {
            let path = file
                .or(config_path)
                .unwrap_or_else(Config::default_config_path);
            if !path.exists() {
                bail!("configuration file not found: {}", path.display());
            }
            Config::load_from(Some(path.clone()))
                .with_context(|| format!("{} is not valid", path.display()))?;
            println!("Configuration is valid: {}", path.display());
        }
    }
    Ok(())
}

fn print_config(config: &Config) {
    println!("Current Configuration");
    println!("=====================");
    println!();
    println!("[Storage]");
    println!("  Database path:      {}", config.database_path().display());
    println!("  History key:        {}", config.storage.history_key);
    println!("  History capacity:   {}", config.storage.history_capacity);
    println!("  Save latency (ms):  {}", config.storage.simulated_latency_ms);
    println!();
    println!("[Scanner]");
    println!("  Facing mode:        {}", config.scanner.facing_mode);
    println!("  FPS:                {}", config.scanner.fps);
    println!(
        "  Decode region:      {}x{}",
        config.scanner.region_width, config.scanner.region_height
    );
    println!();
    println!("[Geolocation]");
    println!("  High accuracy:      {}", config.geolocation.high_accuracy);
    println!("  Timeout (ms):       {}", config.geolocation.timeout_ms);
    match config.fixed_location() {
        Some(location) => println!("  Fixed location:     {location}"),
        None => println!("  Fixed location:     (none)"),
    }
    println!();
    println!("[Registry]");
    println!("  Points:             {}", config.point_registry().len());
    println!("  Overrides:          {}", config.registry.points.len());
}
