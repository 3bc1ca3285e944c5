// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{Context, Result};
use apartment_locator::{
    Config, FileSheet, GoogleGeocoder, HttpSheet, LocatorSession, MarkerBoard, RecordSource, SessionSettings,
};
use std::env;
use std::fs::File;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let config = Config::load_default()?;

    if args.len() > 2 && args[1] == "lookup" {
        // One-shot lookup, logs on stderr
        init_logging(None)?;
        run_lookup(&config, &args[2..].join(","))?;
    } else {
        // UI mode (default), optionally replaying a share link
        init_logging(Some("locator.log"))?;
        let shared_url = if args.len() > 2 && args[1] == "open" {
            Some(args[2].clone())
        } else {
            None
        };
        run_ui_mode(&config, shared_url)?;
    }

    Ok(())
}

fn init_logging(log_file: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log_file {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("Failed to create log file {}", path))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }

    Ok(())
}

fn record_source(config: &Config) -> Result<Box<dyn RecordSource>> {
    match &config.data.csv_path {
        Some(path) => Ok(Box::new(FileSheet::new(path))),
        None => {
            let sheet = HttpSheet::new(&config.data.sheet_url, Duration::from_secs(config.geocoding.timeout_secs))?;
            Ok(Box::new(sheet))
        }
    }
}

fn build_session(config: &Config) -> Result<LocatorSession<MarkerBoard>> {
    let geocoding = &config.geocoding;
    let api_key = env::var(&geocoding.api_key_env).unwrap_or_default();
    if api_key.is_empty() {
        tracing::warn!("{} is not set: geocoding will be denied", geocoding.api_key_env);
    }

    let geocoder = GoogleGeocoder::new(
        &geocoding.endpoint,
        api_key,
        Duration::from_secs(geocoding.timeout_secs),
    )?;

    Ok(LocatorSession::new(
        MarkerBoard::new(),
        Arc::new(geocoder),
        SessionSettings::from(geocoding),
    ))
}

fn run_lookup(config: &Config, codes: &str) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
    let session = build_session(config)?;
    let source = record_source(config)?;

    runtime.block_on(async {
        let count = session.load_records(source.as_ref()).await?;
        println!("✓ Loaded {} apartments from {}", count, source.describe());

        let report = session.search(codes)?;
        report.pending.settle().await;

        for code in &report.outcome.unmatched {
            println!("✗ {} non trouvé", code);
        }

        if report.outcome.is_empty() {
            println!("{}", apartment_locator::search::NO_MATCH_NOTICE);
            return Ok(());
        }

        session.with_map(|board| {
            for apartment in &report.outcome.matched {
                let position = board
                    .markers()
                    .find(|m| m.label == apartment.reference)
                    .map(|m| format!("{:.5}, {:.5}", m.position.lat, m.position.lng))
                    .unwrap_or_else(|| "position inconnue".to_string());
                println!("• {} - {} ({})", apartment.reference, apartment.address, position);
            }
        });

        let link = session.share_link(&config.share.base_url)?;
        println!("\n🔗 {}", link);
        Ok::<(), anyhow::Error>(())
    })
}

#[cfg(feature = "tui")]
fn run_ui_mode(config: &Config, shared_url: Option<String>) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
    let session = build_session(config)?;
    let source: Arc<dyn RecordSource> = Arc::from(record_source(config)?);

    let mut app = ui::App::new(session, source, config.clone(), runtime.handle().clone());
    app.start(shared_url);
    ui::run_ui(&mut app)?;

    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_config: &Config, _shared_url: Option<String>) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or run a one-shot lookup: apartment-locator lookup A1B205,A0B123");
    std::process::exit(1);
}
