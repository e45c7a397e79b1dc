use anyhow::{Context, Result};
use clap::Parser;
use fall_detector_rs::api::HttpFallEventApi;
use fall_detector_rs::clock::SystemClock;
use fall_detector_rs::location::{FixedLocation, LocationProvider, TermuxLocation};
use fall_detector_rs::prompt::TerminalPrompt;
use fall_detector_rs::recording::load_samples;
use fall_detector_rs::sensors::{AccelerometerSource, ReplayAccelerometer, TermuxAccelerometer};
use fall_detector_rs::{Collaborators, Config, Coordinates, FallMonitor, StartOutcome};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

#[derive(Parser, Debug)]
#[command(name = "fall_monitor")]
#[command(about = "Accelerometer fall detection with caregiver reporting", long_about = None)]
struct Args {
    /// Duration in seconds (0 = until Ctrl-C)
    #[arg(value_name = "SECONDS", default_value = "0")]
    duration: u64,

    /// JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Backend base URL (overrides config)
    #[arg(long)]
    api_url: Option<String>,

    /// File holding the bearer token (overrides config)
    #[arg(long)]
    token_file: Option<PathBuf>,

    /// Fall threshold (overrides config)
    #[arg(long)]
    threshold: Option<f64>,

    /// Play samples from a recording instead of reading the sensor
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Report fixed coordinates, e.g. "6.9271,79.8612"
    #[arg(long, value_parser = parse_coordinates)]
    location: Option<Coordinates>,
}

fn parse_coordinates(s: &str) -> Result<Coordinates, String> {
    let (lat, lon) = s
        .split_once(',')
        .ok_or_else(|| "expected LAT,LON".to_string())?;
    let lat: f64 = lat.trim().parse().map_err(|e| format!("latitude: {}", e))?;
    let lon: f64 = lon.trim().parse().map_err(|e| format!("longitude: {}", e))?;
    Ok(Coordinates::new(lat, lon))
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match args.config.as_ref() {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    if let Some(url) = args.api_url.clone() {
        config.api.base_url = url;
    }
    if let Some(path) = args.token_file.clone() {
        config.api.token_file = Some(path);
    }
    if let Some(threshold) = args.threshold {
        config.detector.threshold = threshold;
    }
    if let Some(coords) = args.location {
        config.location.fixed = Some(coords);
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = load_config(&args)?;

    log::info!("Fall monitor starting");
    log::info!("  API: {}", config.api.base_url);
    log::info!("  Threshold: {}", config.detector.threshold);

    let sensor: Arc<dyn AccelerometerSource> = match args.replay.as_ref() {
        Some(path) => {
            let recorded = load_samples(path)
                .with_context(|| format!("loading recording {}", path.display()))?;
            log::info!("  Replaying {} samples from {}", recorded.len(), path.display());
            Arc::new(ReplayAccelerometer::new(
                recorded.iter().map(|r| r.sample()).collect(),
            ))
        }
        None => Arc::new(TermuxAccelerometer),
    };

    let location: Arc<dyn LocationProvider> = match config.location.fixed {
        Some(coords) => Arc::new(FixedLocation::new(coords)),
        None => Arc::new(TermuxLocation),
    };

    let monitor = FallMonitor::new(
        config.detector.clone(),
        Collaborators {
            sensor,
            location,
            api: Arc::new(HttpFallEventApi::new(&config.api)?),
            prompt: Arc::new(TerminalPrompt),
            clock: Arc::new(SystemClock),
        },
    );

    match monitor.start_monitoring().await {
        StartOutcome::Started => {}
        outcome => {
            log::error!("Fall detection did not start: {:?}", outcome);
            return Ok(());
        }
    }

    if args.duration > 0 {
        tokio::select! {
            _ = sleep(Duration::from_secs(args.duration)) => {
                log::info!("Duration reached, stopping...");
            }
            _ = tokio::signal::ctrl_c() => {}
        }
    } else {
        tokio::signal::ctrl_c().await?;
    }

    monitor.stop_monitoring().await;
    let snapshot = monitor.snapshot()?;
    log::info!("{} fall alert(s) raised this session", snapshot.triggers);
    Ok(())
}
