use std::path::{Path, PathBuf};

use clap::Parser;
use fall_detector_rs::recording::{load_samples, with_timestamps};
use fall_detector_rs::FallDetector;
use serde_json::json;

#[derive(Parser, Debug)]
struct Args {
    /// Path to a sample log (.json, .jsonl, optionally .gz)
    #[arg(long, conflicts_with = "dir")]
    log: Option<PathBuf>,

    /// Directory of sample logs to batch replay
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Delta above which a transition counts as a possible fall
    #[arg(long, default_value = "7.0")]
    threshold: f64,

    /// Minimum milliseconds between alerts
    #[arg(long, default_value = "10000")]
    cooldown_ms: i64,

    /// Spacing assumed for samples without a timestamp
    #[arg(long, default_value = "100")]
    interval_ms: i64,

    /// How long the simulated user takes to answer each alert
    #[arg(long, default_value = "0")]
    alert_hold_ms: i64,
}

fn run_once(path: &Path, args: &Args) -> anyhow::Result<serde_json::Value> {
    let recorded = load_samples(path)?;
    let timed = with_timestamps(&recorded, args.interval_ms);

    let mut detector = FallDetector::new(args.threshold, args.cooldown_ms);
    let mut pending = None;
    let mut triggers = Vec::new();
    let mut max_delta: f64 = 0.0;
    let mut previous = None;

    for (t, sample) in timed.iter().copied() {
        if let Some((token, release_at)) = pending {
            if t >= release_at {
                detector.end_alert(token);
                pending = None;
            }
        }

        if let Some(prev) = previous {
            max_delta = max_delta.max(sample.delta_from(&prev));
        }
        previous = Some(sample);

        if let Some(trigger) = detector.process(sample, t) {
            println!("{}", serde_json::to_string(&trigger)?);
            triggers.push(trigger);
            if let Some(token) = detector.begin_alert() {
                pending = Some((token, t + args.alert_hold_ms));
            }
        }
    }

    let duration_ms = match (timed.first(), timed.last()) {
        (Some((first, _)), Some((last, _))) => last - first,
        _ => 0,
    };

    Ok(json!({
        "log": path.display().to_string(),
        "samples": timed.len(),
        "duration_ms": duration_ms,
        "max_delta": max_delta,
        "triggers": triggers.len(),
        "trigger_times_ms": triggers.iter().map(|t| t.at_ms).collect::<Vec<_>>(),
    }))
}

fn is_sample_log(name: &str) -> bool {
    let name = name.strip_suffix(".gz").unwrap_or(name);
    name.ends_with(".json") || name.ends_with(".jsonl")
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    let mut results = Vec::new();

    if let Some(dir) = args.dir.as_ref() {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if path.is_file() && is_sample_log(name) {
                paths.push(path);
            }
        }
        paths.sort();

        for path in paths {
            match run_once(&path, &args) {
                Ok(res) => results.push(res),
                Err(e) => eprintln!("Failed {}: {}", path.display(), e),
            }
        }
    } else if let Some(log) = args.log.as_ref() {
        results.push(run_once(log, &args)?);
    } else {
        anyhow::bail!("Provide --log or --dir");
    }

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
