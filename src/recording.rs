use crate::error::FResult;
use crate::types::AccelerationSample;
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// Accelerometer sample as stored in a recording
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecordedSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Milliseconds since the start of the recording
    #[serde(rename = "t", default)]
    pub timestamp_ms: Option<i64>,
}

impl RecordedSample {
    pub fn sample(&self) -> AccelerationSample {
        AccelerationSample::new(self.x, self.y, self.z)
    }
}

/// Load a recording from `.json` (array) or `.jsonl` (one sample per line),
/// optionally gzip-compressed.
pub fn load_samples(path: &Path) -> FResult<Vec<RecordedSample>> {
    let file = File::open(path)?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let (reader, stem): (Box<dyn Read>, &str) = match name.strip_suffix(".gz") {
        Some(stem) => (Box::new(GzDecoder::new(file)), stem),
        None => (Box::new(file), name.as_str()),
    };

    let reader = BufReader::new(reader);
    if stem.ends_with(".jsonl") {
        parse_lines(reader)
    } else {
        Ok(serde_json::from_reader(reader)?)
    }
}

fn parse_lines(reader: impl BufRead) -> FResult<Vec<RecordedSample>> {
    let mut samples = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        samples.push(serde_json::from_str(&line)?);
    }
    Ok(samples)
}

/// Fill in missing timestamps assuming a fixed sample spacing.
pub fn with_timestamps(samples: &[RecordedSample], interval_ms: i64) -> Vec<(i64, AccelerationSample)> {
    let mut last = None;
    samples
        .iter()
        .map(|s| {
            let t = match (s.timestamp_ms, last) {
                (Some(t), _) => t,
                (None, Some(prev)) => prev + interval_ms,
                (None, None) => 0,
            };
            last = Some(t);
            (t, s.sample())
        })
        .collect()
}
