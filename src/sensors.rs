use crate::error::{FResult, FallDetectionError};
use crate::types::AccelerationSample;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::process::Command;
use tokio::sync::mpsc::{self, error::TrySendError, Receiver, Sender};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

const SAMPLE_CHANNEL_CAPACITY: usize = 64;

/// Live accelerometer subscription.
///
/// Dropping it unsubscribes: the receiver closes and any producer task is
/// aborted.
pub struct Subscription {
    samples: Receiver<AccelerationSample>,
    producer: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(samples: Receiver<AccelerationSample>, producer: Option<JoinHandle<()>>) -> Self {
        Self { samples, producer }
    }

    pub async fn recv(&mut self) -> Option<AccelerationSample> {
        self.samples.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(producer) = self.producer.take() {
            producer.abort();
        }
    }
}

/// Platform accelerometer
pub trait AccelerometerSource: Send + Sync {
    /// Start delivering samples roughly every `interval`.
    fn subscribe(&self, interval: Duration) -> FResult<Subscription>;
}

/// Reads the phone accelerometer through Termux:API
pub struct TermuxAccelerometer;

impl AccelerometerSource for TermuxAccelerometer {
    fn subscribe(&self, period: Duration) -> FResult<Subscription> {
        let (tx, rx) = mpsc::channel(SAMPLE_CHANNEL_CAPACITY);
        let producer = tokio::spawn(accel_loop(tx, period));
        Ok(Subscription::new(rx, Some(producer)))
    }
}

async fn accel_loop(tx: Sender<AccelerationSample>, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut sample_count = 0u64;
    let mut failed_reads = 0u64;

    loop {
        ticker.tick().await;

        let sample = match read_accelerometer().await {
            Some(sample) => {
                failed_reads = 0;
                sample
            }
            None => {
                failed_reads += 1;
                if failed_reads == 50 {
                    log::warn!("[accel] 50 consecutive failed reads from termux-sensor");
                }
                continue;
            }
        };

        match tx.try_send(sample) {
            Ok(_) => {
                sample_count += 1;
                if sample_count % 600 == 0 {
                    log::debug!("[accel] {} samples", sample_count);
                }
            }
            Err(TrySendError::Closed(_)) => {
                log::debug!("[accel] Channel closed after {} samples", sample_count);
                break;
            }
            Err(TrySendError::Full(_)) => {
                // Consumer is behind, drop this sample
            }
        }
    }
}

async fn read_accelerometer() -> Option<AccelerationSample> {
    let output = Command::new("termux-sensor")
        .arg("-s")
        .arg("accelerometer")
        .arg("-n")
        .arg("1")
        .output()
        .await
        .ok()?;

    if !output.status.success() {
        return None;
    }
    parse_sensor_output(&String::from_utf8_lossy(&output.stdout))
}

/// Parse termux-sensor JSON output.
///
/// Example: `{"lsm6dso Accelerometer": {"values": [0.12, 9.79, 0.33]}}`
fn parse_sensor_output(output: &str) -> Option<AccelerationSample> {
    let root: Value = serde_json::from_str(output.trim()).ok()?;
    root.as_object()?.values().find_map(|sensor| {
        let values = sensor.get("values")?.as_array()?;
        if values.len() < 3 {
            return None;
        }
        Some(AccelerationSample::new(
            values[0].as_f64()?,
            values[1].as_f64()?,
            values[2].as_f64()?,
        ))
    })
}

/// Plays back a recorded list of samples, one per tick, then ends the stream
pub struct ReplayAccelerometer {
    samples: Arc<Vec<AccelerationSample>>,
}

impl ReplayAccelerometer {
    pub fn new(samples: Vec<AccelerationSample>) -> Self {
        Self {
            samples: Arc::new(samples),
        }
    }
}

impl AccelerometerSource for ReplayAccelerometer {
    fn subscribe(&self, period: Duration) -> FResult<Subscription> {
        let (tx, rx) = mpsc::channel(SAMPLE_CHANNEL_CAPACITY);
        let samples = self.samples.clone();

        let producer = tokio::spawn(async move {
            let mut ticker = interval(period);
            for sample in samples.iter() {
                ticker.tick().await;
                if tx.send(*sample).await.is_err() {
                    return;
                }
            }
            log::info!("[accel] replay finished after {} samples", samples.len());
        });

        Ok(Subscription::new(rx, Some(producer)))
    }
}

/// Push-driven source: samples are delivered when the owner calls `push`
#[derive(Default)]
pub struct ManualAccelerometer {
    subscribers: Mutex<Vec<Sender<AccelerationSample>>>,
}

impl ManualAccelerometer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a sample to every live subscription. Returns how many
    /// subscriptions accepted it.
    pub fn push(&self, sample: AccelerationSample) -> usize {
        let mut subscribers = match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(_) => return 0,
        };
        subscribers.retain(|tx| !tx.is_closed());
        subscribers
            .iter()
            .filter(|tx| tx.try_send(sample).is_ok())
            .count()
    }

    pub fn active_subscriptions(&self) -> usize {
        self.subscribers
            .lock()
            .map(|subscribers| subscribers.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }
}

impl AccelerometerSource for ManualAccelerometer {
    fn subscribe(&self, _interval: Duration) -> FResult<Subscription> {
        let (tx, rx) = mpsc::channel(SAMPLE_CHANNEL_CAPACITY);
        self.subscribers
            .lock()
            .map_err(|_| {
                FallDetectionError::Internal("Failed to acquire subscriber lock".to_string())
            })?
            .push(tx);
        Ok(Subscription::new(rx, None))
    }
}
