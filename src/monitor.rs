use crate::api::FallEventApi;
use crate::clock::Clock;
use crate::config::DetectorConfig;
use crate::detector::{AlertToken, FallDetector, Trigger};
use crate::error::{FResult, FallDetectionError};
use crate::location::{LocationProvider, PermissionStatus};
use crate::prompt::{ConfirmationPrompt, FallPrompt};
use crate::sensors::{AccelerometerSource, Subscription};
use crate::types::{AccelerationSample, Coordinates};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

/// Result of a `start_monitoring` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyMonitoring,
    PermissionDenied,
    /// Permission check or sensor subscription failed
    Failed,
}

/// Point-in-time view of the detector
#[derive(Debug, Clone, Serialize)]
pub struct MonitorSnapshot {
    pub is_monitoring: bool,
    pub is_alert_active: bool,
    pub last_sample: Option<AccelerationSample>,
    pub last_fall_at: Option<i64>,
    pub triggers: u64,
}

/// Platform and backend services the monitor talks to
pub struct Collaborators {
    pub sensor: Arc<dyn AccelerometerSource>,
    pub location: Arc<dyn LocationProvider>,
    pub api: Arc<dyn FallEventApi>,
    pub prompt: Arc<dyn ConfirmationPrompt>,
    pub clock: Arc<dyn Clock>,
}

struct DetectorState {
    monitoring: bool,
    /// Bumped on every start so a cancelled sampling task cannot feed samples
    session: u64,
    detector: FallDetector,
    triggers: u64,
}

struct Shared {
    state: Mutex<DetectorState>,
    prompt_text: FallPrompt,
    location: Arc<dyn LocationProvider>,
    api: Arc<dyn FallEventApi>,
    prompt: Arc<dyn ConfirmationPrompt>,
    clock: Arc<dyn Clock>,
}

/// Fall detection service.
///
/// Owns one detector and, while monitoring, one sensor subscription. Start
/// and stop are serialized, so repeated or concurrent starts subscribe once.
pub struct FallMonitor {
    config: DetectorConfig,
    sensor: Arc<dyn AccelerometerSource>,
    shared: Arc<Shared>,
    sampling: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl FallMonitor {
    pub fn new(config: DetectorConfig, collaborators: Collaborators) -> Self {
        let state = DetectorState {
            monitoring: false,
            session: 0,
            detector: FallDetector::from_config(&config),
            triggers: 0,
        };

        FallMonitor {
            config,
            sensor: collaborators.sensor,
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                prompt_text: FallPrompt::default(),
                location: collaborators.location,
                api: collaborators.api,
                prompt: collaborators.prompt,
                clock: collaborators.clock,
            }),
            sampling: tokio::sync::Mutex::new(None),
        }
    }

    /// Request location access and subscribe to the accelerometer.
    ///
    /// Failures are logged and reported through the outcome; they never
    /// propagate.
    pub async fn start_monitoring(&self) -> StartOutcome {
        let mut sampling = self.sampling.lock().await;
        if sampling.is_some() {
            return StartOutcome::AlreadyMonitoring;
        }

        match self.shared.location.request_permission().await {
            Ok(PermissionStatus::Granted) => {}
            Ok(PermissionStatus::Denied) => {
                log::warn!("Location permission denied, fall detection not started");
                return StartOutcome::PermissionDenied;
            }
            Err(e) => {
                log::error!("Error starting fall detection: {}", e);
                return StartOutcome::Failed;
            }
        }

        let subscription = match self.sensor.subscribe(self.config.sample_interval()) {
            Ok(subscription) => subscription,
            Err(e) => {
                log::error!("Error starting fall detection: {}", e);
                return StartOutcome::Failed;
            }
        };

        let session = match self.shared.begin_session() {
            Ok(session) => session,
            Err(e) => {
                log::error!("Error starting fall detection: {}", e);
                return StartOutcome::Failed;
            }
        };

        *sampling = Some(tokio::spawn(sampling_loop(
            self.shared.clone(),
            subscription,
            session,
        )));
        log::info!(
            "Fall detection started ({} Hz, threshold {:.1}, cooldown {} ms)",
            self.config.sample_rate_hz,
            self.config.threshold,
            self.config.cooldown_ms
        );
        StartOutcome::Started
    }

    /// Unsubscribe from the accelerometer and clear the detector.
    ///
    /// A trigger sequence already in flight runs to completion but can no
    /// longer affect the alert state.
    pub async fn stop_monitoring(&self) {
        let mut sampling = self.sampling.lock().await;
        let handle = match sampling.take() {
            Some(handle) => handle,
            None => return,
        };

        if let Err(e) = self.shared.end_session() {
            log::error!("Error stopping fall detection: {}", e);
        }
        handle.abort();
        log::info!("Fall detection stopped");
    }

    pub fn snapshot(&self) -> FResult<MonitorSnapshot> {
        let state = self.shared.lock_state()?;
        Ok(MonitorSnapshot {
            is_monitoring: state.monitoring,
            is_alert_active: state.detector.is_alert_active(),
            last_sample: state.detector.last_sample(),
            last_fall_at: state.detector.last_fall_at(),
            triggers: state.triggers,
        })
    }
}

async fn sampling_loop(shared: Arc<Shared>, mut subscription: Subscription, session: u64) {
    while let Some(sample) = subscription.recv().await {
        if let Some((trigger, alert)) = shared.on_sample(sample, session) {
            tokio::spawn(shared.clone().handle_potential_fall(trigger, alert));
        }
    }
    log::info!("Accelerometer stream ended");
}

impl Shared {
    fn lock_state(&self) -> FResult<std::sync::MutexGuard<'_, DetectorState>> {
        self.state
            .lock()
            .map_err(|_| FallDetectionError::Internal("Failed to acquire detector lock".to_string()))
    }

    fn begin_session(&self) -> FResult<u64> {
        let mut state = self.lock_state()?;
        state.monitoring = true;
        state.session += 1;
        Ok(state.session)
    }

    fn end_session(&self) -> FResult<()> {
        let mut state = self.lock_state()?;
        state.monitoring = false;
        state.detector.reset();
        Ok(())
    }

    /// Run one sample through the detector. On trigger the alert is begun
    /// under the same lock, so no second sequence can start in between.
    fn on_sample(&self, sample: AccelerationSample, session: u64) -> Option<(Trigger, AlertToken)> {
        let now = self.clock.now_ms();
        let mut state = match self.lock_state() {
            Ok(state) => state,
            Err(e) => {
                log::error!("Dropping sample: {}", e);
                return None;
            }
        };

        if !state.monitoring || state.session != session {
            return None;
        }

        let trigger = state.detector.process(sample, now)?;
        let alert = state.detector.begin_alert()?;
        state.triggers += 1;
        Some((trigger, alert))
    }

    fn end_alert(&self, alert: AlertToken) {
        match self.lock_state() {
            Ok(mut state) => {
                state.detector.end_alert(alert);
            }
            Err(e) => log::error!("Could not clear fall alert: {}", e),
        }
    }

    async fn handle_potential_fall(self: Arc<Self>, trigger: Trigger, alert: AlertToken) {
        log::warn!(
            "Possible fall detected (delta {:.2} at {} ms)",
            trigger.delta,
            trigger.at_ms
        );

        let location = match self.location.current_position().await {
            Ok(location) => location,
            Err(e) => {
                log::error!("Error handling potential fall: {}", e);
                self.end_alert(alert);
                return;
            }
        };

        self.report_fall(location).await;
        self.end_alert(alert);
    }

    /// Create the fall event, ask the user and record the answer.
    async fn report_fall(&self, location: Coordinates) {
        let event = match self.api.create_fall_event(location).await {
            Ok(event) => event,
            Err(e) => {
                log::error!("Error handling potential fall: {}", e);
                return;
            }
        };
        log::info!("Fall event {} created", event.id);

        let outcome = self.prompt.confirm(&self.prompt_text).await;
        let status = match outcome.status() {
            Some(status) => status,
            None => {
                log::info!("Fall prompt for event {} dismissed", event.id);
                return;
            }
        };

        match self.api.update_status(&event.id, status).await {
            Ok(()) => log::info!("Fall event {} marked {}", event.id, status.as_str()),
            Err(e) => log::error!("Error confirming fall event {}: {}", event.id, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::location::FixedLocation;
    use crate::prompt::{PromptOutcome, ScriptedPrompt};
    use crate::sensors::ManualAccelerometer;
    use crate::types::{FallEvent, FallStatus};
    use futures::future::BoxFuture;
    use std::time::Duration;

    /// Records calls and hands out sequential event ids
    #[derive(Default)]
    struct RecordingApi {
        created: Mutex<Vec<Coordinates>>,
        updates: Mutex<Vec<(String, FallStatus)>>,
        fail_create: bool,
        fail_update: bool,
    }

    impl FallEventApi for RecordingApi {
        fn create_fall_event(&self, location: Coordinates) -> BoxFuture<'_, FResult<FallEvent>> {
            Box::pin(async move {
                if self.fail_create {
                    return Err(FallDetectionError::ApiError("connection refused".to_string()));
                }
                let mut created = self.created.lock().unwrap();
                created.push(location);
                let json = format!(r#"{{"_id": "evt-{}"}}"#, created.len());
                Ok(serde_json::from_str(&json).unwrap())
            })
        }

        fn update_status<'a>(
            &'a self,
            event_id: &'a str,
            status: FallStatus,
        ) -> BoxFuture<'a, FResult<()>> {
            Box::pin(async move {
                self.updates
                    .lock()
                    .unwrap()
                    .push((event_id.to_string(), status));
                if self.fail_update {
                    return Err(FallDetectionError::ApiStatus {
                        status: 500,
                        body: "boom".to_string(),
                    });
                }
                Ok(())
            })
        }
    }

    struct Harness {
        monitor: FallMonitor,
        sensor: Arc<ManualAccelerometer>,
        api: Arc<RecordingApi>,
        prompt: Arc<ScriptedPrompt>,
        clock: Arc<ManualClock>,
    }

    fn harness_with(
        location: FixedLocation,
        api: RecordingApi,
        answers: Vec<PromptOutcome>,
    ) -> Harness {
        let sensor = Arc::new(ManualAccelerometer::new());
        let api = Arc::new(api);
        let prompt = Arc::new(ScriptedPrompt::new(answers));
        let clock = Arc::new(ManualClock::new(0));

        let monitor = FallMonitor::new(
            DetectorConfig::default(),
            Collaborators {
                sensor: sensor.clone(),
                location: Arc::new(location),
                api: api.clone(),
                prompt: prompt.clone(),
                clock: clock.clone(),
            },
        );

        Harness {
            monitor,
            sensor,
            api,
            prompt,
            clock,
        }
    }

    fn harness(answers: Vec<PromptOutcome>) -> Harness {
        harness_with(
            FixedLocation::new(Coordinates::new(6.9271, 79.8612)),
            RecordingApi::default(),
            answers,
        )
    }

    /// Poll until `cond` holds or two seconds pass
    async fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..400 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    impl Harness {
        /// Push a sample at `t` ms and wait for the detector to record it
        async fn feed(&self, t: i64, x: f64, y: f64, z: f64) {
            self.clock.set(t);
            let sample = AccelerationSample::new(x, y, z);
            assert_eq!(self.sensor.push(sample), 1);
            wait_until(|| self.monitor.snapshot().unwrap().last_sample == Some(sample)).await;
        }

        async fn wait_for_alert_cleared(&self) {
            wait_until(|| !self.monitor.snapshot().unwrap().is_alert_active).await;
        }

        fn triggers(&self) -> u64 {
            self.monitor.snapshot().unwrap().triggers
        }
    }

    #[tokio::test]
    async fn test_trigger_reports_and_resolves() {
        let h = harness(vec![PromptOutcome::Okay]);
        assert_eq!(h.monitor.start_monitoring().await, StartOutcome::Started);

        h.feed(0, 0.0, 0.0, 0.0).await;
        h.feed(100, 0.0, 0.0, 0.0).await;
        h.feed(200, 10.0, 0.0, 0.0).await;

        assert_eq!(h.triggers(), 1);
        assert_eq!(h.monitor.snapshot().unwrap().last_fall_at, Some(200));

        wait_until(|| h.api.updates.lock().unwrap().len() == 1).await;
        h.wait_for_alert_cleared().await;

        assert_eq!(
            *h.api.created.lock().unwrap(),
            vec![Coordinates::new(6.9271, 79.8612)]
        );
        assert_eq!(
            *h.api.updates.lock().unwrap(),
            vec![("evt-1".to_string(), FallStatus::Resolved)]
        );
    }

    #[tokio::test]
    async fn test_need_help_confirms_event() {
        let h = harness(vec![PromptOutcome::NeedHelp]);
        h.monitor.start_monitoring().await;

        h.feed(0, 0.0, 0.0, 9.8).await;
        h.feed(100, 0.0, 15.0, 9.8).await;

        wait_until(|| h.api.updates.lock().unwrap().len() == 1).await;
        assert_eq!(h.api.updates.lock().unwrap()[0].1, FallStatus::Confirmed);
        h.wait_for_alert_cleared().await;
    }

    #[tokio::test]
    async fn test_dismiss_clears_alert_without_patch() {
        let h = harness(vec![PromptOutcome::Dismissed]);
        h.monitor.start_monitoring().await;

        h.feed(0, 0.0, 0.0, 0.0).await;
        h.feed(100, 20.0, 0.0, 0.0).await;

        wait_until(|| h.prompt.times_asked() == 1).await;
        h.wait_for_alert_cleared().await;
        assert!(h.api.updates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_quiet_stream_never_triggers() {
        let h = harness(vec![]);
        h.monitor.start_monitoring().await;

        for i in 0..50 {
            let wobble = if i % 2 == 0 { 0.4 } else { -0.4 };
            h.feed(i * 100, wobble, 0.1, 9.8).await;
        }

        assert_eq!(h.triggers(), 0);
        assert!(h.api.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cooldown_then_rearm() {
        let h = harness(vec![PromptOutcome::Okay, PromptOutcome::Okay]);
        h.monitor.start_monitoring().await;

        h.feed(-100, 0.0, 0.0, 0.0).await;
        h.feed(0, 20.0, 0.0, 0.0).await;
        assert_eq!(h.triggers(), 1);
        h.wait_for_alert_cleared().await;

        // Inside the cooldown window
        h.feed(4_900, 0.0, 0.0, 0.0).await;
        h.feed(5_000, 20.0, 0.0, 0.0).await;
        assert_eq!(h.triggers(), 1);

        // Cooldown elapsed and first alert resolved
        h.feed(10_000, 0.0, 0.0, 0.0).await;
        h.feed(10_001, 20.0, 0.0, 0.0).await;
        assert_eq!(h.triggers(), 2);

        wait_until(|| h.api.updates.lock().unwrap().len() == 2).await;
        let updates = h.api.updates.lock().unwrap().clone();
        assert_eq!(updates[1].0, "evt-2");
    }

    #[tokio::test]
    async fn test_location_failure_clears_alert() {
        let h = harness_with(FixedLocation::unavailable(), RecordingApi::default(), vec![]);
        h.monitor.start_monitoring().await;

        h.feed(0, 0.0, 0.0, 0.0).await;
        h.feed(100, 20.0, 0.0, 0.0).await;
        assert_eq!(h.triggers(), 1);

        h.wait_for_alert_cleared().await;
        assert!(h.api.created.lock().unwrap().is_empty());
        assert_eq!(h.prompt.times_asked(), 0);
    }

    #[tokio::test]
    async fn test_create_failure_clears_alert() {
        let api = RecordingApi {
            fail_create: true,
            ..Default::default()
        };
        let h = harness_with(FixedLocation::new(Coordinates::new(0.0, 0.0)), api, vec![]);
        h.monitor.start_monitoring().await;

        h.feed(0, 0.0, 0.0, 0.0).await;
        h.feed(100, 20.0, 0.0, 0.0).await;

        h.wait_for_alert_cleared().await;
        assert_eq!(h.prompt.times_asked(), 0);

        // Dropped, not retried
        h.feed(20_000, 20.5, 0.0, 0.0).await;
        assert_eq!(h.triggers(), 1);
        assert!(h.api.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_failure_is_not_retried() {
        let api = RecordingApi {
            fail_update: true,
            ..Default::default()
        };
        let h = harness_with(
            FixedLocation::new(Coordinates::new(0.0, 0.0)),
            api,
            vec![PromptOutcome::NeedHelp],
        );
        h.monitor.start_monitoring().await;

        h.feed(0, 0.0, 0.0, 0.0).await;
        h.feed(100, 20.0, 0.0, 0.0).await;

        h.wait_for_alert_cleared().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.api.updates.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_permission_denied_does_not_start() {
        let h = harness_with(
            FixedLocation::new(Coordinates::new(0.0, 0.0)).with_permission(PermissionStatus::Denied),
            RecordingApi::default(),
            vec![],
        );

        assert_eq!(h.monitor.start_monitoring().await, StartOutcome::PermissionDenied);
        assert_eq!(h.sensor.active_subscriptions(), 0);
        assert!(!h.monitor.snapshot().unwrap().is_monitoring);
    }

    #[tokio::test]
    async fn test_double_start_subscribes_once() {
        let h = harness(vec![]);
        assert_eq!(h.monitor.start_monitoring().await, StartOutcome::Started);
        assert_eq!(
            h.monitor.start_monitoring().await,
            StartOutcome::AlreadyMonitoring
        );
        assert_eq!(h.sensor.active_subscriptions(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_starts_subscribe_once() {
        let h = harness(vec![]);
        let (a, b) = tokio::join!(h.monitor.start_monitoring(), h.monitor.start_monitoring());

        let mut outcomes = vec![a, b];
        outcomes.sort_by_key(|o| *o == StartOutcome::Started);
        assert_eq!(
            outcomes,
            vec![StartOutcome::AlreadyMonitoring, StartOutcome::Started]
        );
        assert_eq!(h.sensor.active_subscriptions(), 1);
    }

    #[tokio::test]
    async fn test_stop_then_samples_is_silent() {
        let h = harness(vec![]);
        h.monitor.start_monitoring().await;
        h.feed(0, 0.0, 0.0, 0.0).await;

        h.monitor.stop_monitoring().await;
        let snapshot = h.monitor.snapshot().unwrap();
        assert!(!snapshot.is_monitoring);
        assert!(snapshot.last_sample.is_none());
        assert!(!snapshot.is_alert_active);

        wait_until(|| h.sensor.active_subscriptions() == 0).await;
        h.clock.set(100);
        assert_eq!(h.sensor.push(AccelerationSample::new(50.0, 0.0, 0.0)), 0);
        assert_eq!(h.triggers(), 0);

        // Stopping twice is a no-op
        h.monitor.stop_monitoring().await;
    }

    #[tokio::test]
    async fn test_restart_needs_fresh_reference_sample() {
        let h = harness(vec![]);
        h.monitor.start_monitoring().await;
        h.feed(0, 0.0, 0.0, 0.0).await;
        h.monitor.stop_monitoring().await;
        wait_until(|| h.sensor.active_subscriptions() == 0).await;

        assert_eq!(h.monitor.start_monitoring().await, StartOutcome::Started);
        // First sample after restart cannot trigger, however far it jumps
        h.feed(100, 50.0, 0.0, 0.0).await;
        assert_eq!(h.triggers(), 0);
    }
}
