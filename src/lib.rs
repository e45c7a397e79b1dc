// Fall detection core for the caregiving client
// Accelerometer heuristic, alert debouncing and fall-event reporting

pub mod api;
pub mod auth;
pub mod clock;
pub mod config;
pub mod detector;
pub mod error;
pub mod location;
pub mod monitor;
pub mod prompt;
pub mod recording;
pub mod sensors;
pub mod types;

pub use config::Config;
pub use detector::{FallDetector, Trigger};
pub use error::{FResult, FallDetectionError};
pub use monitor::{Collaborators, FallMonitor, MonitorSnapshot, StartOutcome};
pub use types::{AccelerationSample, Coordinates, FallEvent, FallStatus};
