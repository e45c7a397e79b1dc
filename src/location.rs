use crate::error::{FResult, FallDetectionError};
use crate::types::Coordinates;
use futures::future::BoxFuture;
use serde::Deserialize;
use tokio::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
}

/// Platform location service
pub trait LocationProvider: Send + Sync {
    /// Ask for foreground location access.
    fn request_permission(&self) -> BoxFuture<'_, FResult<PermissionStatus>>;

    /// One-shot position fix.
    fn current_position(&self) -> BoxFuture<'_, FResult<Coordinates>>;
}

/// `termux-location` output (other fields ignored)
#[derive(Debug, Deserialize)]
struct TermuxFix {
    latitude: f64,
    longitude: f64,
}

/// Location through Termux:API
pub struct TermuxLocation;

impl TermuxLocation {
    async fn run(args: &[&str]) -> FResult<String> {
        let output = Command::new("termux-location")
            .args(args)
            .output()
            .await
            .map_err(|e| {
                FallDetectionError::LocationUnavailable(format!("termux-location: {}", e))
            })?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl LocationProvider for TermuxLocation {
    fn request_permission(&self) -> BoxFuture<'_, FResult<PermissionStatus>> {
        Box::pin(async {
            let output = Self::run(&["-p", "passive", "-r", "last"]).await?;
            Ok(permission_from_output(&output))
        })
    }

    fn current_position(&self) -> BoxFuture<'_, FResult<Coordinates>> {
        Box::pin(async {
            // Network provider is the balanced accuracy/latency setting
            let output = Self::run(&["-p", "network", "-r", "once"]).await?;
            parse_fix(&output)
        })
    }
}

fn permission_from_output(output: &str) -> PermissionStatus {
    let lowered = output.to_ascii_lowercase();
    if lowered.contains("api_error") || lowered.contains("permission") {
        PermissionStatus::Denied
    } else {
        PermissionStatus::Granted
    }
}

fn parse_fix(output: &str) -> FResult<Coordinates> {
    let fix: TermuxFix = serde_json::from_str(output.trim()).map_err(|e| {
        FallDetectionError::LocationUnavailable(format!("unreadable fix: {}", e))
    })?;
    Ok(Coordinates::new(fix.latitude, fix.longitude))
}

/// Reports the same coordinates every time
pub struct FixedLocation {
    coords: Option<Coordinates>,
    permission: PermissionStatus,
}

impl FixedLocation {
    pub fn new(coords: Coordinates) -> Self {
        Self {
            coords: Some(coords),
            permission: PermissionStatus::Granted,
        }
    }

    /// Permission is granted but no fix is ever available
    pub fn unavailable() -> Self {
        Self {
            coords: None,
            permission: PermissionStatus::Granted,
        }
    }

    pub fn with_permission(mut self, permission: PermissionStatus) -> Self {
        self.permission = permission;
        self
    }
}

impl LocationProvider for FixedLocation {
    fn request_permission(&self) -> BoxFuture<'_, FResult<PermissionStatus>> {
        let permission = self.permission;
        Box::pin(async move { Ok(permission) })
    }

    fn current_position(&self) -> BoxFuture<'_, FResult<Coordinates>> {
        let coords = self.coords;
        Box::pin(async move {
            coords.ok_or_else(|| {
                FallDetectionError::LocationUnavailable("no fixed position configured".to_string())
            })
        })
    }
}
