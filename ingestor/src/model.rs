use crate::errors::Error;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

pub type DeviceId = i64;
pub type ReadingId = i64;
pub type AlertId = i64;

/// Connectivity state of a monitored device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DeviceStatus {
    Connected,
    #[default]
    Disconnected,
    Maintenance,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Connected => "connected",
            DeviceStatus::Disconnected => "disconnected",
            DeviceStatus::Maintenance => "maintenance",
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "connected" => Ok(DeviceStatus::Connected),
            "disconnected" => Ok(DeviceStatus::Disconnected),
            "maintenance" => Ok(DeviceStatus::Maintenance),
            other => Err(Error::Validation(format!("unknown device status '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "critical" => Ok(Severity::Critical),
            other => Err(Error::Validation(format!("unknown severity '{}'", other))),
        }
    }
}

/// Categories raised by the alert engine. Stored as free-form text so that
/// older rows with other categories still load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertKind {
    Overheating,
    Overloading,
    PowerDisconnect,
    ExcessVibration,
    VoltageAnomaly,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Overheating => "Overheating",
            AlertKind::Overloading => "Overloading",
            AlertKind::PowerDisconnect => "Power Disconnect",
            AlertKind::ExcessVibration => "Excess Vibration",
            AlertKind::VoltageAnomaly => "Voltage Anomaly",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    pub priority: i32,
    pub status: DeviceStatus,
    pub owner: String,
    /// Time of the most recent ingested reading.
    pub last_seen_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewDevice {
    pub name: String,
    pub priority: i32,
    pub status: DeviceStatus,
    pub owner: String,
}

/// Fields of a device that may be changed after registration.
/// [`crate::store::Store::update_device`] only applies `name` and `priority`;
/// `status` is routed through [`crate::store::Store::set_device_status`].
#[derive(Debug, Clone, Default)]
pub struct DeviceChanges {
    pub name: Option<String>,
    pub priority: Option<i32>,
    pub status: Option<DeviceStatus>,
}

/// A persisted multi-channel sensor sample. `device_name` is joined from
/// the owning device when loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub id: ReadingId,
    pub device_id: DeviceId,
    pub device_name: String,
    pub timestamp: DateTime<Utc>,
    pub current: Option<f64>,
    pub temperature: Option<f64>,
    pub vibration: Option<f64>,
    pub voltage: Option<f64>,
}

/// A candidate reading as submitted by a producer, before validation.
#[derive(Debug, Clone, Default)]
pub struct ReadingSubmission {
    pub device_id: DeviceId,
    pub timestamp: Option<DateTime<Utc>>,
    pub current: Option<f64>,
    pub temperature: Option<f64>,
    pub vibration: Option<f64>,
    pub voltage: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct NewReading {
    pub device_id: DeviceId,
    pub timestamp: DateTime<Utc>,
    pub current: Option<f64>,
    pub temperature: Option<f64>,
    pub vibration: Option<f64>,
    pub voltage: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub id: AlertId,
    pub device_id: DeviceId,
    pub device_name: String,
    pub message: String,
    pub alert_type: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAlert {
    pub device_id: DeviceId,
    pub message: String,
    pub alert_type: String,
    pub severity: Severity,
}

/// Result of setting a device's status. `previous == device.status` means
/// nothing was written.
#[derive(Debug, Clone)]
pub struct StatusTransition {
    pub device: Device,
    pub previous: DeviceStatus,
}

impl StatusTransition {
    pub fn changed(&self) -> bool {
        self.previous != self.device.status
    }
}

/// What a cascading device deletion removed.
#[derive(Debug, Clone)]
pub struct CascadeReport {
    pub device: Device,
    pub readings_deleted: u64,
    pub alerts_deleted: u64,
}

/// Caller context passed into every registry and gateway operation.
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub identity: Option<String>,
}

impl Context {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_identity(identity: impl Into<String>) -> Self {
        Self {
            identity: Some(identity.into()),
        }
    }

    pub fn principal(&self) -> &str {
        self.identity.as_deref().unwrap_or("anonymous")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_is_case_insensitive() {
        assert_eq!(
            "Connected".parse::<DeviceStatus>().unwrap(),
            DeviceStatus::Connected
        );
        assert!("online".parse::<DeviceStatus>().is_err());
        assert_eq!(DeviceStatus::default(), DeviceStatus::Disconnected);
    }

    #[test]
    fn test_severity_ordering_and_default() {
        assert!(Severity::Critical > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
        assert_eq!(Severity::default(), Severity::Info);
        assert_eq!("critical".parse::<Severity>().unwrap(), Severity::Critical);
    }

    #[test]
    fn test_context_principal() {
        assert_eq!(Context::anonymous().principal(), "anonymous");
        assert_eq!(Context::with_identity("ops").principal(), "ops");
    }
}
