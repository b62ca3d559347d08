//! Threshold rules that turn readings and device transitions into alerts.
//!
//! The engine never touches the store. It returns [`NewAlert`] values and
//! the caller decides how to persist them.

use crate::model::{AlertKind, Device, DeviceStatus, NewAlert, Reading, Severity};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;

/// Configurable limits for every rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds {
    /// Degrees Celsius.
    pub temperature_max: f64,
    /// Amperes.
    pub current_max: f64,
    /// m/s².
    pub vibration_max: f64,
    pub voltage_min: f64,
    pub voltage_max: f64,
    /// A connected device silent for longer than this is considered disconnected.
    pub disconnect_after: Duration,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            temperature_max: 35.0,
            current_max: 25.0,
            vibration_max: 15.0,
            voltage_min: 200.0,
            voltage_max: 250.0,
            disconnect_after: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AlertEngine {
    thresholds: Thresholds,
}

impl AlertEngine {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Evaluates every reading rule. Each rule that fires yields its own
    /// alert; nothing is coalesced.
    pub fn evaluate_reading(&self, reading: &Reading) -> Vec<NewAlert> {
        let t = &self.thresholds;
        let mut alerts = Vec::new();

        if let Some(temperature) = reading.temperature {
            if temperature > t.temperature_max {
                alerts.push(alert(
                    reading,
                    AlertKind::Overheating,
                    Severity::Critical,
                    format!(
                        "Temperature {}°C exceeded threshold ({}°C)",
                        value(temperature),
                        value(t.temperature_max)
                    ),
                ));
            }
        }

        if let Some(current) = reading.current {
            if current > t.current_max {
                alerts.push(alert(
                    reading,
                    AlertKind::Overloading,
                    Severity::Warning,
                    format!(
                        "Current {}A exceeded threshold ({}A)",
                        value(current),
                        value(t.current_max)
                    ),
                ));
            }
        }

        if let Some(vibration) = reading.vibration {
            if vibration > t.vibration_max {
                alerts.push(alert(
                    reading,
                    AlertKind::ExcessVibration,
                    Severity::Warning,
                    format!(
                        "Vibration {}m/s² exceeded threshold ({}m/s²)",
                        value(vibration),
                        value(t.vibration_max)
                    ),
                ));
            }
        }

        if let Some(voltage) = reading.voltage {
            if voltage < t.voltage_min || voltage > t.voltage_max {
                alerts.push(alert(
                    reading,
                    AlertKind::VoltageAnomaly,
                    Severity::Warning,
                    format!(
                        "Voltage {}V outside safe range ({}V-{}V)",
                        value(voltage),
                        value(t.voltage_min),
                        value(t.voltage_max)
                    ),
                ));
            }
        }

        alerts
    }

    /// Evaluates a device status change. Only a drop from connected to
    /// disconnected raises anything.
    pub fn evaluate_transition(
        &self,
        device: &Device,
        previous: DeviceStatus,
        now: DateTime<Utc>,
    ) -> Vec<NewAlert> {
        if previous != DeviceStatus::Connected || device.status != DeviceStatus::Disconnected {
            return Vec::new();
        }

        let message = match device.last_seen_at {
            Some(seen) => {
                let silent = (now - seen).num_seconds().max(0);
                format!(
                    "No reading from {} for {}s (timeout {}s)",
                    device.name,
                    silent,
                    self.thresholds.disconnect_after.as_secs()
                )
            }
            None => format!("{} reported disconnected", device.name),
        };

        vec![NewAlert {
            device_id: device.id,
            message,
            alert_type: AlertKind::PowerDisconnect.to_string(),
            severity: Severity::Critical,
        }]
    }

    /// Connected devices last seen before this instant count as silent.
    pub fn stale_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let timeout = ChronoDuration::from_std(self.thresholds.disconnect_after)
            .unwrap_or_else(|_| ChronoDuration::seconds(i64::from(u32::MAX)));
        now - timeout
    }
}

/// Two decimals, switching to scientific notation for magnitudes that would
/// not fit an alert message.
fn value(v: f64) -> String {
    if v.abs() < 1e9 {
        format!("{:.2}", v)
    } else {
        format!("{:.2e}", v)
    }
}

fn alert(reading: &Reading, kind: AlertKind, severity: Severity, message: String) -> NewAlert {
    NewAlert {
        device_id: reading.device_id,
        message,
        alert_type: kind.to_string(),
        severity,
    }
}
