//! Versioned JSON shapes exchanged with producers and dashboards.
//!
//! These are written out by hand and converted explicitly from domain
//! types, so a storage change never silently changes the wire format.

pub mod v1 {
    use crate::errors::{Error, Result};
    use crate::model::{
        Alert, CascadeReport, Context, Device, DeviceChanges, DeviceId, DeviceStatus, NewDevice,
        Reading, ReadingSubmission,
    };
    use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
    use serde::{Deserialize, Deserializer, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct ReadingV1 {
        pub id: i64,
        pub device: DeviceId,
        pub device_name: String,
        pub current: Option<f64>,
        pub temperature: Option<f64>,
        pub vibration: Option<f64>,
        pub voltage: Option<f64>,
        pub timestamp: DateTime<Utc>,
    }

    impl From<Reading> for ReadingV1 {
        fn from(r: Reading) -> Self {
            Self {
                id: r.id,
                device: r.device_id,
                device_name: r.device_name,
                current: r.current,
                temperature: r.temperature,
                vibration: r.vibration,
                voltage: r.voltage,
                timestamp: r.timestamp,
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct AlertV1 {
        pub id: i64,
        pub message: String,
        pub timestamp: DateTime<Utc>,
        pub alert_type: String,
        pub device: DeviceId,
        pub device_name: String,
        pub device_id: DeviceId,
        pub severity: String,
    }

    impl From<Alert> for AlertV1 {
        fn from(a: Alert) -> Self {
            Self {
                id: a.id,
                message: a.message,
                timestamp: a.timestamp,
                alert_type: a.alert_type,
                device: a.device_id,
                device_name: a.device_name,
                device_id: a.device_id,
                severity: a.severity.to_string(),
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct DeviceV1 {
        pub id: DeviceId,
        pub name: String,
        pub priority: i32,
        pub status: String,
        pub owner: String,
        pub last_seen: Option<DateTime<Utc>>,
    }

    impl From<Device> for DeviceV1 {
        fn from(d: Device) -> Self {
            Self {
                id: d.id,
                name: d.name,
                priority: d.priority,
                status: d.status.to_string(),
                owner: d.owner,
                last_seen: d.last_seen_at,
            }
        }
    }

    /// Body of a reading submission. `device` is optional on the wire only
    /// because MQTT producers may carry it in the topic instead.
    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    pub struct CreateReadingV1 {
        #[serde(default, alias = "device_id")]
        pub device: Option<DeviceId>,
        #[serde(default, deserialize_with = "lenient_timestamp")]
        pub timestamp: Option<DateTime<Utc>>,
        #[serde(default)]
        pub current: Option<f64>,
        #[serde(default)]
        pub temperature: Option<f64>,
        #[serde(default)]
        pub vibration: Option<f64>,
        #[serde(default)]
        pub voltage: Option<f64>,
    }

    impl CreateReadingV1 {
        pub fn into_submission(self) -> Result<ReadingSubmission> {
            let device_id = self
                .device
                .ok_or_else(|| Error::InvalidFields(vec!["device".to_string()]))?;
            Ok(ReadingSubmission {
                device_id,
                timestamp: self.timestamp,
                current: self.current,
                temperature: self.temperature,
                vibration: self.vibration,
                voltage: self.voltage,
            })
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct CreateDeviceV1 {
        pub name: String,
        #[serde(default = "default_priority")]
        pub priority: i32,
        #[serde(default)]
        pub status: Option<String>,
        #[serde(default, alias = "user")]
        pub owner: Option<String>,
    }

    fn default_priority() -> i32 {
        1
    }

    impl CreateDeviceV1 {
        /// A device without an explicit owner belongs to the caller.
        pub fn into_new_device(self, ctx: &Context) -> Result<NewDevice> {
            let status = match self.status {
                Some(s) => s.parse()?,
                None => DeviceStatus::default(),
            };
            Ok(NewDevice {
                name: self.name,
                priority: self.priority,
                status,
                owner: self
                    .owner
                    .unwrap_or_else(|| ctx.principal().to_string()),
            })
        }
    }

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    pub struct UpdateDeviceV1 {
        #[serde(default)]
        pub name: Option<String>,
        #[serde(default)]
        pub priority: Option<i32>,
        #[serde(default)]
        pub status: Option<String>,
    }

    impl UpdateDeviceV1 {
        pub fn into_changes(self) -> Result<DeviceChanges> {
            let status = self
                .status
                .map(|s| s.parse::<DeviceStatus>())
                .transpose()?;
            Ok(DeviceChanges {
                name: self.name,
                priority: self.priority,
                status,
            })
        }
    }

    /// Returned from a device deletion so callers see what went with it.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct DeleteDeviceV1 {
        pub device: DeviceId,
        pub device_name: String,
        pub readings_deleted: u64,
        pub alerts_deleted: u64,
    }

    impl From<CascadeReport> for DeleteDeviceV1 {
        fn from(r: CascadeReport) -> Self {
            Self {
                device: r.device.id,
                device_name: r.device.name,
                readings_deleted: r.readings_deleted,
                alerts_deleted: r.alerts_deleted,
            }
        }
    }

    #[derive(Debug, Clone, Default, Deserialize)]
    pub struct RecentQuery {
        pub device: Option<DeviceId>,
        pub limit: Option<usize>,
    }

    /// Accepts RFC 3339, or a naive ISO 8601 timestamp taken as UTC.
    fn lenient_timestamp<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        raw.map(|s| parse_timestamp(&s).map_err(serde::de::Error::custom))
            .transpose()
    }

    pub fn parse_timestamp(s: &str) -> std::result::Result<DateTime<Utc>, String> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
            return Ok(ts.with_timezone(&Utc));
        }
        for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
                return Ok(Utc.from_utc_datetime(&naive));
            }
        }
        Err(format!("invalid timestamp '{}'", s))
    }

}
