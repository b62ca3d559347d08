//! Repository interface over devices, readings and alerts.
//!
//! Two backends implement it: [`crate::db::PgStore`] for PostgreSQL and
//! [`crate::memory::MemoryStore`] for in-process use. Both must agree on:
//!
//! - readings and alerts are append-only and always reference an existing device;
//! - recent-N queries order by timestamp descending (id descending on ties)
//!   and never return more than N rows;
//! - deleting a device removes its alerts and readings first, atomically.

use crate::errors::Result;
use crate::model::{
    Alert, AlertId, CascadeReport, Device, DeviceChanges, DeviceId, DeviceStatus, NewAlert,
    NewDevice, NewReading, Reading, ReadingId, StatusTransition,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// A device created as connected is treated as seen at creation.
    async fn create_device(&self, device: NewDevice) -> Result<Device>;

    async fn get_device(&self, id: DeviceId) -> Result<Option<Device>>;

    async fn list_devices(&self) -> Result<Vec<Device>>;

    /// Applies `name` and `priority`. Returns `None` for an unknown device.
    async fn update_device(&self, id: DeviceId, changes: DeviceChanges) -> Result<Option<Device>>;

    /// Sets the status, writing nothing when it already matches. A move to
    /// connected starts the silence clock at `at`.
    async fn set_device_status(
        &self,
        id: DeviceId,
        status: DeviceStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<StatusTransition>>;

    /// Records that a reading was received at `seen_at` (server time): status
    /// becomes connected and `last_seen_at` advances. It never moves back.
    async fn touch_device(&self, id: DeviceId, seen_at: DateTime<Utc>)
        -> Result<Option<StatusTransition>>;

    /// Moves every connected device last seen before `cutoff` to
    /// disconnected and returns the transitions that happened.
    async fn disconnect_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<StatusTransition>>;

    /// Deletes a device with all of its alerts and readings.
    async fn delete_device(&self, id: DeviceId) -> Result<Option<CascadeReport>>;

    /// Fails with `NotFound` when the device does not exist.
    async fn insert_reading(&self, reading: NewReading) -> Result<Reading>;

    async fn get_reading(&self, id: ReadingId) -> Result<Option<Reading>>;

    async fn recent_readings(&self, device: Option<DeviceId>, limit: usize)
        -> Result<Vec<Reading>>;

    /// Fails with `NotFound` when the device does not exist.
    async fn insert_alert(&self, alert: NewAlert) -> Result<Alert>;

    async fn get_alert(&self, id: AlertId) -> Result<Option<Alert>>;

    async fn recent_alerts(&self, device: Option<DeviceId>, limit: usize) -> Result<Vec<Alert>>;

    /// Cheap liveness check.
    async fn ping(&self) -> Result<()>;
}
