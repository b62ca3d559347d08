//! In-process store. Selected with `DATABASE_URL=memory`; also backs the
//! test-suite.

use crate::errors::{Error, Result};
use crate::model::{
    Alert, AlertId, CascadeReport, Device, DeviceChanges, DeviceId, DeviceStatus, NewAlert,
    NewDevice, NewReading, Reading, ReadingId, StatusTransition,
};
use crate::store::Store;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Tables {
    next_device_id: DeviceId,
    next_reading_id: ReadingId,
    next_alert_id: AlertId,
    devices: BTreeMap<DeviceId, Device>,
    readings: BTreeMap<ReadingId, StoredReading>,
    alerts: BTreeMap<AlertId, StoredAlert>,
}

#[derive(Debug, Clone)]
struct StoredReading {
    device_id: DeviceId,
    timestamp: DateTime<Utc>,
    current: Option<f64>,
    temperature: Option<f64>,
    vibration: Option<f64>,
    voltage: Option<f64>,
}

#[derive(Debug, Clone)]
struct StoredAlert {
    device_id: DeviceId,
    message: String,
    alert_type: String,
    severity: crate::model::Severity,
    timestamp: DateTime<Utc>,
}

impl Tables {
    fn device_name(&self, id: DeviceId) -> String {
        self.devices
            .get(&id)
            .map(|d| d.name.clone())
            .unwrap_or_default()
    }

    fn reading(&self, id: ReadingId, r: &StoredReading) -> Reading {
        Reading {
            id,
            device_id: r.device_id,
            device_name: self.device_name(r.device_id),
            timestamp: r.timestamp,
            current: r.current,
            temperature: r.temperature,
            vibration: r.vibration,
            voltage: r.voltage,
        }
    }

    fn alert(&self, id: AlertId, a: &StoredAlert) -> Alert {
        Alert {
            id,
            device_id: a.device_id,
            device_name: self.device_name(a.device_id),
            message: a.message.clone(),
            alert_type: a.alert_type.clone(),
            severity: a.severity,
            timestamp: a.timestamp,
        }
    }
}

fn advance(last_seen_at: &mut Option<DateTime<Utc>>, seen_at: DateTime<Utc>) {
    *last_seen_at = Some(last_seen_at.map_or(seen_at, |prev| prev.max(seen_at)));
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_device(&self, new: NewDevice) -> Result<Device> {
        let mut tables = self.tables.write().await;
        tables.next_device_id += 1;
        let device = Device {
            id: tables.next_device_id,
            name: new.name,
            priority: new.priority,
            status: new.status,
            last_seen_at: (new.status == DeviceStatus::Connected).then(Utc::now),
            owner: new.owner,
        };
        tables.devices.insert(device.id, device.clone());
        Ok(device)
    }

    async fn get_device(&self, id: DeviceId) -> Result<Option<Device>> {
        Ok(self.tables.read().await.devices.get(&id).cloned())
    }

    async fn list_devices(&self) -> Result<Vec<Device>> {
        Ok(self.tables.read().await.devices.values().cloned().collect())
    }

    async fn update_device(&self, id: DeviceId, changes: DeviceChanges) -> Result<Option<Device>> {
        let mut tables = self.tables.write().await;
        let Some(device) = tables.devices.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = changes.name {
            device.name = name;
        }
        if let Some(priority) = changes.priority {
            device.priority = priority;
        }
        Ok(Some(device.clone()))
    }

    async fn set_device_status(
        &self,
        id: DeviceId,
        status: DeviceStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<StatusTransition>> {
        let mut tables = self.tables.write().await;
        let Some(device) = tables.devices.get_mut(&id) else {
            return Ok(None);
        };
        let previous = device.status;
        if previous != status {
            device.status = status;
            if status == DeviceStatus::Connected {
                advance(&mut device.last_seen_at, at);
            }
        }
        Ok(Some(StatusTransition {
            device: device.clone(),
            previous,
        }))
    }

    async fn touch_device(
        &self,
        id: DeviceId,
        seen_at: DateTime<Utc>,
    ) -> Result<Option<StatusTransition>> {
        let mut tables = self.tables.write().await;
        let Some(device) = tables.devices.get_mut(&id) else {
            return Ok(None);
        };
        let previous = device.status;
        device.status = DeviceStatus::Connected;
        advance(&mut device.last_seen_at, seen_at);
        Ok(Some(StatusTransition {
            device: device.clone(),
            previous,
        }))
    }

    async fn disconnect_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<StatusTransition>> {
        let mut tables = self.tables.write().await;
        let mut transitions = Vec::new();
        for device in tables.devices.values_mut() {
            let silent = device.last_seen_at.map_or(true, |seen| seen < cutoff);
            if device.status == DeviceStatus::Connected && silent {
                device.status = DeviceStatus::Disconnected;
                transitions.push(StatusTransition {
                    device: device.clone(),
                    previous: DeviceStatus::Connected,
                });
            }
        }
        Ok(transitions)
    }

    async fn delete_device(&self, id: DeviceId) -> Result<Option<CascadeReport>> {
        let mut tables = self.tables.write().await;
        if !tables.devices.contains_key(&id) {
            return Ok(None);
        }

        let alerts_before = tables.alerts.len();
        tables.alerts.retain(|_, a| a.device_id != id);
        let alerts_deleted = (alerts_before - tables.alerts.len()) as u64;

        let readings_before = tables.readings.len();
        tables.readings.retain(|_, r| r.device_id != id);
        let readings_deleted = (readings_before - tables.readings.len()) as u64;

        let device = tables
            .devices
            .remove(&id)
            .ok_or_else(|| Error::device_not_found(id))?;

        Ok(Some(CascadeReport {
            device,
            readings_deleted,
            alerts_deleted,
        }))
    }

    async fn insert_reading(&self, new: NewReading) -> Result<Reading> {
        let mut tables = self.tables.write().await;
        if !tables.devices.contains_key(&new.device_id) {
            return Err(Error::device_not_found(new.device_id));
        }
        tables.next_reading_id += 1;
        let id = tables.next_reading_id;
        let stored = StoredReading {
            device_id: new.device_id,
            timestamp: new.timestamp,
            current: new.current,
            temperature: new.temperature,
            vibration: new.vibration,
            voltage: new.voltage,
        };
        let reading = tables.reading(id, &stored);
        tables.readings.insert(id, stored);
        Ok(reading)
    }

    async fn get_reading(&self, id: ReadingId) -> Result<Option<Reading>> {
        let tables = self.tables.read().await;
        Ok(tables.readings.get(&id).map(|r| tables.reading(id, r)))
    }

    async fn recent_readings(
        &self,
        device: Option<DeviceId>,
        limit: usize,
    ) -> Result<Vec<Reading>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<(ReadingId, &StoredReading)> = tables
            .readings
            .iter()
            .filter(|(_, r)| device.map_or(true, |d| r.device_id == d))
            .map(|(id, r)| (*id, r))
            .collect();
        rows.sort_by_key(|(id, r)| Reverse((r.timestamp, *id)));
        Ok(rows
            .into_iter()
            .take(limit)
            .map(|(id, r)| tables.reading(id, r))
            .collect())
    }

    async fn insert_alert(&self, new: NewAlert) -> Result<Alert> {
        let mut tables = self.tables.write().await;
        if !tables.devices.contains_key(&new.device_id) {
            return Err(Error::device_not_found(new.device_id));
        }
        tables.next_alert_id += 1;
        let id = tables.next_alert_id;
        let stored = StoredAlert {
            device_id: new.device_id,
            message: new.message,
            alert_type: new.alert_type,
            severity: new.severity,
            timestamp: Utc::now(),
        };
        let alert = tables.alert(id, &stored);
        tables.alerts.insert(id, stored);
        Ok(alert)
    }

    async fn get_alert(&self, id: AlertId) -> Result<Option<Alert>> {
        let tables = self.tables.read().await;
        Ok(tables.alerts.get(&id).map(|a| tables.alert(id, a)))
    }

    async fn recent_alerts(&self, device: Option<DeviceId>, limit: usize) -> Result<Vec<Alert>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<(AlertId, &StoredAlert)> = tables
            .alerts
            .iter()
            .filter(|(_, a)| device.map_or(true, |d| a.device_id == d))
            .map(|(id, a)| (*id, a))
            .collect();
        rows.sort_by_key(|(id, a)| Reverse((a.timestamp, *id)));
        Ok(rows
            .into_iter()
            .take(limit)
            .map(|(id, a)| tables.alert(id, a))
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
