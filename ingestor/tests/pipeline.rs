//! Gateway and registry behaviour against the in-memory store, including a
//! store whose alert writes fail.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use grid_ingestor::engine::{AlertEngine, Thresholds};
use grid_ingestor::errors::{Error, Result};
use grid_ingestor::gateway::Gateway;
use grid_ingestor::memory::MemoryStore;
use grid_ingestor::model::{
    Alert, AlertId, CascadeReport, Context, Device, DeviceChanges, DeviceId, DeviceStatus,
    NewAlert, NewDevice, NewReading, Reading, ReadingId, ReadingSubmission, Severity,
    StatusTransition,
};
use grid_ingestor::registry::Registry;
use grid_ingestor::store::Store;
use std::sync::Arc;

fn motor() -> NewDevice {
    NewDevice {
        name: "Motor A".to_string(),
        priority: 2,
        status: DeviceStatus::Disconnected,
        owner: "operator".to_string(),
    }
}

fn setup() -> (Arc<MemoryStore>, Gateway, Registry) {
    let store = Arc::new(MemoryStore::new());
    let engine = AlertEngine::new(Thresholds::default());
    let gateway = Gateway::new(store.clone(), engine.clone());
    let registry = Registry::new(store.clone(), engine);
    (store, gateway, registry)
}

fn submission(device_id: DeviceId) -> ReadingSubmission {
    ReadingSubmission {
        device_id,
        timestamp: None,
        current: Some(1.234),
        temperature: Some(30.0),
        vibration: Some(0.42),
        voltage: Some(229.5),
    }
}

#[tokio::test]
async fn test_valid_reading_is_stored_exactly_once_with_submitted_values() {
    let (store, gateway, registry) = setup();
    let ctx = Context::anonymous();
    let device = registry.register(&ctx, motor()).await.unwrap();
    let ts = Utc::now() - Duration::seconds(5);

    let ingested = gateway
        .ingest(
            &ctx,
            ReadingSubmission {
                timestamp: Some(ts),
                ..submission(device.id)
            },
        )
        .await
        .unwrap();

    let stored = store.recent_readings(None, 10).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0], ingested.reading);
    assert_eq!(stored[0].timestamp, ts);
    assert_eq!(stored[0].current, Some(1.234));
    assert_eq!(stored[0].temperature, Some(30.0));
    assert_eq!(stored[0].vibration, Some(0.42));
    assert_eq!(stored[0].voltage, Some(229.5));
    assert!(ingested.alerts.is_empty());
    assert!(ingested.warnings.is_empty());
}

#[tokio::test]
async fn test_missing_timestamp_defaults_to_ingestion_time() {
    let (_store, gateway, registry) = setup();
    let ctx = Context::anonymous();
    let device = registry.register(&ctx, motor()).await.unwrap();

    let before = Utc::now();
    let ingested = gateway.ingest(&ctx, submission(device.id)).await.unwrap();
    let after = Utc::now();

    assert!(ingested.reading.timestamp >= before);
    assert!(ingested.reading.timestamp <= after);
}

#[tokio::test]
async fn test_unknown_device_creates_nothing() {
    let (store, gateway, _registry) = setup();

    let err = gateway
        .ingest(
            &Context::anonymous(),
            ReadingSubmission {
                temperature: Some(90.0),
                ..submission(404)
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::NotFound { id: 404, .. }));
    assert!(store.recent_readings(None, 10).await.unwrap().is_empty());
    assert!(store.recent_alerts(None, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_values_are_rejected_without_writes() {
    let (store, gateway, registry) = setup();
    let ctx = Context::anonymous();
    let device = registry.register(&ctx, motor()).await.unwrap();

    let err = gateway
        .ingest(
            &ctx,
            ReadingSubmission {
                current: Some(f64::NAN),
                ..submission(device.id)
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InvalidFields(ref f) if f == &vec!["current".to_string()]));
    assert!(store.recent_readings(None, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_ingestion_marks_device_connected() {
    let (_store, gateway, registry) = setup();
    let ctx = Context::anonymous();
    let device = registry.register(&ctx, motor()).await.unwrap();
    assert_eq!(device.status, DeviceStatus::Disconnected);

    let ingested = gateway.ingest(&ctx, submission(device.id)).await.unwrap();

    let device = registry.get(device.id).await.unwrap();
    assert_eq!(device.status, DeviceStatus::Connected);
    assert_eq!(device.last_seen_at, Some(ingested.reading.timestamp));
}

#[tokio::test]
async fn test_overheating_reading_raises_one_critical_alert() {
    let (store, gateway, registry) = setup();
    let ctx = Context::anonymous();
    let device = registry.register(&ctx, motor()).await.unwrap();

    let ingested = gateway
        .ingest(
            &ctx,
            ReadingSubmission {
                temperature: Some(36.0),
                ..submission(device.id)
            },
        )
        .await
        .unwrap();

    assert_eq!(ingested.alerts.len(), 1);
    let alert = &ingested.alerts[0];
    assert_eq!(alert.alert_type, "Overheating");
    assert_eq!(alert.severity, Severity::Critical);
    assert_eq!(alert.device_name, "Motor A");

    let stored = store.recent_alerts(Some(device.id), 50).await.unwrap();
    assert_eq!(stored, ingested.alerts);
}

#[tokio::test]
async fn test_multiple_rules_produce_independent_alerts() {
    let (_store, gateway, registry) = setup();
    let ctx = Context::anonymous();
    let device = registry.register(&ctx, motor()).await.unwrap();

    let ingested = gateway
        .ingest(
            &ctx,
            ReadingSubmission {
                temperature: Some(50.0),
                current: Some(30.0),
                ..submission(device.id)
            },
        )
        .await
        .unwrap();

    let mut kinds: Vec<&str> = ingested
        .alerts
        .iter()
        .map(|a| a.alert_type.as_str())
        .collect();
    kinds.sort_unstable();
    assert_eq!(kinds, vec!["Overheating", "Overloading"]);
}

#[tokio::test]
async fn test_delete_cascades_and_reports_counts() {
    let (store, gateway, registry) = setup();
    let ctx = Context::anonymous();
    let device = registry.register(&ctx, motor()).await.unwrap();

    for temperature in [30.0, 36.0, 37.0] {
        gateway
            .ingest(
                &ctx,
                ReadingSubmission {
                    temperature: Some(temperature),
                    ..submission(device.id)
                },
            )
            .await
            .unwrap();
    }

    let report = registry.delete(&ctx, device.id).await.unwrap();
    assert_eq!(report.readings_deleted, 3);
    assert_eq!(report.alerts_deleted, 2);

    assert!(store.recent_readings(Some(device.id), 10).await.unwrap().is_empty());
    assert!(store.recent_alerts(Some(device.id), 10).await.unwrap().is_empty());
    assert!(matches!(
        registry.get(device.id).await,
        Err(Error::NotFound { .. })
    ));
    assert!(matches!(
        registry.delete(&ctx, device.id).await,
        Err(Error::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_setting_status_twice_is_idempotent() {
    let (_store, _gateway, registry) = setup();
    let ctx = Context::anonymous();
    let device = registry.register(&ctx, motor()).await.unwrap();

    let first = registry
        .set_status(&ctx, device.id, DeviceStatus::Connected)
        .await
        .unwrap();
    assert!(first.status_changed);

    let second = registry
        .set_status(&ctx, device.id, DeviceStatus::Connected)
        .await
        .unwrap();
    assert!(!second.status_changed);
    assert!(second.alerts.is_empty());
    assert_eq!(first.device, second.device);
    assert_eq!(registry.get(device.id).await.unwrap(), second.device);
}

#[tokio::test]
async fn test_manual_disconnect_raises_power_disconnect() {
    let (store, gateway, registry) = setup();
    let ctx = Context::anonymous();
    let device = registry.register(&ctx, motor()).await.unwrap();
    gateway.ingest(&ctx, submission(device.id)).await.unwrap();

    let update = registry
        .update(
            &ctx,
            device.id,
            DeviceChanges {
                status: Some(DeviceStatus::Disconnected),
                priority: Some(5),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(update.status_changed);
    assert_eq!(update.device.priority, 5);
    assert_eq!(update.alerts.len(), 1);
    assert_eq!(update.alerts[0].alert_type, "Power Disconnect");
    assert_eq!(update.alerts[0].severity, Severity::Critical);
    assert_eq!(store.recent_alerts(None, 50).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_sweep_disconnects_silent_devices() {
    let (store, gateway, registry) = setup();
    let ctx = Context::anonymous();
    let silent = registry.register(&ctx, motor()).await.unwrap();
    let chatty = registry
        .register(
            &ctx,
            NewDevice {
                name: "LED".to_string(),
                ..motor()
            },
        )
        .await
        .unwrap();

    gateway.ingest(&ctx, submission(silent.id)).await.unwrap();
    gateway.ingest(&ctx, submission(chatty.id)).await.unwrap();
    let last_seen = registry.get(silent.id).await.unwrap().last_seen_at.unwrap();

    // Within the timeout nothing happens.
    let early = registry.sweep(last_seen + Duration::seconds(10)).await.unwrap();
    assert!(early.disconnected.is_empty());

    // Two minutes later the LED has reported again, the motor has not.
    let later = last_seen + Duration::seconds(120);
    store
        .touch_device(chatty.id, later - Duration::seconds(5))
        .await
        .unwrap();

    let sweep = registry.sweep(later).await.unwrap();
    assert_eq!(sweep.disconnected.len(), 1);
    assert_eq!(sweep.disconnected[0].id, silent.id);
    assert_eq!(sweep.alerts.len(), 1);
    assert_eq!(sweep.alerts[0].alert_type, "Power Disconnect");
    assert_eq!(
        sweep.alerts[0].message,
        "No reading from Motor A for 120s (timeout 30s)"
    );

    // A second pass finds nothing new.
    assert!(registry.sweep(later).await.unwrap().disconnected.is_empty());
    assert_eq!(
        store.get_device(chatty.id).await.unwrap().unwrap().status,
        DeviceStatus::Connected
    );
}

#[tokio::test]
async fn test_backfilled_reading_does_not_look_like_silence() {
    let (store, gateway, registry) = setup();
    let ctx = Context::anonymous();
    let device = registry.register(&ctx, motor()).await.unwrap();

    gateway.ingest(&ctx, submission(device.id)).await.unwrap();
    gateway
        .ingest(
            &ctx,
            ReadingSubmission {
                timestamp: Some(Utc::now() - Duration::seconds(120)),
                ..submission(device.id)
            },
        )
        .await
        .unwrap();

    let sweep = registry.sweep(Utc::now()).await.unwrap();
    assert!(sweep.disconnected.is_empty());
    assert!(sweep.alerts.is_empty());
    assert_eq!(
        store.get_device(device.id).await.unwrap().unwrap().status,
        DeviceStatus::Connected
    );
}

#[tokio::test]
async fn test_future_timestamp_does_not_hide_an_outage() {
    let (_store, gateway, registry) = setup();
    let ctx = Context::anonymous();
    let device = registry.register(&ctx, motor()).await.unwrap();

    let now = Utc::now();
    gateway
        .ingest(
            &ctx,
            ReadingSubmission {
                timestamp: Some(now + Duration::hours(2)),
                ..submission(device.id)
            },
        )
        .await
        .unwrap();

    let seen = registry.get(device.id).await.unwrap().last_seen_at.unwrap();
    assert!(seen <= Utc::now());

    let sweep = registry.sweep(now + Duration::minutes(90)).await.unwrap();
    assert_eq!(sweep.disconnected.len(), 1);
    assert_eq!(sweep.alerts[0].alert_type, "Power Disconnect");
}

#[tokio::test]
async fn test_manual_connect_waits_for_the_timeout() {
    let (_store, _gateway, registry) = setup();
    let ctx = Context::anonymous();
    let device = registry.register(&ctx, motor()).await.unwrap();

    let update = registry
        .set_status(&ctx, device.id, DeviceStatus::Connected)
        .await
        .unwrap();
    let connected_at = update.device.last_seen_at.unwrap();

    let early = registry
        .sweep(connected_at + Duration::seconds(1))
        .await
        .unwrap();
    assert!(early.disconnected.is_empty());
    assert!(early.alerts.is_empty());

    let late = registry
        .sweep(connected_at + Duration::seconds(31))
        .await
        .unwrap();
    assert_eq!(late.disconnected.len(), 1);
    assert_eq!(
        late.alerts[0].message,
        "No reading from Motor A for 31s (timeout 30s)"
    );
}

#[tokio::test]
async fn test_register_rejects_empty_name() {
    let (_store, _gateway, registry) = setup();
    let result = registry
        .register(
            &Context::anonymous(),
            NewDevice {
                name: String::new(),
                ..motor()
            },
        )
        .await;
    assert!(matches!(result, Err(Error::Validation(_))));
    assert!(registry.list().await.unwrap().is_empty());
}

/// Delegates to [`MemoryStore`] but refuses every alert write.
struct AlertWritesFail(MemoryStore);

#[async_trait]
impl Store for AlertWritesFail {
    async fn create_device(&self, device: NewDevice) -> Result<Device> {
        self.0.create_device(device).await
    }
    async fn get_device(&self, id: DeviceId) -> Result<Option<Device>> {
        self.0.get_device(id).await
    }
    async fn list_devices(&self) -> Result<Vec<Device>> {
        self.0.list_devices().await
    }
    async fn update_device(&self, id: DeviceId, changes: DeviceChanges) -> Result<Option<Device>> {
        self.0.update_device(id, changes).await
    }
    async fn set_device_status(
        &self,
        id: DeviceId,
        status: DeviceStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<StatusTransition>> {
        self.0.set_device_status(id, status, at).await
    }
    async fn touch_device(
        &self,
        id: DeviceId,
        seen_at: DateTime<Utc>,
    ) -> Result<Option<StatusTransition>> {
        self.0.touch_device(id, seen_at).await
    }
    async fn disconnect_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<StatusTransition>> {
        self.0.disconnect_stale(cutoff).await
    }
    async fn delete_device(&self, id: DeviceId) -> Result<Option<CascadeReport>> {
        self.0.delete_device(id).await
    }
    async fn insert_reading(&self, reading: NewReading) -> Result<Reading> {
        self.0.insert_reading(reading).await
    }
    async fn get_reading(&self, id: ReadingId) -> Result<Option<Reading>> {
        self.0.get_reading(id).await
    }
    async fn recent_readings(
        &self,
        device: Option<DeviceId>,
        limit: usize,
    ) -> Result<Vec<Reading>> {
        self.0.recent_readings(device, limit).await
    }
    async fn insert_alert(&self, _alert: NewAlert) -> Result<Alert> {
        Err(Error::TransientStore("alerts table locked".to_string()))
    }
    async fn get_alert(&self, id: AlertId) -> Result<Option<Alert>> {
        self.0.get_alert(id).await
    }
    async fn recent_alerts(&self, device: Option<DeviceId>, limit: usize) -> Result<Vec<Alert>> {
        self.0.recent_alerts(device, limit).await
    }
    async fn ping(&self) -> Result<()> {
        self.0.ping().await
    }
}

#[tokio::test]
async fn test_failed_alert_write_keeps_the_reading() {
    let store = Arc::new(AlertWritesFail(MemoryStore::new()));
    let gateway = Gateway::new(store.clone(), AlertEngine::default());
    let device = store.create_device(motor()).await.unwrap();

    let ingested = gateway
        .ingest(
            &Context::anonymous(),
            ReadingSubmission {
                temperature: Some(36.0),
                ..submission(device.id)
            },
        )
        .await
        .unwrap();

    assert!(ingested.alerts.is_empty());
    assert_eq!(ingested.warnings.len(), 1);
    assert!(ingested.warnings[0].contains("Overheating"));
    assert_eq!(store.recent_readings(None, 10).await.unwrap().len(), 1);
}
