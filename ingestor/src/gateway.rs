//! Ingestion gateway: validate, persist the reading, then derive alerts.

use crate::engine::AlertEngine;
use crate::errors::{Error, Result};
use crate::metrics::{
    ALERTS_TOTAL, ALERT_FAILURES_TOTAL, INGEST_LATENCY_SECONDS, READINGS_TOTAL,
    REJECTED_READINGS_TOTAL,
};
use crate::model::{Alert, Context, NewAlert, NewReading, Reading, ReadingSubmission};
use crate::store::Store;
use crate::validate::validate_submission;
use chrono::Utc;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Outcome of a successful ingestion. `warnings` holds one entry per alert
/// that was raised but could not be persisted.
#[derive(Debug, Clone)]
pub struct Ingested {
    pub reading: Reading,
    pub alerts: Vec<Alert>,
    pub warnings: Vec<String>,
}

pub struct Gateway {
    store: Arc<dyn Store>,
    engine: AlertEngine,
}

impl Gateway {
    pub fn new(store: Arc<dyn Store>, engine: AlertEngine) -> Self {
        Self { store, engine }
    }

    pub async fn ingest(&self, ctx: &Context, submission: ReadingSubmission) -> Result<Ingested> {
        let start = Instant::now();
        let received_at = Utc::now();

        if let Err(e) = validate_submission(&submission) {
            REJECTED_READINGS_TOTAL.with_label_values(&["invalid"]).inc();
            return Err(e);
        }

        if self.store.get_device(submission.device_id).await?.is_none() {
            REJECTED_READINGS_TOTAL.with_label_values(&["unknown_device"]).inc();
            return Err(Error::device_not_found(submission.device_id));
        }

        let reading = self
            .store
            .insert_reading(NewReading {
                device_id: submission.device_id,
                timestamp: submission.timestamp.unwrap_or(received_at),
                current: submission.current,
                temperature: submission.temperature,
                vibration: submission.vibration,
                voltage: submission.voltage,
            })
            .await?;
        READINGS_TOTAL.inc();
        debug!(
            "Stored reading {} for device {} (caller {})",
            reading.id,
            reading.device_id,
            ctx.principal()
        );

        // The reading is committed from here on; nothing below may fail the call.
        // Connectivity follows receipt time, not the producer's timestamp.
        match self.store.touch_device(reading.device_id, received_at).await {
            Ok(Some(transition)) if transition.changed() => {
                info!(
                    "Device {} ({}) is now {} (was {})",
                    transition.device.id,
                    transition.device.name,
                    transition.device.status,
                    transition.previous
                );
            }
            Ok(_) => {}
            Err(e) => warn!(
                "Failed to update connectivity of device {}: {}",
                reading.device_id, e
            ),
        }

        let raised = self.engine.evaluate_reading(&reading);
        let (alerts, warnings) = record_alerts(self.store.as_ref(), raised).await;

        INGEST_LATENCY_SECONDS.observe(start.elapsed().as_secs_f64());

        Ok(Ingested {
            reading,
            alerts,
            warnings,
        })
    }
}

/// Persists alerts one by one. A failed write is logged and reported as a
/// warning; it never undoes whatever triggered the alert.
pub async fn record_alerts(store: &dyn Store, raised: Vec<NewAlert>) -> (Vec<Alert>, Vec<String>) {
    let mut alerts = Vec::with_capacity(raised.len());
    let mut warnings = Vec::new();

    for new in raised {
        let kind = new.alert_type.clone();
        let device_id = new.device_id;
        match store.insert_alert(new).await {
            Ok(alert) => {
                ALERTS_TOTAL
                    .with_label_values(&[alert.severity.as_str()])
                    .inc();
                info!(
                    "{} alert on device {}: {}",
                    alert.alert_type, alert.device_id, alert.message
                );
                alerts.push(alert);
            }
            Err(e) => {
                ALERT_FAILURES_TOTAL.inc();
                let failure = Error::AlertPersistence(format!(
                    "{} alert for device {}: {}",
                    kind, device_id, e
                ));
                warn!("{}", failure);
                warnings.push(failure.to_string());
            }
        }
    }

    (alerts, warnings)
}
