//! Device registry and the connectivity watchdog.

use crate::engine::AlertEngine;
use crate::errors::{Error, Result};
use crate::gateway::record_alerts;
use crate::metrics::DISCONNECTS_TOTAL;
use crate::model::{
    Alert, CascadeReport, Context, Device, DeviceChanges, DeviceId, DeviceStatus, NewDevice,
    StatusTransition,
};
use crate::store::Store;
use crate::validate::{validate_changes, validate_new_device};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

/// A device after a change, with any alerts the change raised.
#[derive(Debug, Clone)]
pub struct DeviceUpdate {
    pub device: Device,
    pub status_changed: bool,
    pub alerts: Vec<Alert>,
    pub warnings: Vec<String>,
}

/// Outcome of one watchdog pass.
#[derive(Debug, Clone, Default)]
pub struct Sweep {
    pub disconnected: Vec<Device>,
    pub alerts: Vec<Alert>,
    pub warnings: Vec<String>,
}

pub struct Registry {
    store: Arc<dyn Store>,
    engine: AlertEngine,
}

impl Registry {
    pub fn new(store: Arc<dyn Store>, engine: AlertEngine) -> Self {
        Self { store, engine }
    }

    pub async fn register(&self, ctx: &Context, device: NewDevice) -> Result<Device> {
        validate_new_device(&device)?;
        let device = self.store.create_device(device).await?;
        info!(
            "Registered device {} ({}) for {}",
            device.id,
            device.name,
            ctx.principal()
        );
        Ok(device)
    }

    pub async fn get(&self, id: DeviceId) -> Result<Device> {
        self.store
            .get_device(id)
            .await?
            .ok_or_else(|| Error::device_not_found(id))
    }

    pub async fn list(&self) -> Result<Vec<Device>> {
        self.store.list_devices().await
    }

    pub async fn update(
        &self,
        ctx: &Context,
        id: DeviceId,
        changes: DeviceChanges,
    ) -> Result<DeviceUpdate> {
        validate_changes(&changes)?;
        let status = changes.status;

        let device = if changes.name.is_some() || changes.priority.is_some() {
            self.store
                .update_device(id, changes)
                .await?
                .ok_or_else(|| Error::device_not_found(id))?
        } else {
            self.get(id).await?
        };

        let update = match status {
            Some(status) => self.set_status(ctx, id, status).await?,
            None => DeviceUpdate {
                device,
                status_changed: false,
                alerts: Vec::new(),
                warnings: Vec::new(),
            },
        };

        info!("Updated device {} for {}", update.device.id, ctx.principal());
        Ok(update)
    }

    /// Idempotent: setting the status a device already has writes nothing
    /// and raises nothing.
    pub async fn set_status(
        &self,
        ctx: &Context,
        id: DeviceId,
        status: DeviceStatus,
    ) -> Result<DeviceUpdate> {
        let transition = self
            .store
            .set_device_status(id, status, Utc::now())
            .await?
            .ok_or_else(|| Error::device_not_found(id))?;

        if !transition.changed() {
            return Ok(DeviceUpdate {
                device: transition.device,
                status_changed: false,
                alerts: Vec::new(),
                warnings: Vec::new(),
            });
        }

        info!(
            "Device {} status {} -> {} (set by {})",
            id,
            transition.previous,
            transition.device.status,
            ctx.principal()
        );
        let (alerts, warnings) = self.raise_for(&transition, Utc::now()).await;

        Ok(DeviceUpdate {
            device: transition.device,
            status_changed: true,
            alerts,
            warnings,
        })
    }

    /// Deletes a device together with every reading and alert it owns.
    pub async fn delete(&self, ctx: &Context, id: DeviceId) -> Result<CascadeReport> {
        let report = self
            .store
            .delete_device(id)
            .await?
            .ok_or_else(|| Error::device_not_found(id))?;
        warn!(
            "Device {} ({}) deleted by {}: removed {} readings and {} alerts",
            report.device.id,
            report.device.name,
            ctx.principal(),
            report.readings_deleted,
            report.alerts_deleted
        );
        Ok(report)
    }

    /// Disconnects every connected device that has been silent past the
    /// configured timeout and raises a Power Disconnect alert for each.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<Sweep> {
        let cutoff = self.engine.stale_cutoff(now);
        let transitions = self.store.disconnect_stale(cutoff).await?;

        let mut sweep = Sweep::default();
        for transition in transitions {
            DISCONNECTS_TOTAL.inc();
            warn!(
                "Device {} ({}) silent since {:?}, marking disconnected",
                transition.device.id, transition.device.name, transition.device.last_seen_at
            );
            let (alerts, warnings) = self.raise_for(&transition, now).await;
            sweep.alerts.extend(alerts);
            sweep.warnings.extend(warnings);
            sweep.disconnected.push(transition.device);
        }
        Ok(sweep)
    }

    /// Runs [`Registry::sweep`] on a fixed period until the task is dropped.
    pub async fn run_watchdog(self: Arc<Self>, period: Duration) {
        info!("Starting connectivity watchdog with period {:?}", period);

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(e) = self.sweep(Utc::now()).await {
                error!("Watchdog sweep failed: {}", e);
            }
        }
    }

    async fn raise_for(
        &self,
        transition: &StatusTransition,
        now: DateTime<Utc>,
    ) -> (Vec<Alert>, Vec<String>) {
        let raised = self
            .engine
            .evaluate_transition(&transition.device, transition.previous, now);
        record_alerts(self.store.as_ref(), raised).await
    }
}
