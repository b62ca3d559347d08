use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};
use tracing::error;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref READINGS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "ingestor_readings_total",
        "Total readings persisted"
    ))
    .expect("valid metric opts");
    pub static ref REJECTED_READINGS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(
            "ingestor_rejected_readings_total",
            "Total reading submissions rejected, by reason"
        ),
        &["reason"]
    )
    .expect("valid metric opts");
    pub static ref ALERTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("ingestor_alerts_total", "Total alerts persisted, by severity"),
        &["severity"]
    )
    .expect("valid metric opts");
    pub static ref ALERT_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "ingestor_alert_failures_total",
        "Total alerts that could not be persisted"
    ))
    .expect("valid metric opts");
    pub static ref DB_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "ingestor_db_failures_total",
        "Total transient database failures that were retried"
    ))
    .expect("valid metric opts");
    pub static ref MQTT_MESSAGES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "ingestor_mqtt_messages_total",
        "Total messages received from MQTT"
    ))
    .expect("valid metric opts");
    pub static ref DISCONNECTS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "ingestor_disconnects_total",
        "Total devices marked disconnected by the watchdog"
    ))
    .expect("valid metric opts");
    pub static ref INGEST_LATENCY_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "ingestor_ingest_latency_seconds",
            "Time taken to persist a reading and its alerts"
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0
        ])
    )
    .expect("valid metric opts");
}

pub fn init_metrics() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(READINGS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REJECTED_READINGS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ALERTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ALERT_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DB_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(MQTT_MESSAGES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DISCONNECTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(INGEST_LATENCY_SECONDS.clone()))?;
    Ok(())
}

pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_contains_registered_metrics() {
        // Registration is global; a second call in the same process fails.
        let _ = init_metrics();
        READINGS_TOTAL.inc();
        ALERTS_TOTAL.with_label_values(&["critical"]).inc();

        let text = gather_metrics();
        assert!(text.contains("ingestor_readings_total"));
        assert!(text.contains("ingestor_alerts_total{severity=\"critical\"}"));
    }
}
