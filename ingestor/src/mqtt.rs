use crate::config::MqttConfig;
use crate::errors::{Error, Result};
use crate::gateway::{Gateway, Ingested};
use crate::metrics::{MQTT_MESSAGES_TOTAL, REJECTED_READINGS_TOTAL};
use crate::model::{Context, DeviceId};
use crate::wire::v1::CreateReadingV1;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 100;
const MAX_BACKOFF_MS: u64 = 2000;

pub async fn run_mqtt(config: MqttConfig, client_id: String, gateway: Arc<Gateway>) -> Result<()> {
    info!("Connecting to MQTT broker at {}:{}", config.broker, config.port);

    let mut mqtt_options = MqttOptions::new(client_id.clone(), config.broker, config.port);
    mqtt_options.set_keep_alive(std::time::Duration::from_secs(30));
    mqtt_options.set_clean_session(false);

    let (client, mut eventloop) = AsyncClient::new(mqtt_options, 10000);

    client
        .subscribe(config.topic.as_str(), QoS::AtLeastOnce)
        .await
        .map_err(Error::Mqtt)?;

    info!("Subscribed to {} with QoS 1", config.topic);

    let ctx = Context::with_identity(format!("mqtt:{}", client_id));

    loop {
        match eventloop.poll().await {
            Ok(notification) => {
                if let Event::Incoming(Packet::Publish(publish)) = notification {
                    MQTT_MESSAGES_TOTAL.inc();

                    debug!(
                        "Received message on topic {}, size: {} bytes",
                        publish.topic,
                        publish.payload.len()
                    );

                    if let Err(e) =
                        process_message_with_retry(&ctx, &publish.topic, &publish.payload, &gateway)
                            .await
                    {
                        error!("Dropping message from {}: {}", publish.topic, e);
                    }
                }
            }
            Err(e) => {
                error!("MQTT error: {}", e);
                // rumqttc automatically reconnects, so we just log and continue
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            }
        }
    }
}

/// Process a message with exponential backoff retry
async fn process_message_with_retry(
    ctx: &Context,
    topic: &str,
    payload: &[u8],
    gateway: &Gateway,
) -> Result<Ingested> {
    let mut attempt = 0;
    let mut backoff_ms = INITIAL_BACKOFF_MS;

    loop {
        attempt += 1;

        match process_message(ctx, topic, payload, gateway).await {
            Ok(ingested) => {
                if attempt > 1 {
                    info!("Message processed successfully on attempt {}", attempt);
                }
                return Ok(ingested);
            }
            Err(e) => {
                if attempt >= MAX_RETRIES {
                    return Err(e);
                }

                if !e.is_transient() {
                    warn!("Non-retryable error: {}", e);
                    return Err(e);
                }

                warn!(
                    "Message processing failed (attempt {}/{}): {}. Retrying in {}ms...",
                    attempt, MAX_RETRIES, e, backoff_ms
                );

                tokio::time::sleep(std::time::Duration::from_millis(backoff_ms)).await;

                backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);
            }
        }
    }
}

/// Process a single message
async fn process_message(
    ctx: &Context,
    topic: &str,
    payload: &[u8],
    gateway: &Gateway,
) -> Result<Ingested> {
    let mut body = match serde_json::from_slice::<CreateReadingV1>(payload) {
        Ok(body) => body,
        Err(e) => {
            REJECTED_READINGS_TOTAL.with_label_values(&["malformed"]).inc();
            return Err(Error::Validation(format!("JSON parse error: {}", e)));
        }
    };

    if body.device.is_none() {
        body.device = device_from_topic(topic);
    }

    gateway.ingest(ctx, body.into_submission()?).await
}

/// Extracts the device id from `sensors/<id>/readings`.
fn device_from_topic(topic: &str) -> Option<DeviceId> {
    let mut segments = topic.split('/');
    match (segments.next(), segments.next(), segments.next(), segments.next()) {
        (Some("sensors"), Some(id), Some("readings"), None) => id.parse().ok(),
        _ => None,
    }
}
