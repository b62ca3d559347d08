mod publisher;
mod sample;
mod schedule;

use clap::{Parser, ValueEnum};
use publisher::Publisher;
use rand::Rng;
use rumqttc::{AsyncClient, MqttOptions};
use schedule::Schedule;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Transport {
    Http,
    Mqtt,
}

/// Publishes synthetic sensor readings to the grid ingestor.
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Reading submission endpoint
    #[arg(long, env = "API_URL", default_value = "http://127.0.0.1:8080/api/sensordata/")]
    api_url: String,

    /// Registered device ids to report for
    #[arg(long, env = "DEVICE_IDS", value_delimiter = ',', default_value = "1")]
    devices: Vec<i64>,

    /// Seconds between cycles
    #[arg(long, env = "INTERVAL_SECS", default_value_t = 5)]
    interval_secs: u64,

    /// Upper bound of the random delay added to each cycle
    #[arg(long, env = "JITTER_MS", default_value_t = 500)]
    jitter_ms: u64,

    /// Per-request timeout
    #[arg(long, env = "TIMEOUT_MS", default_value_t = 3000)]
    timeout_ms: u64,

    /// Cap on the backed-off delay after repeated failures
    #[arg(long, env = "MAX_BACKOFF_SECS", default_value_t = 60)]
    max_backoff_secs: u64,

    #[arg(long, env = "TRANSPORT", value_enum, default_value_t = Transport::Http)]
    transport: Transport,

    #[arg(long, env = "MQTT_BROKER", default_value = "localhost")]
    mqtt_broker: String,

    #[arg(long, env = "MQTT_PORT", default_value_t = 1883)]
    mqtt_port: u16,

    /// Stop after this many cycles
    #[arg(long)]
    count: Option<u64>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting grid simulator");
    info!(
        "Transport: {:?}, devices: {:?}, interval: {}s",
        args.transport, args.devices, args.interval_secs
    );

    if args.devices.is_empty() {
        error!("No device ids configured");
        std::process::exit(1);
    }

    let publisher = match args.transport {
        Transport::Http => {
            info!("Posting to {}", args.api_url);
            match Publisher::http(args.api_url.clone(), Duration::from_millis(args.timeout_ms)) {
                Ok(publisher) => publisher,
                Err(e) => {
                    error!("Failed to build HTTP client: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Transport::Mqtt => {
            info!("Publishing to {}:{}", args.mqtt_broker, args.mqtt_port);
            Publisher::mqtt(connect_mqtt(&args))
        }
    };

    let mut schedule = Schedule::new(
        Duration::from_secs(args.interval_secs),
        Duration::from_millis(args.jitter_ms),
        Duration::from_secs(args.max_backoff_secs),
    );

    let mut cycle = 0u64;
    let mut published = 0u64;

    loop {
        cycle += 1;
        let mut transient = false;

        for &device in &args.devices {
            let sample = sample::generate_sample(&mut rand::thread_rng(), device);
            match publisher.publish(&sample).await {
                Ok(()) => {
                    published += 1;
                    debug!(
                        "Device {}: {:.3}A {:.2}°C {:.2}m/s² {:.2}V",
                        device, sample.current, sample.temperature, sample.vibration, sample.voltage
                    );
                }
                Err(e) if e.is_transient() => {
                    transient = true;
                    warn!("Device {}: {}", device, e);
                }
                Err(e) => warn!("Device {}: reading {}", device, e),
            }
        }

        if transient {
            schedule.record_failure();
        } else {
            schedule.record_success();
        }

        if cycle % 100 == 0 {
            info!("Published {} readings in {} cycles", published, cycle);
        }

        if args.count.is_some_and(|count| cycle >= count) {
            info!("Done after {} cycles, {} readings published", cycle, published);
            break;
        }

        let jitter_ms = schedule.max_jitter().as_millis() as u64;
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms));
        let delay = schedule.next_delay(jitter);
        if schedule.failures() > 0 {
            warn!(
                "{} consecutive failed cycles, next attempt in {:?}",
                schedule.failures(),
                delay
            );
        }
        tokio::time::sleep(delay).await;
    }
}

fn connect_mqtt(args: &Args) -> AsyncClient {
    let client_id = format!("sim-{}", uuid::Uuid::new_v4());
    let mut mqtt_options = MqttOptions::new(client_id, &args.mqtt_broker, args.mqtt_port);
    mqtt_options.set_keep_alive(Duration::from_secs(30));
    mqtt_options.set_clean_session(true);

    let (client, mut eventloop) = AsyncClient::new(mqtt_options, 1000);

    // Spawn eventloop handler
    tokio::spawn(async move {
        loop {
            if let Err(e) = eventloop.poll().await {
                error!("MQTT eventloop error: {}", e);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    });

    client
}
