use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// One synthetic reading, shaped like the ingestor's reading submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub device: i64,
    pub timestamp: DateTime<Utc>,
    pub current: f64,
    pub temperature: f64,
    pub vibration: f64,
    pub voltage: f64,
}

pub fn generate_sample(rng: &mut impl Rng, device: i64) -> Sample {
    Sample {
        device,
        timestamp: Utc::now(),
        current: round_to(rng.gen_range(0.1..=5.0), 3),
        temperature: round_to(rng.gen_range(25.0..=40.0), 2),
        vibration: round_to(rng.gen_range(0.01..=1.5), 2),
        voltage: round_to(rng.gen_range(220.0..=240.0), 2),
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
