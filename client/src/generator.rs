use anyhow::Context;
use devicecore::{Detection, Record};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Configuration for generating synthetic device batches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub devices: usize,
    pub sensor: String,
    pub detections: usize,
    /// Mean gap between detections, in microseconds.
    pub mean_interval_us: f64,
    pub jitter: f64,
    pub seed: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            devices: 8,
            sensor: "temp".into(),
            detections: 16,
            mean_interval_us: 250_000.0,
            jitter: 0.5,
            seed: 0,
        }
    }
}

impl GeneratorConfig {
    fn normalized_detections(&self) -> usize {
        self.detections.max(2)
    }
}

/// Deterministic locally administered MAC for device `index`.
pub fn device_mac(index: usize) -> String {
    let bytes = (index as u32).to_be_bytes();
    format!(
        "02:00:{:02X}:{:02X}:{:02X}:{:02X}",
        bytes[0], bytes[1], bytes[2], bytes[3]
    )
}

fn build_detections(config: &GeneratorConfig, rng: &mut StdRng) -> anyhow::Result<Vec<Detection>> {
    let count = config.normalized_detections();
    let jitter = config.jitter.clamp(0.0, 0.95);
    // each device gets its own cadence so rankings are spread out
    let cadence = config.mean_interval_us * rng.gen_range(0.5..1.5);
    anyhow::ensure!(
        cadence.is_finite() && cadence > 0.0,
        "mean_interval_us must be positive"
    );

    let mut timestamp = 0.0;
    let mut detections = Vec::with_capacity(count);
    for sample in 0..count {
        let reading = 20.0 + (sample as f64 * 0.3).sin() + rng.gen_range(-0.1..0.1);
        detections.push(Detection::new(vec![reading], timestamp));
        let factor = if jitter > 0.0 {
            1.0 + rng.gen_range(-jitter..jitter)
        } else {
            1.0
        };
        timestamp += (cadence * factor).max(1.0);
    }
    Ok(detections)
}

pub fn build_batches(config: &GeneratorConfig) -> anyhow::Result<Vec<Record>> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    (0..config.devices)
        .map(|index| {
            let detections = build_detections(config, &mut rng)
                .with_context(|| format!("generating detections for device {index}"))?;
            Ok(Record::new(
                device_mac(index),
                format!("synthetic-{}-{}", config.seed, index),
                config.sensor.clone(),
                detections,
            ))
        })
        .collect()
}
