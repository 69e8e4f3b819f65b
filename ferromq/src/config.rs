use crate::queue::QueueLimits;
use anyhow::Result;
use serde_derive::Deserialize;
use std::time::Duration;

#[derive(Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub queue: QueueDefaults,
}

/// Queue level defaults the housekeeping collaborator configures. Individual
/// queues may override them at declare time.
#[derive(Clone, Deserialize)]
pub struct QueueDefaults {
    #[serde(default = "default_high_watermark_count")]
    pub high_watermark_count: usize,
    #[serde(default = "default_low_watermark_count")]
    pub low_watermark_count: usize,
    #[serde(default = "default_high_watermark_bytes")]
    pub high_watermark_bytes: u64,
    #[serde(default = "default_low_watermark_bytes")]
    pub low_watermark_bytes: u64,
    #[serde(default = "default_max_redeliveries")]
    pub max_redeliveries: u32,
    /// Default message TTL in milliseconds, no expiry when absent.
    pub default_ttl_ms: Option<u64>,
    /// Period of the expiry sweep driven by the housekeeping task.
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

fn default_high_watermark_count() -> usize {
    10_000
}

fn default_low_watermark_count() -> usize {
    8_000
}

fn default_high_watermark_bytes() -> u64 {
    64 * 1024 * 1024
}

fn default_low_watermark_bytes() -> u64 {
    48 * 1024 * 1024
}

fn default_max_redeliveries() -> u32 {
    3
}

fn default_sweep_interval_ms() -> u64 {
    1_000
}

impl Default for QueueDefaults {
    fn default() -> Self {
        QueueDefaults {
            high_watermark_count: default_high_watermark_count(),
            low_watermark_count: default_low_watermark_count(),
            high_watermark_bytes: default_high_watermark_bytes(),
            low_watermark_bytes: default_low_watermark_bytes(),
            max_redeliveries: default_max_redeliveries(),
            default_ttl_ms: None,
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}

impl QueueDefaults {
    pub fn limits(&self) -> QueueLimits {
        QueueLimits {
            high_watermark_count: self.high_watermark_count,
            low_watermark_count: self.low_watermark_count,
            high_watermark_bytes: self.high_watermark_bytes,
            low_watermark_bytes: self.low_watermark_bytes,
            max_redeliveries: self.max_redeliveries,
            default_ttl: self.default_ttl_ms.map(Duration::from_millis),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

pub fn parse_settings(path: &str) -> Result<Settings> {
    let cfg = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&cfg)?)
}
