use std::env;
use std::time::Duration;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_STALENESS_WINDOW_MS: u64 = 15_000;
const DEFAULT_SWEEP_INTERVAL_MS: u64 = 1_000;
const DEFAULT_SUBSCRIBER_QUEUE: usize = 64;

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key).ok().and_then(|value| value.parse::<u64>().ok()).unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub bind_addr: String,
    /// Maximum silence before an active vehicle is presumed inactive.
    pub staleness_window_ms: u64,
    pub sweep_interval: Duration,
    /// Per-subscriber delivery queue bound.
    pub subscriber_queue: usize,
}

impl TrackerConfig {
    pub fn from_env() -> Self {
        Self {
            bind_addr: env::var("FLEETTRACK_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string()),
            staleness_window_ms: env_u64("FLEETTRACK_STALENESS_MS", DEFAULT_STALENESS_WINDOW_MS),
            sweep_interval: Duration::from_millis(env_u64(
                "FLEETTRACK_SWEEP_INTERVAL_MS",
                DEFAULT_SWEEP_INTERVAL_MS,
            )),
            subscriber_queue: env_u64("FLEETTRACK_SUBSCRIBER_QUEUE", DEFAULT_SUBSCRIBER_QUEUE as u64)
                as usize,
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            staleness_window_ms: DEFAULT_STALENESS_WINDOW_MS,
            sweep_interval: Duration::from_millis(DEFAULT_SWEEP_INTERVAL_MS),
            subscriber_queue: DEFAULT_SUBSCRIBER_QUEUE,
        }
    }
}
