//! Cache configuration.
//!
//! Controls the response cache via the `[cache]` table of `atelier.toml`.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_CAPACITY: usize = 256;
const DEFAULT_DESIGNS_TTL_MS: u64 = 2 * 60 * 1000;
const DEFAULT_SWEEP_INTERVAL_MS: u64 = 60 * 1000;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Serve the design list from the response cache while it is fresh.
    pub enabled: bool,
    /// Maximum entries kept before least-recently-used eviction.
    pub capacity: usize,
    /// TTL (ms) for the gallery's design list.
    pub designs_ttl_ms: u64,
    /// Interval (ms) of the background purge of expired entries; 0 disables it.
    pub sweep_interval_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: DEFAULT_CAPACITY,
            designs_ttl_ms: DEFAULT_DESIGNS_TTL_MS,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            capacity: settings.capacity.get(),
            designs_ttl_ms: settings.designs_ttl.as_millis() as u64,
            sweep_interval_ms: settings
                .sweep_interval
                .map_or(0, |interval| interval.as_millis() as u64),
        }
    }
}

impl CacheConfig {
    /// Returns the capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.capacity).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn designs_ttl(&self) -> Duration {
        Duration::from_millis(self.designs_ttl_ms)
    }

    /// Sweep cadence, or `None` when only lazy eviction is wanted.
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_ms > 0).then(|| Duration::from_millis(self.sweep_interval_ms))
    }
}
