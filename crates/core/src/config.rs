//! Tunables for a sync session.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::trace;

/// Default time between two clock ticks.
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 100;
/// Default size of a fine offset nudge in seconds.
pub const DEFAULT_SMALL_NUDGE: f64 = 0.1;
/// Default size of a coarse offset nudge in seconds.
pub const DEFAULT_LARGE_NUDGE: f64 = 0.5;

/// Settings for [`SyncSession`](crate::session::SyncSession).
/// Every field is optional in the JSON form and falls back to its default.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub tick_interval_ms: u64,
    pub small_nudge: f64,
    pub large_nudge: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            small_nudge: DEFAULT_SMALL_NUDGE,
            large_nudge: DEFAULT_LARGE_NUDGE,
        }
    }
}

impl SyncConfig {
    /// Read a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        trace!("SyncConfig::load(path={})", path.display());
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Tick period. A zero interval is bumped to one millisecond since the
    /// timer cannot fire continuously.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}
