use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Watch registration limits.
///
/// Delivery itself is unbounded: events are never dropped while the watcher
/// is connected, so there is no per-watcher buffer size to tune.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WatchConfig {
    /// Maximum registrations a single watcher may hold (0 = unlimited)
    #[serde(default)]
    pub max_watches_per_watcher: usize,

    /// Maximum events the dispatcher thread forwards before re-checking
    /// for shutdown
    #[serde(default = "default_dispatch_batch_size")]
    pub dispatch_batch_size: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            max_watches_per_watcher: 0,
            dispatch_batch_size: default_dispatch_batch_size(),
        }
    }
}

impl WatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.dispatch_batch_size == 0 {
            return Err(Error::Config(ConfigError::Message(
                "dispatch_batch_size must be greater than 0".into(),
            )));
        }
        Ok(())
    }
}

fn default_dispatch_batch_size() -> usize {
    256
}
