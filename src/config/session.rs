//! Session timeout configuration
//!
//! ```toml
//! [session]
//! tick_time_ms = 2000
//! # Optional, derived from tick_time_ms when absent (2x and 20x)
//! min_session_timeout_ms = 4000
//! max_session_timeout_ms = 40000
//! tick_interval_ms = 500
//! ```

use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

const MIN_TIMEOUT_TICKS: u64 = 2;
const MAX_TIMEOUT_TICKS: u64 = 20;
const MAX_SESSION_TIMEOUT_MS: u64 = i32::MAX as u64;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionConfig {
    /// Base time unit; session timeout bounds default to multiples of it
    #[serde(default = "default_tick_time_ms")]
    pub tick_time_ms: u64,

    /// Lower bound for negotiated session timeouts (default: 2 ticks)
    #[serde(default)]
    pub min_session_timeout_ms: Option<u64>,

    /// Upper bound for negotiated session timeouts (default: 20 ticks)
    #[serde(default)]
    pub max_session_timeout_ms: Option<u64>,

    /// How often the liveness monitor scans for expired sessions
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// How many terminated sessions keep reporting their final state
    #[serde(default = "default_tombstone_capacity")]
    pub tombstone_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_time_ms: default_tick_time_ms(),
            min_session_timeout_ms: None,
            max_session_timeout_ms: None,
            tick_interval_ms: default_tick_interval_ms(),
            tombstone_capacity: default_tombstone_capacity(),
        }
    }
}

impl SessionConfig {
    pub fn min_session_timeout(&self) -> Duration {
        Duration::from_millis(
            self.min_session_timeout_ms
                .unwrap_or(self.tick_time_ms.saturating_mul(MIN_TIMEOUT_TICKS)),
        )
    }

    pub fn max_session_timeout(&self) -> Duration {
        Duration::from_millis(
            self.max_session_timeout_ms
                .unwrap_or(self.tick_time_ms.saturating_mul(MAX_TIMEOUT_TICKS)),
        )
    }

    /// Clamp a client-requested timeout into the configured bounds.
    pub fn negotiate_timeout(
        &self,
        requested: Option<Duration>,
    ) -> Duration {
        let min = self.min_session_timeout();
        let max = self.max_session_timeout();
        requested.unwrap_or(max).clamp(min, max)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_time_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "tick_time_ms must be greater than 0".into(),
            )));
        }

        if self.tick_interval_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "tick_interval_ms must be greater than 0".into(),
            )));
        }

        let min = self.min_session_timeout();
        let max = self.max_session_timeout();
        if min > max {
            return Err(Error::Config(ConfigError::Message(format!(
                "min_session_timeout {}ms must not exceed max_session_timeout {}ms",
                min.as_millis(),
                max.as_millis()
            ))));
        }

        // session timeouts are negotiated as i32 milliseconds
        if max > Duration::from_millis(MAX_SESSION_TIMEOUT_MS) {
            return Err(Error::Config(ConfigError::Message(format!(
                "max_session_timeout {}ms exceeds {}ms (tick_time_ms = {})",
                max.as_millis(),
                MAX_SESSION_TIMEOUT_MS,
                self.tick_time_ms
            ))));
        }

        Ok(())
    }
}

fn default_tick_time_ms() -> u64 {
    2000
}
fn default_tick_interval_ms() -> u64 {
    500
}
fn default_tombstone_capacity() -> usize {
    10_000
}
