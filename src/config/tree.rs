use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TreeConfig {
    /// Largest znode payload accepted by create/setData
    #[serde(default = "default_max_data_bytes")]
    pub max_data_bytes: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_data_bytes: default_max_data_bytes(),
        }
    }
}

impl TreeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_data_bytes == 0 {
            return Err(Error::Config(ConfigError::Message(
                "max_data_bytes must be greater than 0".into(),
            )));
        }
        // Stat::data_length is a u32
        if self.max_data_bytes > u32::MAX as usize {
            return Err(Error::Config(ConfigError::Message(format!(
                "max_data_bytes {} exceeds {}",
                self.max_data_bytes,
                u32::MAX
            ))));
        }
        Ok(())
    }
}

// 1 MiB, same as jute.maxbuffer
fn default_max_data_bytes() -> usize {
    1024 * 1024
}
