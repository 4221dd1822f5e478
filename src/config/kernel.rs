use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct KernelConfig {
    /// Identity of this kernel instance; occupies the high byte of every
    /// session id it issues
    #[serde(default = "default_server_id")]
    pub server_id: u8,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            server_id: default_server_id(),
        }
    }
}

impl KernelConfig {
    pub fn validate(&self) -> Result<()> {
        if self.server_id == 0 {
            return Err(Error::Config(ConfigError::Message(
                "server_id cannot be 0 (reserved for invalid kernels)".into(),
            )));
        }
        Ok(())
    }
}

fn default_server_id() -> u8 {
    1
}
