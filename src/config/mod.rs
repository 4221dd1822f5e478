//! Configuration management for the coordination kernel.
//!
//! Sources are layered with increasing priority:
//! 1. Default values (hardcoded)
//! 2. File named by `CONFIG_PATH`
//! 3. Environment variables prefixed with `KEEPER__` (highest priority)
//!
//! Loading never validates; call [`KeeperConfig::validate`] before use.

mod kernel;
mod session;
mod tree;
mod watch;
pub use kernel::*;
pub use session::*;
pub use tree::*;
pub use watch::*;


use std::env;
use std::fmt::Debug;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

const ENV_PREFIX: &str = "KEEPER";

#[derive(Serialize, Deserialize, Clone, Default)]
pub struct KeeperConfig {
    /// Kernel identity
    #[serde(default)]
    pub kernel: KernelConfig,
    /// Session timeouts and liveness scanning
    #[serde(default)]
    pub session: SessionConfig,
    /// Watch registration limits
    #[serde(default)]
    pub watch: WatchConfig,
    /// Znode tree limits
    #[serde(default)]
    pub tree: TreeConfig,
}

impl Debug for KeeperConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("KeeperConfig")
            .field("kernel", &self.kernel)
            .field("session", &self.session)
            .field("watch", &self.watch)
            .field("tree", &self.tree)
            .finish()
    }
}

impl KeeperConfig {
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(env_source());

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Merge a TOML file on top of this configuration. Environment
    /// variables still win.
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(env_source())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    pub fn validate(self) -> Result<Self> {
        self.kernel.validate()?;
        self.session.validate()?;
        self.watch.validate()?;
        self.tree.validate()?;
        Ok(self)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
}
