//! Default liveness collaborator.
//!
//! A periodic tokio task that asks the kernel which sessions missed their
//! deadline and expires them one by one. It keeps no state of its own; every
//! expiry goes through the kernel's serialization point like any other
//! request.

use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
use mockall::automock;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::error;
use tracing::info;

use super::SessionId;
use crate::Error;
use crate::Result;
use crate::SystemError;

/// What the monitor needs from the kernel.
#[cfg_attr(test, automock)]
pub trait SessionExpiry: Send + Sync + 'static {
    /// Live sessions whose deadline has passed
    fn expired_sessions(&self) -> Vec<SessionId>;

    /// Expire one session if it is still past its deadline. Returns
    /// `false` when a heartbeat renewed it after the scan; a session that
    /// already ended is not an error.
    fn expire(
        &self,
        session_id: SessionId,
    ) -> Result<bool>;
}

#[derive(Debug)]
pub struct SessionLivenessMonitor;

impl SessionLivenessMonitor {
    /// Expire every session that is past its deadline. Returns how many
    /// were expired.
    pub fn sweep(target: &dyn SessionExpiry) -> usize {
        let mut expired = 0;
        for session_id in target.expired_sessions() {
            match target.expire(session_id) {
                Ok(true) => expired += 1,
                Ok(false) => debug!(session_id = %session_id, "Session renewed before expiry"),
                Err(Error::System(SystemError::KernelShutdown)) => {
                    debug!("Kernel shut down, liveness sweep abandoned");
                    break;
                }
                Err(e) => error!(session_id = %session_id, "Session expiry failed: {:?}", e),
            }
        }
        expired
    }

    /// Run [`sweep`](Self::sweep) every `interval` until `shutdown_signal`
    /// fires.
    pub fn spawn(
        target: Arc<dyn SessionExpiry>,
        interval: Duration,
        mut shutdown_signal: watch::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let expired = Self::sweep(target.as_ref());
                        if expired > 0 {
                            debug!("Liveness sweep: expired {} sessions", expired);
                        }
                    }
                    _ = shutdown_signal.changed() => {
                        info!("Session liveness monitor received shutdown signal");
                        break;
                    }
                }
            }

            debug!("Session liveness monitor stopped");
        })
    }
}
