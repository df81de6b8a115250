//! Sweep of every machine this orchestrator still owns.
//!
//! Used on orchestrator shutdown and by the `sweep` subcommand. Servers are
//! selected through the ownership marker, so machines started by anyone else
//! in a shared project are never touched. The sweep fails if any of ours are
//! still occupied once the deletes have had time to settle.

use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, sleep};
use tracing::{debug, info};

use crate::backend::ComputeApi;
use crate::error::OpenstackError;
use crate::model::Server;
use crate::session::Openstack;

/// Settle time granted to deletes before the sweep is declared unclean.
pub const DEFAULT_SETTLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Interval between re-listings while deletes settle.
pub const DEFAULT_SETTLE_INTERVAL: Duration = Duration::from_secs(5);

/// Configuration for a janitor sweep.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct JanitorConfig {
    /// How long to wait for deleted servers to disappear.
    pub settle_timeout: Duration,
    /// Delay between re-listings.
    pub settle_interval: Duration,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            settle_timeout: DEFAULT_SETTLE_TIMEOUT,
            settle_interval: DEFAULT_SETTLE_INTERVAL,
        }
    }
}

/// Summary of janitor work.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SweepSummary {
    /// Number of servers destroyed during the sweep.
    pub destroyed_servers: usize,
}

/// Errors returned by the janitor.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum JanitorError {
    /// Raised when destroying a server fails. The sweep stops there.
    #[error("failed to destroy server {server_id}: {source}")]
    Destroy {
        /// Server that could not be destroyed.
        server_id: String,
        /// Destroyer failure.
        source: OpenstackError,
    },
    /// Raised when listing servers fails.
    #[error(transparent)]
    Provider(#[from] OpenstackError),
    /// Raised when servers remain after the sweep.
    #[error("servers remain after janitor sweep: {message}")]
    NotClean {
        /// Human-readable description of what remains.
        message: String,
    },
}

/// Destroys every occupied server carrying this session's marker.
#[derive(Clone, Copy, Debug)]
pub struct Janitor<'a, A: ComputeApi> {
    session: &'a Openstack<A>,
    config: JanitorConfig,
}

impl<'a, A: ComputeApi> Janitor<'a, A> {
    /// Creates a janitor working through `session`.
    #[must_use]
    pub const fn new(session: &'a Openstack<A>, config: JanitorConfig) -> Self {
        Self { session, config }
    }

    /// Performs a sweep and returns how many servers were destroyed.
    ///
    /// Servers are destroyed one at a time, floating IPs included. The
    /// running-node view is then re-read until it is empty or the settle
    /// timeout has passed.
    ///
    /// # Errors
    ///
    /// Returns [`JanitorError::Destroy`] for the first server that could not
    /// be destroyed, [`JanitorError::Provider`] when listing fails, or
    /// [`JanitorError::NotClean`] when servers of ours are still occupied.
    pub async fn sweep(&self) -> Result<SweepSummary, JanitorError> {
        let nodes = self.session.get_running_nodes().await?;
        for server in &nodes {
            info!(server_id = %server.id, server = %server.name, "Sweeping machine");
            self.session
                .destroy_server(server)
                .await
                .map_err(|source| JanitorError::Destroy {
                    server_id: server.id.clone(),
                    source,
                })?;
        }

        let remaining = self.wait_until_clean().await?;
        if !remaining.is_empty() {
            let ids: Vec<&str> = remaining.iter().map(|server| server.id.as_str()).collect();
            let message = format!("servers remaining: {} ({})", ids.len(), ids.join(", "));
            return Err(JanitorError::NotClean { message });
        }

        Ok(SweepSummary {
            destroyed_servers: nodes.len(),
        })
    }

    async fn wait_until_clean(&self) -> Result<Vec<Server>, OpenstackError> {
        let deadline = Instant::now().checked_add(self.config.settle_timeout);
        loop {
            let remaining = self.session.get_running_nodes().await?;
            let pause = deadline.map_or(self.config.settle_interval, |end| {
                end.saturating_duration_since(Instant::now())
            });
            if remaining.is_empty() || pause.is_zero() {
                return Ok(remaining);
            }
            debug!(remaining = remaining.len(), "Waiting for deleted machines to go away");
            sleep(self.config.settle_interval.min(pause)).await;
        }
    }
}

#[cfg(test)]
mod tests;
