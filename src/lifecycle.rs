//! Provision, verify and roll back a single server.
//!
//! A boot either returns a server confirmed `ACTIVE` or destroys what it
//! created (floating IPs included) before reporting the failure. There is no
//! partial outcome.

use std::fmt;
use std::time::Duration;

use tracing::{debug, warn};

use crate::backend::{ComputeApi, ServerRequest};
use crate::error::OpenstackError;
use crate::model::{Fault, Server, ServerStatus};
use crate::session::Openstack;

/// Why a boot did not end `ACTIVE`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BootFailure {
    /// Whether the wait ran out while the server was still building.
    pub timed_out: bool,
    /// Status the server ended in.
    pub status: ServerStatus,
    /// Extended VM state, if reported.
    pub vm_state: Option<String>,
    /// Provider fault, if reported.
    pub fault: Option<Fault>,
}

impl BootFailure {
    /// Classifies a server returned by the boot wait; `None` means active.
    #[must_use]
    pub fn classify(server: &Server) -> Option<Self> {
        if server.status == ServerStatus::Active {
            return None;
        }
        Some(Self {
            timed_out: server.status == ServerStatus::Build,
            status: server.status.clone(),
            vm_state: server.vm_state.clone(),
            fault: server.fault.clone(),
        })
    }
}

impl fmt::Display for BootFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.timed_out {
            f.write_str("Failed to boot server in time (consider extending timeout setting):")?;
        } else {
            f.write_str("Failed to boot server:")?;
        }
        let fault = self
            .fault
            .as_ref()
            .map_or_else(|| String::from("none"), ToString::to_string);
        write!(
            f,
            " status={} vmState={} fault={fault}",
            self.status,
            self.vm_state.as_deref().unwrap_or("null")
        )
    }
}

/// Address a client should use to reach `server`.
///
/// See [`Server::public_address`].
#[must_use]
pub fn public_address(server: &Server) -> Option<&str> {
    server.public_address()
}

impl<A: ComputeApi> Openstack<A> {
    /// Boots a server and waits until it is usable.
    ///
    /// The ownership marker is stamped into the request before submission.
    /// A zero `timeout` checks the server once without waiting further.
    ///
    /// # Errors
    ///
    /// Returns [`OpenstackError::ActionFailed`] when the server did not reach
    /// `ACTIVE`; the server has then already been destroyed, and a failure
    /// to destroy it is attached as the teardown cause. Submission failures
    /// propagate unchanged.
    pub async fn boot_and_wait_active(
        &self,
        request: ServerRequest,
        timeout: Duration,
    ) -> Result<Server, OpenstackError> {
        debug!(server = %request.name, "Booting machine");
        let tagged = self.fingerprint.tag(request);
        let server = self.api.boot_and_wait_active(&tagged, timeout).await?;
        debug!(server = %server.name, status = %server.status, "Machine started");
        self.ensure_active(server).await
    }

    async fn ensure_active(&self, server: Server) -> Result<Server, OpenstackError> {
        let Some(failure) = BootFailure::classify(&server) else {
            return Ok(server);
        };

        let mut error = OpenstackError::action_failed(failure.to_string());
        if let Err(teardown) = self.destroy_server(&server).await {
            error = error.with_teardown(teardown);
        }
        warn!(server_id = %server.id, %error, "Machine provisioning failed");
        Err(error)
    }

    /// Fetches a fresh copy of a server.
    ///
    /// # Errors
    ///
    /// Returns [`OpenstackError::NotFound`] when the id is unknown.
    pub async fn get_server_by_id(&self, id: &str) -> Result<Server, OpenstackError> {
        self.api
            .get_server(id)
            .await?
            .ok_or_else(|| OpenstackError::NotFound { id: id.to_owned() })
    }

    /// Re-reads the server from the provider.
    ///
    /// # Errors
    ///
    /// Returns [`OpenstackError::NotFound`] when the server is gone.
    pub async fn update_info(&self, server: &Server) -> Result<Server, OpenstackError> {
        self.get_server_by_id(&server.id).await
    }

    /// Deletes the server and releases every floating IP bound to it.
    ///
    /// Ownership is not re-checked: only servers this session produced are
    /// expected here. Floating IP cleanup runs even when the delete was
    /// refused; the delete failure stays the primary error.
    ///
    /// # Errors
    ///
    /// Returns [`OpenstackError::ActionFailed`] carrying the provider response
    /// when the delete is refused, or the first floating IP cleanup error.
    pub async fn destroy_server(&self, server: &Server) -> Result<(), OpenstackError> {
        debug!(server = %server.name, "Destroying machine");
        // Deliberately no fingerprint check here.
        let deleted = match self.api.delete_server(&server.id).await {
            Ok(response) if response.is_success() => {
                debug!(server = %server.name, "Machine destroyed");
                Ok(())
            }
            Ok(response) => Err(OpenstackError::action_failed(response.to_string())),
            Err(err) => Err(err),
        };

        let released = self.release_floating_ips(server).await;
        match (deleted, released) {
            (Ok(()), Ok(())) => Ok(()),
            (Err(primary), Ok(())) => Err(primary),
            (Ok(()), Err(secondary)) => Err(secondary),
            (Err(primary), Err(secondary)) => Err(primary.with_teardown(secondary)),
        }
    }
}
