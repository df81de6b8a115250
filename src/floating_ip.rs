//! Floating IP assignment with compensation, and release on destroy.

use thiserror::Error;
use tracing::{debug, warn};

use crate::backend::ComputeApi;
use crate::error::OpenstackError;
use crate::model::{FloatingIp, Server};
use crate::session::Openstack;

/// Why a floating IP could not be assigned, and what was left behind.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum AssignmentError {
    /// Nothing was allocated.
    #[error("failed to allocate a floating IP for {server}: {source}")]
    Allocation {
        /// Server the address was meant for.
        server: String,
        /// Provider failure.
        source: OpenstackError,
    },
    /// The attach failed and the allocation was released again.
    #[error("failed to attach floating IP {address} to {server}: {source}")]
    Attach {
        /// Server the address was meant for.
        server: String,
        /// Address that was allocated and then released.
        address: String,
        /// Attach failure.
        source: OpenstackError,
    },
    /// The attach failed and releasing the allocation failed too.
    #[error(
        "failed to attach floating IP {} to {server}: {source}; releasing it also failed: {compensation}",
        .floating_ip.floating_ip_address
    )]
    Leaked {
        /// Server the address was meant for.
        server: String,
        /// Allocation still held by the project.
        floating_ip: Box<FloatingIp>,
        /// Attach failure.
        source: OpenstackError,
        /// Release failure.
        compensation: Box<OpenstackError>,
    },
}

impl AssignmentError {
    /// Whether an allocation was left behind and needs manual cleanup.
    #[must_use]
    pub const fn needs_manual_cleanup(&self) -> bool {
        matches!(self, Self::Leaked { .. })
    }

    /// Floating IP that is still allocated, if any.
    #[must_use]
    pub fn leaked(&self) -> Option<&FloatingIp> {
        match self {
            Self::Leaked { floating_ip, .. } => Some(&**floating_ip),
            Self::Allocation { .. } | Self::Attach { .. } => None,
        }
    }
}

impl From<AssignmentError> for OpenstackError {
    fn from(value: AssignmentError) -> Self {
        match value {
            AssignmentError::Allocation { source, .. } | AssignmentError::Attach { source, .. } => {
                source
            }
            AssignmentError::Leaked {
                source,
                compensation,
                ..
            } => source.with_teardown(*compensation),
        }
    }
}

impl<A: ComputeApi> Openstack<A> {
    /// Allocates a floating IP from the default pool and binds it to `server`.
    ///
    /// The attach is not retried. When it fails, the allocation is released
    /// before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns an [`AssignmentError`] telling whether the failure left an
    /// allocation behind.
    pub async fn assign_floating_ip(&self, server: &Server) -> Result<FloatingIp, AssignmentError> {
        let floating_ip =
            self.api
                .allocate_floating_ip(None)
                .await
                .map_err(|source| AssignmentError::Allocation {
                    server: server.id.clone(),
                    source,
                })?;
        debug!(
            server = %server.name,
            address = %floating_ip.floating_ip_address,
            "Floating IP allocated"
        );

        let attached = self
            .api
            .add_floating_ip(&server.id, &floating_ip.floating_ip_address)
            .await;
        let Err(source) = attached else {
            debug!(
                server = %server.name,
                address = %floating_ip.floating_ip_address,
                "Floating IP attached"
            );
            return Ok(FloatingIp {
                instance_id: Some(server.id.clone()),
                ..floating_ip
            });
        };

        if let Err(compensation) = self.api.deallocate_floating_ip(&floating_ip.id).await {
            warn!(
                floating_ip_id = %floating_ip.id,
                address = %floating_ip.floating_ip_address,
                %compensation,
                "Floating IP leaked, manual cleanup required"
            );
            return Err(AssignmentError::Leaked {
                server: server.id.clone(),
                floating_ip: Box::new(floating_ip),
                source,
                compensation: Box::new(compensation),
            });
        }
        debug!(
            address = %floating_ip.floating_ip_address,
            "Floating IP released after failed attach"
        );
        Err(AssignmentError::Attach {
            server: server.id.clone(),
            address: floating_ip.floating_ip_address,
            source,
        })
    }

    /// Detaches and deallocates every floating IP bound to `server`.
    ///
    /// Stops at the first failure.
    pub(crate) async fn release_floating_ips(&self, server: &Server) -> Result<(), OpenstackError> {
        let bound = self
            .api
            .list_floating_ips()
            .await?
            .into_iter()
            .filter(|ip| ip.instance_id.as_deref() == Some(server.id.as_str()));
        for ip in bound {
            debug!(
                server = %server.name,
                address = %ip.floating_ip_address,
                "Releasing floating IP"
            );
            self.api
                .remove_floating_ip(&server.id, &ip.floating_ip_address)
                .await?;
            self.api.deallocate_floating_ip(&ip.id).await?;
        }
        Ok(())
    }
}
