//! Ownership fingerprinting.
//!
//! Every server this crate boots carries [`FINGERPRINT_KEY`] in its metadata,
//! set to the orchestrator's own base URL. Queries keep only servers carrying
//! the exact value, so a shared project looks as if it held nothing but our
//! machines.

use thiserror::Error;
use tracing::warn;

use crate::backend::{ServerRequest, TaggedServerRequest};
use crate::model::{Server, ServerStatus};

/// Metadata key holding the ownership marker.
pub const FINGERPRINT_KEY: &str = "jenkins-instance";

/// Raised when the orchestrator identity has not been resolved.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum FingerprintError {
    /// The orchestrator has no externally reachable URL yet.
    #[error("orchestrator identity is unknown: configure its base URL before provisioning")]
    Unknown,
}

/// Stable identity of the controlling orchestrator.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Resolves the fingerprint once at startup.
    ///
    /// The value is kept verbatim; surrounding whitespace is significant
    /// because matching is exact.
    ///
    /// # Errors
    ///
    /// Returns [`FingerprintError::Unknown`] when the value is blank.
    pub fn new(value: impl Into<String>) -> Result<Self, FingerprintError> {
        let raw = value.into();
        if raw.trim().is_empty() {
            return Err(FingerprintError::Unknown);
        }
        Ok(Self(raw))
    }

    /// Like [`Fingerprint::new`] for identities that may not be known yet.
    ///
    /// # Errors
    ///
    /// Returns [`FingerprintError::Unknown`] when `value` is `None` or blank.
    pub fn resolve(value: Option<&str>) -> Result<Self, FingerprintError> {
        value.map_or(Err(FingerprintError::Unknown), Self::new)
    }

    /// The marker value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the server carries exactly this marker.
    #[must_use]
    pub fn is_ours(&self, server: &Server) -> bool {
        server
            .metadata
            .get(FINGERPRINT_KEY)
            .is_some_and(|value| *value == self.0)
    }

    /// Stamps the marker into the request metadata.
    #[must_use]
    pub fn tag(&self, mut request: ServerRequest) -> TaggedServerRequest {
        request
            .metadata
            .insert(FINGERPRINT_KEY.to_owned(), self.0.clone());
        TaggedServerRequest::new(request)
    }
}

/// Whether the server counts as consuming resources.
///
/// `UNKNOWN`, `MIGRATING`, `SHUTOFF` and `DELETED` are free. An unrecognised
/// status counts as occupied so a live machine is never reported gone.
#[must_use]
pub fn is_occupied(server: &Server) -> bool {
    match &server.status {
        ServerStatus::Unknown
        | ServerStatus::Migrating
        | ServerStatus::Shutoff
        | ServerStatus::Deleted => false,
        ServerStatus::Unrecognized(status) => {
            warn!(
                server_id = %server.id,
                server = %server.name,
                %status,
                "Machine state not recognized, treating it as occupied"
            );
            true
        }
        _ => true,
    }
}
