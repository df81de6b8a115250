//! Authenticated session with the provider.
//!
//! [`Openstack`] is created once, authenticates eagerly, and is then shared
//! read-only by every inventory, lifecycle and floating IP operation.

use std::fmt;
use std::time::Duration;

use tracing::debug;

use crate::backend::ComputeApi;
use crate::error::OpenstackError;
use crate::openstack::OpenstackApi;
use crate::ownership::Fingerprint;

/// Secret credential that never prints its value.
#[derive(Clone, Eq, PartialEq)]
pub struct Credential(String);

impl Credential {
    /// Wraps a plain-text secret.
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Plain-text value, for the identity request only.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Principal and project parsed from a `principal:project` identity.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Identity {
    /// User name.
    pub principal: String,
    /// Project (tenant) name.
    pub project: String,
}

impl Identity {
    /// Splits on the first `:`.
    ///
    /// An identity without a separator yields an empty project rather than
    /// an error; the identity service then decides whether that is usable.
    #[must_use]
    pub fn parse(identity: &str) -> Self {
        let (principal, project) = identity.split_once(':').unwrap_or((identity, ""));
        Self {
            principal: principal.to_owned(),
            project: project.to_owned(),
        }
    }
}

/// Everything needed to open a session.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Credentials {
    /// Identity service URL, for example `https://keystone:5000/v3`.
    pub endpoint: String,
    /// Parsed principal and project.
    pub identity: Identity,
    /// Secret for the principal.
    pub credential: Credential,
    /// Region to select endpoints from; the first one listed otherwise.
    pub region: Option<String>,
}

impl Credentials {
    /// Builds credentials from the compound `principal:project` identity.
    #[must_use]
    pub fn new(
        endpoint: impl Into<String>,
        identity: &str,
        credential: Credential,
        region: Option<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            identity: Identity::parse(identity),
            credential,
            region: region.filter(|value| !value.trim().is_empty()),
        }
    }
}

/// Session bound to one provider account and one orchestrator identity.
///
/// Servers are only ever referenced by id and re-fetched; the session holds
/// no per-operation state and can be shared by concurrent operations.
#[derive(Clone, Debug)]
pub struct Openstack<A = OpenstackApi> {
    pub(crate) api: A,
    pub(crate) fingerprint: Fingerprint,
}

impl Openstack<OpenstackApi> {
    /// Authenticates against the identity service and opens a session.
    ///
    /// # Errors
    ///
    /// Returns [`OpenstackError::Authentication`] when the credentials are
    /// rejected, or [`OpenstackError::Provider`] when the identity service
    /// cannot be reached or its catalogue lacks a required service.
    pub async fn connect(
        credentials: &Credentials,
        fingerprint: Fingerprint,
        poll_interval: Duration,
    ) -> Result<Self, OpenstackError> {
        let api = OpenstackApi::authenticate(credentials)
            .await?
            .with_poll_interval(poll_interval);
        debug!(endpoint = %credentials.endpoint, "Openstack client created");
        Ok(Self::with_api(api, fingerprint))
    }
}

impl<A: ComputeApi> Openstack<A> {
    /// Wraps an already authenticated provider API.
    #[must_use]
    pub const fn with_api(api: A, fingerprint: Fingerprint) -> Self {
        Self { api, fingerprint }
    }

    /// Identity marker stamped on every server this session boots.
    #[must_use]
    pub const fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Underlying provider API.
    #[must_use]
    pub const fn api(&self) -> &A {
        &self.api
    }
}
