//! Provider capability boundary and server creation requests.
//!
//! [`ComputeApi`] is everything the lifecycle needs from the cloud. The
//! [`crate::openstack::OpenstackApi`] adapter implements it over the REST
//! APIs; tests substitute scripted doubles.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;

use crate::error::OpenstackError;
use crate::model::{ActionResponse, Flavor, FloatingIp, Image, Network, Server};
use crate::ownership::FINGERPRINT_KEY;

/// Parameters for booting a new server.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServerRequest {
    /// Display name for the server.
    pub name: String,
    /// Image identifier to boot from.
    pub image_id: String,
    /// Flavor identifier.
    pub flavor_id: String,
    /// Networks to attach, in order.
    pub network_ids: Vec<String>,
    /// Key pair injected into the guest.
    pub key_name: Option<String>,
    /// Security group names.
    pub security_groups: Vec<String>,
    /// Availability zone to place the server in.
    pub availability_zone: Option<String>,
    /// Raw user data; encoded by the adapter.
    pub user_data: Option<String>,
    /// Caller metadata. The ownership key is reserved.
    pub metadata: BTreeMap<String, String>,
}

impl ServerRequest {
    /// Starts a builder for a [`ServerRequest`].
    #[must_use]
    pub fn builder() -> ServerRequestBuilder {
        ServerRequestBuilder::new()
    }

    /// Validates the request, returning the first offending field.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Validation`] when a required field is empty
    /// or the caller tried to set the ownership key.
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.name.is_empty() {
            return Err(RequestError::Validation(String::from("name")));
        }
        if self.image_id.is_empty() {
            return Err(RequestError::Validation(String::from("image_id")));
        }
        if self.flavor_id.is_empty() {
            return Err(RequestError::Validation(String::from("flavor_id")));
        }
        if self.network_ids.iter().any(String::is_empty) {
            return Err(RequestError::Validation(String::from("network_ids")));
        }
        if self.metadata.contains_key(FINGERPRINT_KEY) {
            return Err(RequestError::Validation(String::from("metadata")));
        }
        Ok(())
    }
}

/// Builder for [`ServerRequest`] that trims inputs and validates on build.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ServerRequestBuilder {
    name: String,
    image_id: String,
    flavor_id: String,
    network_ids: Vec<String>,
    key_name: Option<String>,
    security_groups: Vec<String>,
    availability_zone: Option<String>,
    user_data: Option<String>,
    metadata: BTreeMap<String, String>,
}

impl ServerRequestBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the server name.
    #[must_use]
    pub fn name(mut self, value: impl Into<String>) -> Self {
        self.name = value.into();
        self
    }

    /// Sets the image identifier.
    #[must_use]
    pub fn image_id(mut self, value: impl Into<String>) -> Self {
        self.image_id = value.into();
        self
    }

    /// Sets the flavor identifier.
    #[must_use]
    pub fn flavor_id(mut self, value: impl Into<String>) -> Self {
        self.flavor_id = value.into();
        self
    }

    /// Appends a network to attach.
    #[must_use]
    pub fn network_id(mut self, value: impl Into<String>) -> Self {
        self.network_ids.push(value.into());
        self
    }

    /// Sets the key pair name.
    #[must_use]
    pub fn key_name(mut self, value: Option<String>) -> Self {
        self.key_name = value;
        self
    }

    /// Appends a security group.
    #[must_use]
    pub fn security_group(mut self, value: impl Into<String>) -> Self {
        self.security_groups.push(value.into());
        self
    }

    /// Sets the availability zone.
    #[must_use]
    pub fn availability_zone(mut self, value: Option<String>) -> Self {
        self.availability_zone = value;
        self
    }

    /// Sets raw user data.
    #[must_use]
    pub fn user_data(mut self, value: Option<String>) -> Self {
        self.user_data = value;
        self
    }

    /// Adds a metadata item.
    #[must_use]
    pub fn metadata_item(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Builds and validates the request, trimming identifiers.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Validation`] when a required field is empty.
    pub fn build(self) -> Result<ServerRequest, RequestError> {
        let trim = |value: String| value.trim().to_owned();
        let request = ServerRequest {
            name: trim(self.name),
            image_id: trim(self.image_id),
            flavor_id: trim(self.flavor_id),
            network_ids: self.network_ids.into_iter().map(trim).collect(),
            key_name: self.key_name.map(trim).filter(|value| !value.is_empty()),
            security_groups: self.security_groups.into_iter().map(trim).collect(),
            availability_zone: self
                .availability_zone
                .map(trim)
                .filter(|value| !value.is_empty()),
            user_data: self.user_data,
            metadata: self.metadata,
        };
        request.validate()?;
        Ok(request)
    }
}

/// A [`ServerRequest`] carrying the ownership marker.
///
/// Only [`crate::ownership::Fingerprint::tag`] produces one, so the provider
/// API cannot be handed an untagged request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TaggedServerRequest {
    request: ServerRequest,
}

impl TaggedServerRequest {
    pub(crate) const fn new(request: ServerRequest) -> Self {
        Self { request }
    }

    /// The tagged request, marker included in its metadata.
    #[must_use]
    pub const fn request(&self) -> &ServerRequest {
        &self.request
    }
}

/// Errors raised while building requests.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum RequestError {
    /// Raised when a field is missing, empty or reserved.
    #[error("missing or invalid field: {0}")]
    Validation(String),
}

impl From<RequestError> for OpenstackError {
    fn from(value: RequestError) -> Self {
        Self::Config(value.to_string())
    }
}

/// Future returned by provider operations.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, OpenstackError>> + Send + 'a>>;

/// Operations the lifecycle needs from the cloud provider.
///
/// Implementations must be safe to share between concurrent operations and
/// must not cache mutable server state.
pub trait ComputeApi: Send + Sync {
    /// Lists every network visible to the project.
    fn list_networks(&self) -> ApiFuture<'_, Vec<Network>>;

    /// Lists every image visible to the project.
    fn list_images(&self) -> ApiFuture<'_, Vec<Image>>;

    /// Lists every flavor.
    fn list_flavors(&self) -> ApiFuture<'_, Vec<Flavor>>;

    /// Lists servers with details (status and metadata included).
    fn list_servers(&self) -> ApiFuture<'_, Vec<Server>>;

    /// Fetches one server; `None` when the id is unknown.
    fn get_server<'a>(&'a self, id: &'a str) -> ApiFuture<'a, Option<Server>>;

    /// Submits the request and waits until the server is `ACTIVE`, `ERROR`
    /// or `timeout` has elapsed, returning the last record seen.
    fn boot_and_wait_active<'a>(
        &'a self,
        request: &'a TaggedServerRequest,
        timeout: Duration,
    ) -> ApiFuture<'a, Server>;

    /// Requests deletion; provider refusals are reported in-band.
    fn delete_server<'a>(&'a self, id: &'a str) -> ApiFuture<'a, ActionResponse>;

    /// Lists floating IPs allocated to the project.
    fn list_floating_ips(&self) -> ApiFuture<'_, Vec<FloatingIp>>;

    /// Allocates a floating IP, from the default pool when `pool` is `None`.
    fn allocate_floating_ip<'a>(&'a self, pool: Option<&'a str>) -> ApiFuture<'a, FloatingIp>;

    /// Binds `address` to the server.
    fn add_floating_ip<'a>(&'a self, server_id: &'a str, address: &'a str) -> ApiFuture<'a, ()>;

    /// Unbinds `address` from the server.
    fn remove_floating_ip<'a>(&'a self, server_id: &'a str, address: &'a str)
    -> ApiFuture<'a, ()>;

    /// Releases the allocation back to the pool.
    fn deallocate_floating_ip<'a>(&'a self, id: &'a str) -> ApiFuture<'a, ()>;
}
