//! Core library for the Flotilla OpenStack agent provisioner.
//!
//! The crate authenticates against OpenStack, boots agent servers stamped
//! with an ownership marker, verifies they become `ACTIVE` (destroying them
//! otherwise), manages their floating IPs, and destroys them again. Every
//! query is filtered through the marker, so a shared project looks as if it
//! held only this orchestrator's machines.

pub mod backend;
pub mod config;
pub mod error;
pub mod floating_ip;
pub mod inventory;
pub mod janitor;
pub mod lifecycle;
pub mod model;
pub mod openstack;
pub mod ownership;
pub mod session;
pub mod test_support;

pub use backend::{ComputeApi, RequestError, ServerRequest, ServerRequestBuilder, TaggedServerRequest};
pub use config::{ConfigError, OpenstackConfig};
pub use error::{ActionFailed, OpenstackError};
pub use floating_ip::AssignmentError;
pub use janitor::{Janitor, JanitorConfig, JanitorError, SweepSummary};
pub use lifecycle::{BootFailure, public_address};
pub use model::{
    ActionResponse, Address, AddressKind, Fault, Flavor, FloatingIp, Image, Network, Server,
    ServerStatus,
};
pub use openstack::{AuthToken, Endpoints, OpenstackApi};
pub use ownership::{FINGERPRINT_KEY, Fingerprint, FingerprintError, is_occupied};
pub use session::{Credential, Credentials, Identity, Openstack};
