//! Provider-side resources as seen by the lifecycle code.
//!
//! These are plain snapshots: every query re-reads them from the provider,
//! nothing here is cached or mutated in place.

use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle status reported by the compute service.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum ServerStatus {
    /// The server is running.
    Active,
    /// The server has not finished the original build process.
    Build,
    /// The server is being rebuilt.
    Rebuild,
    /// The server is suspended.
    Suspended,
    /// The server is paused.
    Paused,
    /// The server is being resized.
    Resize,
    /// A resize is awaiting confirmation.
    VerifyResize,
    /// A resize is being reverted.
    RevertResize,
    /// The password is being reset.
    Password,
    /// The server is in a soft reboot.
    Reboot,
    /// The server is in a hard reboot.
    HardReboot,
    /// The server was permanently deleted.
    Deleted,
    /// The server state is unknown to the provider.
    Unknown,
    /// The server is in error.
    Error,
    /// The server was stopped by the guest.
    Stopped,
    /// The server was powered down.
    Shutoff,
    /// The server is being migrated.
    Migrating,
    /// The server is shelved.
    Shelved,
    /// The server is shelved and offloaded from its host.
    ShelvedOffloaded,
    /// The server was soft deleted and can still be restored.
    SoftDeleted,
    /// The server is in rescue mode.
    Rescue,
    /// A status this crate does not know about, kept verbatim.
    Unrecognized(String),
}

impl ServerStatus {
    /// Maps a provider status string. Matching is exact (the API reports
    /// upper case); anything else is kept as [`ServerStatus::Unrecognized`].
    #[must_use]
    pub fn from_provider(value: &str) -> Self {
        match value {
            "ACTIVE" => Self::Active,
            "BUILD" => Self::Build,
            "REBUILD" => Self::Rebuild,
            "SUSPENDED" => Self::Suspended,
            "PAUSED" => Self::Paused,
            "RESIZE" => Self::Resize,
            "VERIFY_RESIZE" => Self::VerifyResize,
            "REVERT_RESIZE" => Self::RevertResize,
            "PASSWORD" => Self::Password,
            "REBOOT" => Self::Reboot,
            "HARD_REBOOT" => Self::HardReboot,
            "DELETED" => Self::Deleted,
            "UNKNOWN" => Self::Unknown,
            "ERROR" => Self::Error,
            "STOPPED" => Self::Stopped,
            "SHUTOFF" => Self::Shutoff,
            "MIGRATING" => Self::Migrating,
            "SHELVED" => Self::Shelved,
            "SHELVED_OFFLOADED" => Self::ShelvedOffloaded,
            "SOFT_DELETED" => Self::SoftDeleted,
            "RESCUE" => Self::Rescue,
            other => Self::Unrecognized(other.to_owned()),
        }
    }

    /// Provider spelling of the status.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Active => "ACTIVE",
            Self::Build => "BUILD",
            Self::Rebuild => "REBUILD",
            Self::Suspended => "SUSPENDED",
            Self::Paused => "PAUSED",
            Self::Resize => "RESIZE",
            Self::VerifyResize => "VERIFY_RESIZE",
            Self::RevertResize => "REVERT_RESIZE",
            Self::Password => "PASSWORD",
            Self::Reboot => "REBOOT",
            Self::HardReboot => "HARD_REBOOT",
            Self::Deleted => "DELETED",
            Self::Unknown => "UNKNOWN",
            Self::Error => "ERROR",
            Self::Stopped => "STOPPED",
            Self::Shutoff => "SHUTOFF",
            Self::Migrating => "MIGRATING",
            Self::Shelved => "SHELVED",
            Self::ShelvedOffloaded => "SHELVED_OFFLOADED",
            Self::SoftDeleted => "SOFT_DELETED",
            Self::Rescue => "RESCUE",
            Self::Unrecognized(value) => value.as_str(),
        }
    }

    /// Statuses that end a boot wait: no further automatic transition is
    /// expected from either.
    #[must_use]
    pub const fn is_boot_terminal(&self) -> bool {
        matches!(self, Self::Active | Self::Error)
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error the compute service attaches to a failed server.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Fault {
    /// Numeric fault code (HTTP-like).
    pub code: i64,
    /// Short message.
    pub message: String,
    /// Longer detail, often a traceback.
    pub details: Option<String>,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} ({})",
            self.code,
            self.message,
            self.details.as_deref().unwrap_or("null")
        )
    }
}

/// How an address is bound to a server.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AddressKind {
    /// Address assigned from the server's own network.
    Fixed,
    /// Public address associated from a floating IP pool.
    Floating,
    /// Any other or missing type, kept verbatim.
    Other(String),
}

impl AddressKind {
    /// Maps the provider's address type.
    #[must_use]
    pub fn from_provider(value: Option<&str>) -> Self {
        match value {
            Some("fixed") => Self::Fixed,
            Some("floating") => Self::Floating,
            other => Self::Other(other.unwrap_or_default().to_owned()),
        }
    }
}

/// A single address attached to a server.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Address {
    /// Textual IP address.
    pub addr: String,
    /// Binding type.
    pub kind: AddressKind,
}

impl Address {
    /// Fixed address helper.
    #[must_use]
    pub fn fixed(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            kind: AddressKind::Fixed,
        }
    }

    /// Floating address helper.
    #[must_use]
    pub fn floating(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            kind: AddressKind::Floating,
        }
    }
}

/// Snapshot of a compute instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Server {
    /// Provider identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Lifecycle status.
    pub status: ServerStatus,
    /// Extended VM state (`OS-EXT-STS:vm_state`), when exposed.
    pub vm_state: Option<String>,
    /// Fault detail for servers in error.
    pub fault: Option<Fault>,
    /// Free-form metadata, including the ownership marker.
    pub metadata: BTreeMap<String, String>,
    /// Addresses keyed by network name.
    pub addresses: BTreeMap<String, Vec<Address>>,
}

impl Server {
    /// Creates a snapshot with only identity and status populated.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, status: ServerStatus) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status,
            vm_state: None,
            fault: None,
            metadata: BTreeMap::new(),
            addresses: BTreeMap::new(),
        }
    }

    /// Picks the address a client should use to reach the server.
    ///
    /// The first floating address wins. Without one, the last non-floating
    /// address seen during the scan is returned; `None` when the server has
    /// no address at all.
    #[must_use]
    pub fn public_address(&self) -> Option<&str> {
        let mut fixed = None;
        for address in self.addresses.values().flatten() {
            if address.kind == AddressKind::Floating {
                return Some(&address.addr);
            }
            fixed = Some(address.addr.as_str());
        }
        fixed
    }
}

/// Public address bindable to a server.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FloatingIp {
    /// Provider identifier of the allocation.
    pub id: String,
    /// Public address.
    pub floating_ip_address: String,
    /// Private address it maps to, when bound.
    pub fixed_ip_address: Option<String>,
    /// Server the address is bound to, when bound.
    pub instance_id: Option<String>,
    /// Pool the address was allocated from.
    pub pool: Option<String>,
}

/// Outcome of a provider action that reports success in-band.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ActionResponse {
    /// HTTP status code.
    pub code: u16,
    /// Response body, or a fault message, when the action failed.
    pub fault: Option<String>,
}

impl ActionResponse {
    /// Successful response.
    #[must_use]
    pub const fn success(code: u16) -> Self {
        Self { code, fault: None }
    }

    /// Failed response carrying the provider text.
    #[must_use]
    pub fn failure(code: u16, fault: impl Into<String>) -> Self {
        Self {
            code,
            fault: Some(fault.into()),
        }
    }

    /// Whether the action succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.fault.is_none() && self.code >= 200 && self.code < 300
    }
}

impl fmt::Display for ActionResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ActionResponse{{success={}, fault={}, code={}}}",
            self.is_success(),
            self.fault.as_deref().unwrap_or("null"),
            self.code
        )
    }
}

/// Resources that sort by display name.
pub trait Named {
    /// Display name used for ordering.
    fn name(&self) -> &str;
}

/// Neutron network.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Network {
    /// Provider identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Administrative status, for example `ACTIVE`.
    pub status: Option<String>,
    /// Whether the network is shared across projects.
    pub shared: bool,
}

/// Glance image.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Image {
    /// Provider identifier.
    pub id: String,
    /// Display name; Glance allows it to be empty.
    pub name: String,
    /// Upload status, for example `active`.
    pub status: Option<String>,
}

/// Nova flavor.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Flavor {
    /// Provider identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Virtual CPU count.
    pub vcpus: u32,
    /// Memory in MiB.
    pub ram_mb: u64,
    /// Root disk in GiB.
    pub disk_gb: u64,
}

macro_rules! named {
    ($($ty:ty),+) => {
        $(impl Named for $ty {
            fn name(&self) -> &str {
                &self.name
            }
        })+
    };
}

named!(Network, Image, Flavor, Server);

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn with_addresses(networks: &[(&str, Vec<Address>)]) -> Server {
        let mut server = Server::new("srv", "srv", ServerStatus::Active);
        for (name, addresses) in networks {
            server.addresses.insert((*name).to_owned(), addresses.clone());
        }
        server
    }

    #[test]
    fn public_address_prefers_floating_on_any_network() {
        let server = with_addresses(&[
            ("net1", vec![Address::fixed("10.0.0.5")]),
            (
                "net2",
                vec![Address::floating("203.0.113.9"), Address::fixed("10.0.0.6")],
            ),
        ]);
        assert_eq!(server.public_address(), Some("203.0.113.9"));
    }

    #[test]
    fn public_address_falls_back_to_fixed() {
        let server = with_addresses(&[("net1", vec![Address::fixed("10.0.0.5")])]);
        assert_eq!(server.public_address(), Some("10.0.0.5"));
    }

    #[test]
    fn public_address_uses_last_fixed_seen() {
        let server = with_addresses(&[
            ("net1", vec![Address::fixed("10.0.0.5")]),
            ("net2", vec![Address::fixed("10.1.0.7")]),
        ]);
        assert_eq!(server.public_address(), Some("10.1.0.7"));
    }

    #[test]
    fn public_address_is_empty_without_addresses() {
        assert_eq!(with_addresses(&[]).public_address(), None);
        assert_eq!(with_addresses(&[("net1", vec![])]).public_address(), None);
    }

    #[rstest]
    #[case("ACTIVE", ServerStatus::Active)]
    #[case("SHELVED_OFFLOADED", ServerStatus::ShelvedOffloaded)]
    #[case("active", ServerStatus::Unrecognized(String::from("active")))]
    #[case("HIBERNATING", ServerStatus::Unrecognized(String::from("HIBERNATING")))]
    fn status_mapping_is_exact(#[case] raw: &str, #[case] expected: ServerStatus) {
        let status = ServerStatus::from_provider(raw);
        assert_eq!(status, expected);
        assert_eq!(status.as_str(), raw);
    }

    #[test]
    fn fault_renders_code_message_and_details() {
        let fault = Fault {
            code: 500,
            message: String::from("No valid host was found."),
            details: Some(String::from("NoValidHost")),
        };
        assert_eq!(fault.to_string(), "500: No valid host was found. (NoValidHost)");
    }

    #[test]
    fn fault_without_details_renders_null() {
        let fault = Fault {
            code: 500,
            message: String::from("No valid host was found."),
            details: None,
        };
        assert_eq!(fault.to_string(), "500: No valid host was found. (null)");
    }

    #[test]
    fn action_response_reports_failure_text() {
        let response = ActionResponse::failure(409, "Cannot delete locked server");
        assert!(!response.is_success());
        assert_eq!(
            response.to_string(),
            "ActionResponse{success=false, fault=Cannot delete locked server, code=409}"
        );
    }
}
