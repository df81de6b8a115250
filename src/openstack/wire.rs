//! JSON payloads exchanged with Keystone, Nova, Neutron and Glance.

use std::collections::BTreeMap;
use std::fmt;

use base64::prelude::*;
use serde::{Deserialize, Serialize};

use crate::backend::TaggedServerRequest;
use crate::model::{
    Address, AddressKind, Fault, Flavor, FloatingIp, Image, Network, Server, ServerStatus,
};

/// Identifier that older Nova releases send as a number.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(untagged)]
pub(super) enum WireId {
    Text(String),
    Number(i64),
}

impl fmt::Display for WireId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(value) => f.write_str(value),
            Self::Number(value) => write!(f, "{value}"),
        }
    }
}

// Nova: servers

#[derive(Debug, Deserialize)]
pub(super) struct ServersEnvelope {
    pub(super) servers: Vec<ServerDto>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ServerEnvelope {
    pub(super) server: ServerDto,
}

#[derive(Debug, Deserialize)]
pub(super) struct ServerDto {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    status: String,
    #[serde(rename = "OS-EXT-STS:vm_state", default)]
    vm_state: Option<String>,
    #[serde(default)]
    fault: Option<FaultDto>,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
    #[serde(default)]
    addresses: BTreeMap<String, Vec<AddressDto>>,
}

#[derive(Debug, Deserialize)]
struct FaultDto {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    details: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AddressDto {
    addr: String,
    #[serde(rename = "OS-EXT-IPS:type", default)]
    kind: Option<String>,
}

impl From<ServerDto> for Server {
    fn from(value: ServerDto) -> Self {
        Self {
            id: value.id,
            name: value.name,
            status: ServerStatus::from_provider(&value.status),
            vm_state: value.vm_state,
            fault: value.fault.map(|fault| Fault {
                code: fault.code,
                message: fault.message,
                details: fault.details,
            }),
            metadata: value.metadata,
            addresses: value
                .addresses
                .into_iter()
                .map(|(network, addresses)| {
                    let converted = addresses
                        .into_iter()
                        .map(|address| Address {
                            addr: address.addr,
                            kind: AddressKind::from_provider(address.kind.as_deref()),
                        })
                        .collect();
                    (network, converted)
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct CreatedEnvelope {
    pub(super) server: CreatedServer,
}

#[derive(Debug, Deserialize)]
pub(super) struct CreatedServer {
    pub(super) id: String,
}

#[derive(Debug, Serialize)]
pub(super) struct CreateServerBody<'a> {
    server: CreateServer<'a>,
}

#[derive(Debug, Serialize)]
struct CreateServer<'a> {
    name: &'a str,
    #[serde(rename = "imageRef")]
    image_ref: &'a str,
    #[serde(rename = "flavorRef")]
    flavor_ref: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    networks: Vec<NetworkRef<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    key_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    security_groups: Vec<SecurityGroupRef<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    availability_zone: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_data: Option<String>,
    metadata: &'a BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct NetworkRef<'a> {
    uuid: &'a str,
}

#[derive(Debug, Serialize)]
struct SecurityGroupRef<'a> {
    name: &'a str,
}

impl<'a> CreateServerBody<'a> {
    /// Nova expects user data base64 encoded.
    pub(super) fn new(tagged: &'a TaggedServerRequest) -> Self {
        let request = tagged.request();
        Self {
            server: CreateServer {
                name: &request.name,
                image_ref: &request.image_id,
                flavor_ref: &request.flavor_id,
                networks: request
                    .network_ids
                    .iter()
                    .map(|uuid| NetworkRef { uuid })
                    .collect(),
                key_name: request.key_name.as_deref(),
                security_groups: request
                    .security_groups
                    .iter()
                    .map(|name| SecurityGroupRef { name })
                    .collect(),
                availability_zone: request.availability_zone.as_deref(),
                user_data: request
                    .user_data
                    .as_ref()
                    .map(|data| BASE64_STANDARD.encode(data)),
                metadata: &request.metadata,
            },
        }
    }
}

// Nova: flavors and floating IPs

#[derive(Debug, Deserialize)]
pub(super) struct FlavorsEnvelope {
    pub(super) flavors: Vec<FlavorDto>,
}

#[derive(Debug, Deserialize)]
pub(super) struct FlavorDto {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    vcpus: u32,
    #[serde(default)]
    ram: u64,
    #[serde(default)]
    disk: u64,
}

impl From<FlavorDto> for Flavor {
    fn from(value: FlavorDto) -> Self {
        Self {
            id: value.id,
            name: value.name,
            vcpus: value.vcpus,
            ram_mb: value.ram,
            disk_gb: value.disk,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct FloatingIpsEnvelope {
    pub(super) floating_ips: Vec<FloatingIpDto>,
}

#[derive(Debug, Deserialize)]
pub(super) struct FloatingIpEnvelope {
    pub(super) floating_ip: FloatingIpDto,
}

#[derive(Debug, Deserialize)]
pub(super) struct FloatingIpDto {
    id: WireId,
    ip: String,
    #[serde(default)]
    fixed_ip: Option<String>,
    #[serde(default)]
    instance_id: Option<String>,
    #[serde(default)]
    pool: Option<String>,
}

impl From<FloatingIpDto> for FloatingIp {
    fn from(value: FloatingIpDto) -> Self {
        Self {
            id: value.id.to_string(),
            floating_ip_address: value.ip,
            fixed_ip_address: value.fixed_ip,
            instance_id: value.instance_id,
            pool: value.pool,
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub(super) struct AllocateBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) pool: Option<&'a str>,
}

/// Body for `POST /servers/{id}/action`.
#[derive(Debug, Serialize)]
pub(super) enum ServerAction<'a> {
    #[serde(rename = "addFloatingIp")]
    AddFloatingIp { address: &'a str },
    #[serde(rename = "removeFloatingIp")]
    RemoveFloatingIp { address: &'a str },
}

impl ServerAction<'_> {
    pub(super) const fn describe(&self) -> &'static str {
        match self {
            Self::AddFloatingIp { .. } => "attach floating IP",
            Self::RemoveFloatingIp { .. } => "detach floating IP",
        }
    }
}

// Neutron

#[derive(Debug, Deserialize)]
pub(super) struct NetworksEnvelope {
    pub(super) networks: Vec<NetworkDto>,
}

#[derive(Debug, Deserialize)]
pub(super) struct NetworkDto {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    shared: bool,
}

impl From<NetworkDto> for Network {
    fn from(value: NetworkDto) -> Self {
        Self {
            id: value.id,
            name: value.name,
            status: value.status,
            shared: value.shared,
        }
    }
}

// Glance

#[derive(Debug, Deserialize)]
pub(super) struct ImagesPage {
    pub(super) images: Vec<ImageDto>,
    #[serde(default)]
    pub(super) next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ImageDto {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

impl From<ImageDto> for Image {
    fn from(value: ImageDto) -> Self {
        Self {
            id: value.id,
            name: value.name.unwrap_or_default(),
            status: value.status,
        }
    }
}
