//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::ffi::OsString;
use std::future::ready;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};

use crate::backend::{ApiFuture, ComputeApi, TaggedServerRequest};
use crate::error::OpenstackError;
use crate::model::{
    ActionResponse, Address, Fault, Flavor, FloatingIp, Image, Network, Server, ServerStatus,
};
use crate::ownership::FINGERPRINT_KEY;

/// Call recorded by [`ScriptedCompute`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ApiCall {
    /// `list_networks`.
    ListNetworks,
    /// `list_images`.
    ListImages,
    /// `list_flavors`.
    ListFlavors,
    /// `list_servers`.
    ListServers,
    /// `get_server` with the requested id.
    GetServer(String),
    /// `boot_and_wait_active` with what the provider received.
    Boot {
        /// Requested server name.
        name: String,
        /// Metadata as submitted, marker included.
        metadata: BTreeMap<String, String>,
        /// Wait bound passed through.
        timeout: Duration,
    },
    /// `delete_server` with the server id.
    DeleteServer(String),
    /// `list_floating_ips`.
    ListFloatingIps,
    /// `allocate_floating_ip` with the pool.
    AllocateFloatingIp(Option<String>),
    /// `add_floating_ip`.
    AddFloatingIp {
        /// Target server.
        server_id: String,
        /// Address bound.
        address: String,
    },
    /// `remove_floating_ip`.
    RemoveFloatingIp {
        /// Server the address was bound to.
        server_id: String,
        /// Address unbound.
        address: String,
    },
    /// `deallocate_floating_ip` with the allocation id.
    DeallocateFloatingIp(String),
}

#[derive(Debug)]
struct BootScript {
    status: ServerStatus,
    vm_state: Option<String>,
    fault: Option<Fault>,
    addresses: BTreeMap<String, Vec<Address>>,
}

impl Default for BootScript {
    fn default() -> Self {
        Self {
            status: ServerStatus::Active,
            vm_state: Some(String::from("active")),
            fault: None,
            addresses: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Default)]
struct Failures {
    list_servers: Option<OpenstackError>,
    boot: Option<OpenstackError>,
    delete: Option<ActionResponse>,
    allocate: Option<OpenstackError>,
    attach: Option<OpenstackError>,
    detach: Option<OpenstackError>,
    deallocate: Option<OpenstackError>,
}

#[derive(Debug, Default)]
struct CloudState {
    networks: Vec<Network>,
    images: Vec<Image>,
    flavors: Vec<Flavor>,
    servers: Vec<Server>,
    floating_ips: Vec<FloatingIp>,
    boot: BootScript,
    failures: Failures,
    deletes_are_ignored: bool,
    sequence: u32,
    calls: Vec<ApiCall>,
}

impl CloudState {
    fn next_id(&mut self) -> u32 {
        self.sequence += 1;
        self.sequence
    }
}

/// In-memory cloud implementing [`ComputeApi`] with scripted failures.
///
/// Every call is recorded in order. Clones share state, so a test can keep
/// one handle for inspection while the session owns another.
#[derive(Clone, Debug, Default)]
pub struct ScriptedCompute {
    state: Arc<Mutex<CloudState>>,
}

impl ScriptedCompute {
    /// Creates an empty cloud where boots succeed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, CloudState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seeds the network catalogue.
    #[must_use]
    pub fn with_networks(self, networks: Vec<Network>) -> Self {
        self.state().networks = networks;
        self
    }

    /// Seeds the image catalogue.
    #[must_use]
    pub fn with_images(self, images: Vec<Image>) -> Self {
        self.state().images = images;
        self
    }

    /// Seeds the flavor catalogue.
    #[must_use]
    pub fn with_flavors(self, flavors: Vec<Flavor>) -> Self {
        self.state().flavors = flavors;
        self
    }

    /// Seeds existing servers.
    #[must_use]
    pub fn with_servers(self, servers: Vec<Server>) -> Self {
        self.state().servers = servers;
        self
    }

    /// Seeds a floating IP bound to `server_id`.
    #[must_use]
    pub fn with_bound_floating_ip(self, server_id: &str, address: &str) -> Self {
        {
            let mut state = self.state();
            let id = state.next_id();
            state.floating_ips.push(FloatingIp {
                id: format!("fip-{id}"),
                floating_ip_address: address.to_owned(),
                fixed_ip_address: Some(String::from("10.0.0.5")),
                instance_id: Some(server_id.to_owned()),
                pool: Some(String::from("public")),
            });
        }
        self
    }

    /// Status the next boot ends in.
    #[must_use]
    pub fn boot_ends_in(self, status: ServerStatus, vm_state: Option<&str>) -> Self {
        {
            let mut state = self.state();
            state.boot.status = status;
            state.boot.vm_state = vm_state.map(str::to_owned);
        }
        self
    }

    /// Fault reported by booted servers.
    #[must_use]
    pub fn boot_fault(self, fault: Fault) -> Self {
        self.state().boot.fault = Some(fault);
        self
    }

    /// Addresses reported by booted servers.
    #[must_use]
    pub fn boot_addresses(self, addresses: BTreeMap<String, Vec<Address>>) -> Self {
        self.state().boot.addresses = addresses;
        self
    }

    /// Makes submission itself fail.
    #[must_use]
    pub fn fail_boot(self, err: OpenstackError) -> Self {
        self.state().failures.boot = Some(err);
        self
    }

    /// Makes server listing fail.
    #[must_use]
    pub fn fail_list_servers(self, err: OpenstackError) -> Self {
        self.state().failures.list_servers = Some(err);
        self
    }

    /// Makes deletes come back refused with `code` and `text`.
    #[must_use]
    pub fn refuse_delete(self, code: u16, text: &str) -> Self {
        self.state().failures.delete = Some(ActionResponse::failure(code, text));
        self
    }

    /// Deletes succeed but the servers stay listed.
    #[must_use]
    pub fn ignore_deletes(self) -> Self {
        self.state().deletes_are_ignored = true;
        self
    }

    /// Makes floating IP allocation fail.
    #[must_use]
    pub fn fail_allocate(self, err: OpenstackError) -> Self {
        self.state().failures.allocate = Some(err);
        self
    }

    /// Makes floating IP attach fail.
    #[must_use]
    pub fn fail_attach(self, err: OpenstackError) -> Self {
        self.state().failures.attach = Some(err);
        self
    }

    /// Makes floating IP detach fail.
    #[must_use]
    pub fn fail_detach(self, err: OpenstackError) -> Self {
        self.state().failures.detach = Some(err);
        self
    }

    /// Makes floating IP deallocation fail.
    #[must_use]
    pub fn fail_deallocate(self, err: OpenstackError) -> Self {
        self.state().failures.deallocate = Some(err);
        self
    }

    /// Every call made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<ApiCall> {
        self.state().calls.clone()
    }

    /// Number of recorded calls matching `predicate`.
    #[must_use]
    pub fn count(&self, predicate: impl Fn(&ApiCall) -> bool) -> usize {
        self.state().calls.iter().filter(|call| predicate(call)).count()
    }

    /// Servers currently known to the cloud.
    #[must_use]
    pub fn servers(&self) -> Vec<Server> {
        self.state().servers.clone()
    }

    /// Floating IPs currently allocated.
    #[must_use]
    pub fn floating_ips(&self) -> Vec<FloatingIp> {
        self.state().floating_ips.clone()
    }

    fn record<T: Send + 'static>(
        &self,
        call: ApiCall,
        respond: impl FnOnce(&mut CloudState) -> Result<T, OpenstackError>,
    ) -> ApiFuture<'_, T> {
        let result = {
            let mut state = self.state();
            state.calls.push(call);
            respond(&mut state)
        };
        Box::pin(ready(result))
    }

    fn fail_or<T>(failure: Option<&OpenstackError>, value: T) -> Result<T, OpenstackError> {
        failure.map_or(Ok(value), |err| Err(err.clone()))
    }
}

impl ComputeApi for ScriptedCompute {
    fn list_networks(&self) -> ApiFuture<'_, Vec<Network>> {
        self.record(ApiCall::ListNetworks, |state| Ok(state.networks.clone()))
    }

    fn list_images(&self) -> ApiFuture<'_, Vec<Image>> {
        self.record(ApiCall::ListImages, |state| Ok(state.images.clone()))
    }

    fn list_flavors(&self) -> ApiFuture<'_, Vec<Flavor>> {
        self.record(ApiCall::ListFlavors, |state| Ok(state.flavors.clone()))
    }

    fn list_servers(&self) -> ApiFuture<'_, Vec<Server>> {
        self.record(ApiCall::ListServers, |state| {
            Self::fail_or(state.failures.list_servers.as_ref(), state.servers.clone())
        })
    }

    fn get_server<'a>(&'a self, id: &'a str) -> ApiFuture<'a, Option<Server>> {
        self.record(ApiCall::GetServer(id.to_owned()), |state| {
            Ok(state.servers.iter().find(|server| server.id == id).cloned())
        })
    }

    fn boot_and_wait_active<'a>(
        &'a self,
        request: &'a TaggedServerRequest,
        timeout: Duration,
    ) -> ApiFuture<'a, Server> {
        let submitted = request.request();
        let call = ApiCall::Boot {
            name: submitted.name.clone(),
            metadata: submitted.metadata.clone(),
            timeout,
        };
        self.record(call, |state| {
            if let Some(err) = &state.failures.boot {
                return Err(err.clone());
            }
            let id = state.next_id();
            let server = Server {
                id: format!("srv-{id}"),
                name: submitted.name.clone(),
                status: state.boot.status.clone(),
                vm_state: state.boot.vm_state.clone(),
                fault: state.boot.fault.clone(),
                metadata: submitted.metadata.clone(),
                addresses: state.boot.addresses.clone(),
            };
            state.servers.push(server.clone());
            Ok(server)
        })
    }

    fn delete_server<'a>(&'a self, id: &'a str) -> ApiFuture<'a, ActionResponse> {
        self.record(ApiCall::DeleteServer(id.to_owned()), |state| {
            if let Some(refusal) = &state.failures.delete {
                return Ok(refusal.clone());
            }
            if !state.deletes_are_ignored {
                state.servers.retain(|server| server.id != id);
            }
            Ok(ActionResponse::success(204))
        })
    }

    fn list_floating_ips(&self) -> ApiFuture<'_, Vec<FloatingIp>> {
        self.record(ApiCall::ListFloatingIps, |state| {
            Ok(state.floating_ips.clone())
        })
    }

    fn allocate_floating_ip<'a>(&'a self, pool: Option<&'a str>) -> ApiFuture<'a, FloatingIp> {
        self.record(
            ApiCall::AllocateFloatingIp(pool.map(str::to_owned)),
            |state| {
                if let Some(err) = &state.failures.allocate {
                    return Err(err.clone());
                }
                let id = state.next_id();
                let floating_ip = FloatingIp {
                    id: format!("fip-{id}"),
                    floating_ip_address: format!("203.0.113.{id}"),
                    fixed_ip_address: None,
                    instance_id: None,
                    pool: Some(pool.unwrap_or("public").to_owned()),
                };
                state.floating_ips.push(floating_ip.clone());
                Ok(floating_ip)
            },
        )
    }

    fn add_floating_ip<'a>(&'a self, server_id: &'a str, address: &'a str) -> ApiFuture<'a, ()> {
        let call = ApiCall::AddFloatingIp {
            server_id: server_id.to_owned(),
            address: address.to_owned(),
        };
        self.record(call, |state| {
            Self::fail_or(state.failures.attach.as_ref(), ())?;
            for ip in &mut state.floating_ips {
                if ip.floating_ip_address == address {
                    ip.instance_id = Some(server_id.to_owned());
                }
            }
            Ok(())
        })
    }

    fn remove_floating_ip<'a>(
        &'a self,
        server_id: &'a str,
        address: &'a str,
    ) -> ApiFuture<'a, ()> {
        let call = ApiCall::RemoveFloatingIp {
            server_id: server_id.to_owned(),
            address: address.to_owned(),
        };
        self.record(call, |state| {
            Self::fail_or(state.failures.detach.as_ref(), ())?;
            for ip in &mut state.floating_ips {
                if ip.floating_ip_address == address {
                    ip.instance_id = None;
                    ip.fixed_ip_address = None;
                }
            }
            Ok(())
        })
    }

    fn deallocate_floating_ip<'a>(&'a self, id: &'a str) -> ApiFuture<'a, ()> {
        self.record(ApiCall::DeallocateFloatingIp(id.to_owned()), |state| {
            Self::fail_or(state.failures.deallocate.as_ref(), ())?;
            state.floating_ips.retain(|ip| ip.id != id);
            Ok(())
        })
    }
}

/// Server snapshot carrying `marker` under the ownership key.
#[must_use]
pub fn server_owned_by(id: &str, status: ServerStatus, marker: Option<&str>) -> Server {
    let mut server = Server::new(id, format!("agent-{id}"), status);
    if let Some(value) = marker {
        server
            .metadata
            .insert(FINGERPRINT_KEY.to_owned(), value.to_owned());
    }
    server
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: AsyncMutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
