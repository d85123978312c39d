// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Simulated VIM driver
//!
//! All state lives in memory, seeded with the fixtures orchestrator test
//! rigs expect: ten networks, ten images, and the five `m1.*` flavours.
//! Server lifecycle transitions settle after a configurable delay so tests
//! can exercise the wait variants, and tests can inject faults, stalls, and
//! panics to drive the runtime's failure paths.

use async_trait::async_trait;
use chrono::Utc;
use slog::Logger;
use std::net::IpAddr;
use std::net::Ipv4Addr;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;
use vimdriver_common::api::CreateResult;
use vimdriver_common::api::DeleteResult;
use vimdriver_common::api::DeploymentFlavour;
use vimdriver_common::api::Error;
use vimdriver_common::api::ListResultVec;
use vimdriver_common::api::LookupResult;
use vimdriver_common::api::Network;
use vimdriver_common::api::NfvImage;
use vimdriver_common::api::Quota;
use vimdriver_common::api::Server;
use vimdriver_common::api::ServerStatus;
use vimdriver_common::api::Subnet;
use vimdriver_common::api::UpdateResult;
use vimdriver_common::api::VimInstance;

use crate::dispatch::Operation;
use crate::driver::LaunchSpec;
use crate::driver::VimDriver;
use crate::wait;
use crate::wait::WaitPolicy;

/// Where the simulated driver gets external ids from
///
/// The daemon uses random uuids; tests inject a counter so the ids coming
/// back are predictable.
pub trait IdSource: Send + Sync + 'static {
    fn next(&self, kind: &str) -> String;
}

/// Sequential ids of the form `<kind>_id_<n>`
pub struct CounterIds {
    next: AtomicU64,
}

impl CounterIds {
    /// Counter whose first id uses `first`, so tests can start numbering
    /// above the seeded fixtures.
    pub fn starting_at(first: u64) -> CounterIds {
        CounterIds { next: AtomicU64::new(first) }
    }
}

impl IdSource for CounterIds {
    fn next(&self, kind: &str) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{kind}_id_{n}")
    }
}

/// Random uuids, the way a real backend hands out ids
pub struct UuidIds;

impl IdSource for UuidIds {
    fn next(&self, _kind: &str) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Tunables for the simulated driver
#[derive(Clone, Debug)]
pub struct SimDriverConfig {
    /// Polling bounds the wait variants run with
    pub wait: WaitPolicy,
    /// How long a server stays in its transitional state before settling
    pub settle_after: Duration,
    /// Status a launched server settles into, or `None` to leave it
    /// building forever
    pub launch_target: Option<ServerStatus>,
}

impl Default for SimDriverConfig {
    fn default() -> SimDriverConfig {
        SimDriverConfig {
            wait: WaitPolicy::default(),
            settle_after: Duration::ZERO,
            launch_target: Some(ServerStatus::Active),
        }
    }
}

struct SimServer {
    server: Server,
    /// When the pending transition (if any) takes effect
    settle_at: Instant,
    target: Option<ServerStatus>,
}

#[derive(Default)]
struct SimState {
    networks: Vec<Network>,
    images: Vec<NfvImage>,
    flavours: Vec<DeploymentFlavour>,
    servers: Vec<SimServer>,
    fail_next: Option<Error>,
    panic_next: bool,
    stall_next: bool,
}

impl SimState {
    fn seeded() -> SimState {
        let networks = (1..=10)
            .map(|i| {
                let name = format!("net_name_{i}");
                Network {
                    name: name.clone(),
                    external_id: format!("net_id_{i}"),
                    subnets: vec![Subnet {
                        name: format!("{name}_subnet"),
                        cidr: "192.168.1.0/24".parse().unwrap(),
                        external_id: format!("subnet_id_{i}"),
                        gateway_ip: Some(Ipv4Addr::new(192, 168, 1, 1)),
                    }],
                }
            })
            .collect();

        let images = (1..=10)
            .map(|i| NfvImage {
                external_id: format!("img_id_{i}"),
                name: format!("img_name_{i}"),
                container_format: String::from("BARE"),
                disk_format: String::from("QCOW2"),
                min_ram: 512,
                min_cpu: 1,
                min_disk_space: 2,
                is_public: true,
                created: Some(Utc::now()),
            })
            .collect();

        let flavours = ["m1.tiny", "m1.small", "m1.medium", "m1.large",
            "m1.xlarge"]
            .iter()
            .enumerate()
            .map(|(i, key)| DeploymentFlavour {
                flavour_key: String::from(*key),
                external_id: format!("flavor_id_{}", i + 1),
                ram: 2048,
                disk: 100,
                vcpu: 4,
            })
            .collect();

        SimState { networks, images, flavours, ..Default::default() }
    }

    /// Apply any server transitions whose settle time has passed
    fn settle(&mut self, now: Instant) {
        for sim in &mut self.servers {
            if let Some(target) = sim.target {
                if now >= sim.settle_at {
                    sim.server.extended_status = target;
                    sim.target = None;
                }
            }
        }
        // Servers that finished deleting disappear from listings.
        self.servers
            .retain(|sim| sim.server.extended_status != ServerStatus::Deleted);
    }
}

enum Injected {
    Fail(Error),
    Panic,
    Stall,
}

/// Simulated VIM driver backed by in-memory fixtures
pub struct SimDriver {
    config: SimDriverConfig,
    ids: Box<dyn IdSource>,
    state: Mutex<SimState>,
    log: Logger,
}

impl SimDriver {
    pub fn new(
        config: SimDriverConfig,
        ids: Box<dyn IdSource>,
        log: &Logger,
    ) -> SimDriver {
        let log = log.new(o!("component" => "SimDriver"));
        info!(log, "created simulated VIM driver";
            "settle_after" => ?config.settle_after);
        SimDriver { config, ids, state: Mutex::new(SimState::seeded()), log }
    }

    /// Simulated driver with random ids and instantaneous transitions
    pub fn new_default(log: &Logger) -> SimDriver {
        SimDriver::new(SimDriverConfig::default(), Box::new(UuidIds), log)
    }

    /// Fail the next operation with `error`
    pub fn fail_next(&self, error: Error) {
        self.state.lock().unwrap().fail_next = Some(error);
    }

    /// Panic partway through the next operation, as a buggy driver would
    pub fn panic_next(&self) {
        self.state.lock().unwrap().panic_next = true;
    }

    /// Block the next operation until its task is cancelled
    pub fn stall_next(&self) {
        self.state.lock().unwrap().stall_next = true;
    }

    /// Apply any injected behavior before the operation touches real state
    async fn preflight(&self, operation: Operation) -> Result<(), Error> {
        let injected = {
            let mut state = self.state.lock().unwrap();
            if state.panic_next {
                state.panic_next = false;
                Some(Injected::Panic)
            } else if state.stall_next {
                state.stall_next = false;
                Some(Injected::Stall)
            } else {
                state.fail_next.take().map(Injected::Fail)
            }
        };
        match injected {
            None => Ok(()),
            Some(Injected::Fail(error)) => {
                info!(self.log, "failing operation with injected fault";
                    "operation" => %operation, "error" => %error);
                Err(error)
            }
            Some(Injected::Panic) => {
                panic!("injected panic in simulated driver ({operation})");
            }
            Some(Injected::Stall) => {
                info!(self.log, "stalling operation until cancelled";
                    "operation" => %operation);
                std::future::pending::<Result<(), Error>>().await
            }
        }
    }
}

#[async_trait]
impl VimDriver for SimDriver {
    async fn list_networks(
        &self,
        _vim: &VimInstance,
    ) -> ListResultVec<Network> {
        self.preflight(Operation::ListNetworks).await?;
        Ok(self.state.lock().unwrap().networks.clone())
    }

    async fn get_network_by_id(
        &self,
        _vim: &VimInstance,
        ext_id: &str,
    ) -> LookupResult<Network> {
        self.preflight(Operation::GetNetworkById).await?;
        self.state
            .lock()
            .unwrap()
            .networks
            .iter()
            .find(|n| n.external_id == ext_id)
            .cloned()
            .ok_or_else(|| Error::not_found(&format!("network \"{ext_id}\"")))
    }

    async fn create_network(
        &self,
        _vim: &VimInstance,
        mut network: Network,
    ) -> CreateResult<Network> {
        self.preflight(Operation::CreateNetwork).await?;
        network.external_id = self.ids.next("net");
        if network.subnets.is_empty() {
            // A network is not usable without a subnet, so the backend
            // provisions a default one.
            network.subnets.push(Subnet {
                name: format!("{}_subnet", network.name),
                cidr: "192.168.1.0/24".parse().unwrap(),
                external_id: self.ids.next("subnet"),
                gateway_ip: Some(Ipv4Addr::new(192, 168, 1, 1)),
            });
        } else {
            for subnet in &mut network.subnets {
                if subnet.external_id.is_empty() {
                    subnet.external_id = self.ids.next("subnet");
                }
            }
        }
        debug!(self.log, "created network";
            "name" => &network.name, "ext_id" => &network.external_id);
        self.state.lock().unwrap().networks.push(network.clone());
        Ok(network)
    }

    async fn update_network(
        &self,
        _vim: &VimInstance,
        network: Network,
    ) -> UpdateResult<Network> {
        self.preflight(Operation::UpdateNetwork).await?;
        let mut state = self.state.lock().unwrap();
        let Some(existing) = state
            .networks
            .iter_mut()
            .find(|n| n.external_id == network.external_id)
        else {
            return Err(Error::not_found(&format!(
                "network \"{}\"",
                network.external_id
            )));
        };
        *existing = network.clone();
        Ok(network)
    }

    async fn delete_network(
        &self,
        _vim: &VimInstance,
        ext_id: &str,
    ) -> DeleteResult {
        self.preflight(Operation::DeleteNetwork).await?;
        let mut state = self.state.lock().unwrap();
        let before = state.networks.len();
        state.networks.retain(|n| n.external_id != ext_id);
        debug!(self.log, "deleted network"; "ext_id" => ext_id,
            "existed" => state.networks.len() != before);
        // Deleting an id that is already gone still reports the network
        // as gone.
        Ok(true)
    }

    async fn get_subnets_ext_ids(
        &self,
        _vim: &VimInstance,
        network_ext_id: &str,
    ) -> ListResultVec<String> {
        self.preflight(Operation::GetSubnetsExtIds).await?;
        let state = self.state.lock().unwrap();
        match state.networks.iter().find(|n| n.external_id == network_ext_id)
        {
            Some(network) => Ok(network
                .subnets
                .iter()
                .map(|s| s.external_id.clone())
                .collect()),
            // Unknown networks report a fixed set of subnet ids, which keeps
            // orchestrator rigs that invent network ids working.
            None => Ok((1..=9).map(|i| format!("ext_id_{i}")).collect()),
        }
    }

    async fn create_subnet(
        &self,
        _vim: &VimInstance,
        network: Network,
        mut subnet: Subnet,
    ) -> CreateResult<Subnet> {
        self.preflight(Operation::CreateSubnet).await?;
        subnet.external_id = self.ids.next("subnet");
        let mut state = self.state.lock().unwrap();
        let Some(existing) = state
            .networks
            .iter_mut()
            .find(|n| n.external_id == network.external_id)
        else {
            return Err(Error::not_found(&format!(
                "network \"{}\"",
                network.external_id
            )));
        };
        existing.subnets.push(subnet.clone());
        Ok(subnet)
    }

    async fn update_subnet(
        &self,
        _vim: &VimInstance,
        network: Network,
        subnet: Subnet,
    ) -> UpdateResult<Subnet> {
        self.preflight(Operation::UpdateSubnet).await?;
        let mut state = self.state.lock().unwrap();
        let Some(parent) = state
            .networks
            .iter_mut()
            .find(|n| n.external_id == network.external_id)
        else {
            return Err(Error::not_found(&format!(
                "network \"{}\"",
                network.external_id
            )));
        };
        let Some(existing) = parent
            .subnets
            .iter_mut()
            .find(|s| s.external_id == subnet.external_id)
        else {
            return Err(Error::not_found(&format!(
                "subnet \"{}\"",
                subnet.external_id
            )));
        };
        *existing = subnet.clone();
        Ok(subnet)
    }

    async fn delete_subnet(
        &self,
        _vim: &VimInstance,
        subnet_ext_id: &str,
    ) -> DeleteResult {
        self.preflight(Operation::DeleteSubnet).await?;
        let mut state = self.state.lock().unwrap();
        for network in &mut state.networks {
            network.subnets.retain(|s| s.external_id != subnet_ext_id);
        }
        Ok(true)
    }

    async fn list_images(&self, _vim: &VimInstance) -> ListResultVec<NfvImage> {
        self.preflight(Operation::ListImages).await?;
        Ok(self.state.lock().unwrap().images.clone())
    }

    async fn copy_image(
        &self,
        _vim: &VimInstance,
        mut image: NfvImage,
        bytes: Vec<u8>,
    ) -> CreateResult<NfvImage> {
        self.preflight(Operation::CopyImage).await?;
        image.external_id = self.ids.next("img");
        debug!(self.log, "copied image";
            "name" => &image.name,
            "ext_id" => &image.external_id,
            "content_bytes" => bytes.len(),
        );
        self.state.lock().unwrap().images.push(image.clone());
        Ok(image)
    }

    async fn add_image(
        &self,
        _vim: &VimInstance,
        mut image: NfvImage,
        image_url: &str,
    ) -> CreateResult<NfvImage> {
        self.preflight(Operation::AddImage).await?;
        image.external_id = self.ids.next("img");
        debug!(self.log, "added image";
            "name" => &image.name,
            "ext_id" => &image.external_id,
            "url" => image_url,
        );
        self.state.lock().unwrap().images.push(image.clone());
        Ok(image)
    }

    async fn update_image(
        &self,
        _vim: &VimInstance,
        image: NfvImage,
    ) -> UpdateResult<NfvImage> {
        self.preflight(Operation::UpdateImage).await?;
        let mut state = self.state.lock().unwrap();
        let Some(existing) = state
            .images
            .iter_mut()
            .find(|i| i.external_id == image.external_id)
        else {
            return Err(Error::not_found(&format!(
                "image \"{}\"",
                image.external_id
            )));
        };
        *existing = image.clone();
        Ok(image)
    }

    async fn delete_image(
        &self,
        _vim: &VimInstance,
        image: NfvImage,
    ) -> DeleteResult {
        self.preflight(Operation::DeleteImage).await?;
        let mut state = self.state.lock().unwrap();
        state.images.retain(|i| i.external_id != image.external_id);
        Ok(true)
    }

    async fn list_flavors(
        &self,
        _vim: &VimInstance,
    ) -> ListResultVec<DeploymentFlavour> {
        self.preflight(Operation::ListFlavors).await?;
        Ok(self.state.lock().unwrap().flavours.clone())
    }

    async fn add_flavor(
        &self,
        _vim: &VimInstance,
        mut flavour: DeploymentFlavour,
    ) -> CreateResult<DeploymentFlavour> {
        self.preflight(Operation::AddFlavor).await?;
        if flavour.external_id.is_empty() {
            flavour.external_id = self.ids.next("flavor");
        }
        self.state.lock().unwrap().flavours.push(flavour.clone());
        Ok(flavour)
    }

    async fn update_flavor(
        &self,
        _vim: &VimInstance,
        flavour: DeploymentFlavour,
    ) -> UpdateResult<DeploymentFlavour> {
        self.preflight(Operation::UpdateFlavor).await?;
        let mut state = self.state.lock().unwrap();
        let Some(existing) = state
            .flavours
            .iter_mut()
            .find(|f| f.external_id == flavour.external_id)
        else {
            return Err(Error::not_found(&format!(
                "flavour \"{}\"",
                flavour.external_id
            )));
        };
        *existing = flavour.clone();
        Ok(flavour)
    }

    async fn delete_flavor(
        &self,
        _vim: &VimInstance,
        ext_id: &str,
    ) -> DeleteResult {
        self.preflight(Operation::DeleteFlavor).await?;
        let mut state = self.state.lock().unwrap();
        state.flavours.retain(|f| f.external_id != ext_id);
        Ok(true)
    }

    async fn list_server(&self, _vim: &VimInstance) -> ListResultVec<Server> {
        self.preflight(Operation::ListServer).await?;
        let mut state = self.state.lock().unwrap();
        state.settle(Instant::now());
        Ok(state.servers.iter().map(|sim| sim.server.clone()).collect())
    }

    async fn launch_instance(
        &self,
        _vim: &VimInstance,
        spec: LaunchSpec,
    ) -> CreateResult<Server> {
        self.preflight(Operation::LaunchInstance).await?;
        let mut state = self.state.lock().unwrap();
        let flavour = state
            .flavours
            .iter()
            .find(|f| {
                f.external_id == spec.flavour_ext_id
                    || f.flavour_key == spec.flavour_ext_id
            })
            .cloned()
            .ok_or_else(|| {
                Error::not_found(&format!(
                    "flavour \"{}\"",
                    spec.flavour_ext_id
                ))
            })?;
        if !state.images.iter().any(|i| {
            i.external_id == spec.image_ext_id || i.name == spec.image_ext_id
        }) {
            return Err(Error::not_found(&format!(
                "image \"{}\"",
                spec.image_ext_id
            )));
        }

        let server = Server {
            name: spec.name.clone(),
            external_id: self.ids.next("server"),
            created: Utc::now(),
            extended_status: ServerStatus::Build,
            flavor: flavour,
            ips: vec![IpAddr::V4(Ipv4Addr::new(192, 168, 1, 2))],
            floating_ips: spec
                .floating_ips
                .values()
                .filter_map(|ip| ip.parse().ok())
                .collect(),
        };
        state.servers.push(SimServer {
            server: server.clone(),
            settle_at: Instant::now() + self.config.settle_after,
            target: self.config.launch_target,
        });
        debug!(self.log, "launched server";
            "name" => &server.name, "ext_id" => &server.external_id);
        Ok(server)
    }

    async fn launch_instance_and_wait(
        &self,
        vim: &VimInstance,
        spec: LaunchSpec,
    ) -> CreateResult<Server> {
        let launched = self.launch_instance(vim, spec).await?;
        wait::wait_for_server_status(
            self,
            vim,
            &launched.external_id,
            &self.config.wait,
        )
        .await
    }

    async fn delete_server_by_id_and_wait(
        &self,
        vim: &VimInstance,
        ext_id: &str,
    ) -> Result<(), Error> {
        self.preflight(Operation::DeleteServerByIdAndWait).await?;
        {
            let mut state = self.state.lock().unwrap();
            state.settle(Instant::now());
            let Some(sim) = state
                .servers
                .iter_mut()
                .find(|s| s.server.external_id == ext_id)
            else {
                // Deleting a server that is already gone is not an error.
                return Ok(());
            };
            sim.settle_at = Instant::now() + self.config.settle_after;
            sim.target = Some(ServerStatus::Deleted);
        }
        wait::wait_for_server_gone(self, vim, ext_id, &self.config.wait).await
    }

    async fn get_quota(&self, vim: &VimInstance) -> LookupResult<Quota> {
        self.preflight(Operation::GetQuota).await?;
        Ok(Quota {
            tenant: vim.tenant.clone(),
            cores: 1000,
            floating_ips: 1000,
            instances: 1000,
            keypairs: 1000,
            ram: 100_000,
        })
    }

    fn get_type(&self, _vim: &VimInstance) -> String {
        String::from("test")
    }
}
