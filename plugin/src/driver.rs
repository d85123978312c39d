// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The capability contract between the plugin runtime and a VIM backend

use async_trait::async_trait;
use std::collections::BTreeMap;
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
use vimdriver_common::api::SshKey;
use vimdriver_common::api::Subnet;
use vimdriver_common::api::UpdateResult;
use vimdriver_common::api::VimInstance;

/// Everything needed to launch one compute instance
///
/// The orchestrator sends these as positional arguments on the wire; the
/// dispatcher folds them into this struct before they reach a driver.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LaunchSpec {
    /// Name for the new server
    pub name: String,
    /// External id of the boot image
    pub image_ext_id: String,
    /// External id of the deployment flavour to size the server with
    pub flavour_ext_id: String,
    /// Name of the keypair to install
    pub keypair: String,
    /// External ids of the networks to attach
    pub network_ext_ids: Vec<String>,
    /// Security groups to place the server in
    pub security_groups: Vec<String>,
    /// Cloud-init user data passed through to the backend
    pub user_data: String,
    /// Floating ips to associate, keyed by private network name
    pub floating_ips: BTreeMap<String, String>,
    /// Additional SSH keys to authorize on the server
    pub keys: Vec<SshKey>,
}

/// Operations a VIM driver must provide
///
/// One implementation of this trait drives one kind of VIM (OpenStack,
/// a test double, etc.).  The runtime shares a single driver value across
/// all workers, so implementations must be internally synchronized.
///
/// Drivers report failures through [`Error`]; the dispatcher turns those
/// into fault envelopes, so implementations should pick the variant whose
/// retryability matches the condition (see [`Error::retryable`]).
#[async_trait]
pub trait VimDriver: Send + Sync + 'static {
    // Network operations

    async fn list_networks(&self, vim: &VimInstance)
        -> ListResultVec<Network>;

    async fn get_network_by_id(
        &self,
        vim: &VimInstance,
        ext_id: &str,
    ) -> LookupResult<Network>;

    /// Create `network` on the VIM, returning it with `external_id` (and the
    /// external ids of any subnets created along with it) filled in.
    async fn create_network(
        &self,
        vim: &VimInstance,
        network: Network,
    ) -> CreateResult<Network>;

    async fn update_network(
        &self,
        vim: &VimInstance,
        network: Network,
    ) -> UpdateResult<Network>;

    /// Delete the network with `ext_id`, returning whether it is gone
    /// afterwards.  Deleting an unknown id is not an error.
    async fn delete_network(
        &self,
        vim: &VimInstance,
        ext_id: &str,
    ) -> DeleteResult;

    /// External ids of the subnets attached to the given network
    async fn get_subnets_ext_ids(
        &self,
        vim: &VimInstance,
        network_ext_id: &str,
    ) -> ListResultVec<String>;

    async fn create_subnet(
        &self,
        vim: &VimInstance,
        network: Network,
        subnet: Subnet,
    ) -> CreateResult<Subnet>;

    async fn update_subnet(
        &self,
        vim: &VimInstance,
        network: Network,
        subnet: Subnet,
    ) -> UpdateResult<Subnet>;

    async fn delete_subnet(
        &self,
        vim: &VimInstance,
        subnet_ext_id: &str,
    ) -> DeleteResult;

    // Image operations

    async fn list_images(&self, vim: &VimInstance) -> ListResultVec<NfvImage>;

    /// Upload `bytes` as the content of a new image described by `image`
    async fn copy_image(
        &self,
        vim: &VimInstance,
        image: NfvImage,
        bytes: Vec<u8>,
    ) -> CreateResult<NfvImage>;

    /// Register a new image whose content the VIM fetches from `image_url`
    async fn add_image(
        &self,
        vim: &VimInstance,
        image: NfvImage,
        image_url: &str,
    ) -> CreateResult<NfvImage>;

    async fn update_image(
        &self,
        vim: &VimInstance,
        image: NfvImage,
    ) -> UpdateResult<NfvImage>;

    async fn delete_image(
        &self,
        vim: &VimInstance,
        image: NfvImage,
    ) -> DeleteResult;

    // Deployment flavour operations

    async fn list_flavors(
        &self,
        vim: &VimInstance,
    ) -> ListResultVec<DeploymentFlavour>;

    async fn add_flavor(
        &self,
        vim: &VimInstance,
        flavour: DeploymentFlavour,
    ) -> CreateResult<DeploymentFlavour>;

    async fn update_flavor(
        &self,
        vim: &VimInstance,
        flavour: DeploymentFlavour,
    ) -> UpdateResult<DeploymentFlavour>;

    async fn delete_flavor(
        &self,
        vim: &VimInstance,
        ext_id: &str,
    ) -> DeleteResult;

    // Compute operations

    async fn list_server(&self, vim: &VimInstance) -> ListResultVec<Server>;

    /// Start a server and return immediately with its initial (typically
    /// still-building) state.
    async fn launch_instance(
        &self,
        vim: &VimInstance,
        spec: LaunchSpec,
    ) -> CreateResult<Server>;

    /// Start a server and block until it reaches a terminal status or the
    /// driver's wait deadline passes, whichever comes first.
    async fn launch_instance_and_wait(
        &self,
        vim: &VimInstance,
        spec: LaunchSpec,
    ) -> CreateResult<Server>;

    /// Delete the server with `ext_id` and block until the VIM has finished
    /// tearing it down or the driver's wait deadline passes.
    async fn delete_server_by_id_and_wait(
        &self,
        vim: &VimInstance,
        ext_id: &str,
    ) -> Result<(), Error>;

    // Quota operations

    /// Remaining resource quota for the tenant named in `vim`
    async fn get_quota(&self, vim: &VimInstance) -> LookupResult<Quota>;

    // Identity

    /// The VIM type this driver can talk to
    fn get_type(&self, vim: &VimInstance) -> String;
}
