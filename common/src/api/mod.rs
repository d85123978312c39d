// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Data structures and related facilities for representing VIM resources
//!
//! These are the shapes that cross the invocation boundary in both
//! directions.  They are all transport-agnostic; see [`invocation`] for the
//! envelopes that carry them.  Every value is constructed fresh per response
//! and never mutated after it has been returned.

pub mod error;
pub mod invocation;

pub use error::Error;
pub use error::Fault;
pub use error::FaultKind;
pub use invocation::InvocationRequest;
pub use invocation::InvocationResponse;
pub use invocation::InvocationStatus;
pub use invocation::PluginIdentity;
pub use invocation::PluginRegistration;
pub use invocation::VimInstance;

use chrono::DateTime;
use chrono::Utc;
use oxnet::Ipv4Net;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use std::fmt;
use std::net::IpAddr;
use std::net::Ipv4Addr;

// The type aliases below exist primarily to ensure consistency among return
// types for the driver contract methods.

/// Result of a create operation for the specified type
pub type CreateResult<T> = Result<T, Error>;
/// Result of a delete operation: `true` whether the target was deleted or was
/// already absent
pub type DeleteResult = Result<bool, Error>;
/// Result of a list operation that returns a vector
pub type ListResultVec<T> = Result<Vec<T>, Error>;
/// Result of a lookup operation for the specified type
pub type LookupResult<T> = Result<T, Error>;
/// Result of an update operation for the specified type
pub type UpdateResult<T> = Result<T, Error>;

/// A layer-2/3 network known to the VIM
///
/// `external_id` is assigned by the VIM on creation and is unique within a
/// tenant; requests that create a network may leave it empty.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    pub name: String,
    #[serde(default)]
    pub external_id: String,
    #[serde(default)]
    pub subnets: Vec<Subnet>,
}

/// An IPv4 address range allocated within a [`Network`]
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Subnet {
    pub name: String,
    /// Address range in CIDR notation
    pub cidr: Ipv4Net,
    #[serde(default)]
    pub external_id: String,
    /// Gateway for the range; must lie inside `cidr` when present
    #[serde(default)]
    pub gateway_ip: Option<Ipv4Addr>,
}

impl Subnet {
    /// Checks the gateway-inside-range invariant, describing the violation if
    /// there is one.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(gateway_ip) = self.gateway_ip {
            if !self.cidr.contains(gateway_ip) {
                return Err(format!(
                    "gatewayIp {} lies outside cidr {}",
                    gateway_ip, self.cidr
                ));
            }
        }
        Ok(())
    }
}

/// A virtual machine image in the VIM's catalogue
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NfvImage {
    #[serde(default)]
    pub external_id: String,
    pub name: String,
    #[serde(default)]
    pub container_format: String,
    #[serde(default)]
    pub disk_format: String,
    /// Minimum memory required to boot the image, in MB
    #[serde(default)]
    pub min_ram: u64,
    #[serde(default)]
    pub min_cpu: u32,
    /// Minimum disk required to boot the image, in GB
    #[serde(default)]
    pub min_disk_space: u64,
    #[serde(default)]
    pub is_public: bool,
    /// Set by the VIM when the image enters the catalogue; absent until then
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
}

/// A compute sizing template
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentFlavour {
    pub flavour_key: String,
    #[serde(default)]
    pub external_id: String,
    /// Memory in MB
    #[serde(default)]
    pub ram: u64,
    /// Disk in GB
    #[serde(default)]
    pub disk: u64,
    #[serde(default)]
    pub vcpu: u32,
}

/// Per-tenant resource ceilings, as reported by the VIM
///
/// Read-only from the plugin's perspective: reported, never enforced here.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Quota {
    pub tenant: String,
    pub cores: u64,
    #[serde(rename = "floatingIps")]
    pub floating_ips: u64,
    pub instances: u64,
    pub keypairs: u64,
    pub ram: u64,
}

/// A compute instance
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Server {
    pub name: String,
    pub external_id: String,
    pub created: DateTime<Utc>,
    pub extended_status: ServerStatus,
    /// Snapshot of the flavour the instance was launched with
    pub flavor: DeploymentFlavour,
    pub ips: Vec<IpAddr>,
    #[serde(default)]
    pub floating_ips: Vec<IpAddr>,
}

/// Coarse lifecycle status reported for a [`Server`]
#[derive(
    Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServerStatus {
    /// The VIM is still provisioning the instance.
    Build,
    /// The instance is up.
    Active,
    /// The VIM reported a provisioning or runtime failure.
    Error,
    /// The instance has been removed from the VIM.
    Deleted,
}

impl ServerStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ServerStatus::Build => "BUILD",
            ServerStatus::Active => "ACTIVE",
            ServerStatus::Error => "ERROR",
            ServerStatus::Deleted => "DELETED",
        }
    }

    /// Returns whether no further transitions are expected from the VIM.
    pub fn is_terminal(&self) -> bool {
        match self {
            ServerStatus::Build => false,
            ServerStatus::Active
            | ServerStatus::Error
            | ServerStatus::Deleted => true,
        }
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Key material injected into an instance at launch
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SshKey {
    pub name: String,
    pub public_key: String,
}

#[cfg(test)]
mod test {
    use super::Network;
    use super::ServerStatus;
    use super::Subnet;

    #[test]
    fn test_subnet_gateway_inside_cidr() {
        let mut subnet = Subnet {
            name: "net1_subnet".to_string(),
            cidr: "192.168.1.0/24".parse().unwrap(),
            external_id: "sub-1".to_string(),
            gateway_ip: Some("192.168.1.1".parse().unwrap()),
        };
        assert_eq!(Ok(()), subnet.validate());

        // No gateway at all is fine.
        subnet.gateway_ip = None;
        assert_eq!(Ok(()), subnet.validate());

        subnet.gateway_ip = Some("10.0.0.1".parse().unwrap());
        let message = subnet.validate().unwrap_err();
        assert!(message.contains("10.0.0.1"), "message was {:?}", message);
        assert!(
            message.contains("192.168.1.0/24"),
            "message was {:?}",
            message
        );
    }

    #[test]
    fn test_network_accepts_sparse_input() {
        // Requests that create a network can carry just a name; everything
        // else defaults.
        let network: Network =
            serde_json::from_str(r#"{"name": "net1"}"#).unwrap();
        assert_eq!(network.name, "net1");
        assert_eq!(network.external_id, "");
        assert!(network.subnets.is_empty());
    }

    #[test]
    fn test_server_status_wire_form() {
        assert_eq!(
            serde_json::to_string(&ServerStatus::Active).unwrap(),
            r#""ACTIVE""#
        );
        let status: ServerStatus = serde_json::from_str(r#""BUILD""#).unwrap();
        assert_eq!(status, ServerStatus::Build);
        assert_eq!(status.label(), "BUILD");
        assert!(!status.is_terminal());
        assert!(ServerStatus::Error.is_terminal());
    }
}
