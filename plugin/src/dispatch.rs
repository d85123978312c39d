// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Stateless mapping from invocation envelopes to driver calls
//!
//! The orchestrator addresses operations by their wire name and passes
//! arguments positionally, as a JSON array.  [`dispatch`] parses the
//! operation, decodes each argument into the driver's native types, invokes
//! the driver, and folds the outcome (result or fault) back into a response
//! envelope carrying the request's correlation id.

use base64::Engine;
use parse_display::Display;
use parse_display::FromStr;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use strum::{EnumIter, IntoEnumIterator};
use vimdriver_common::api::DeploymentFlavour;
use vimdriver_common::api::Error;
use vimdriver_common::api::InvocationRequest;
use vimdriver_common::api::InvocationResponse;
use vimdriver_common::api::Network;
use vimdriver_common::api::NfvImage;
use vimdriver_common::api::Subnet;

use crate::driver::LaunchSpec;
use crate::driver::VimDriver;

/// The closed set of operations a driver can be asked to perform
///
/// Wire names are the camelCase renderings of the variant names; anything
/// else in a request's `operation` field is an unsupported-operation fault,
/// never a crash.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, FromStr, EnumIter)]
#[display(style = "camelCase")]
pub enum Operation {
    // Network operations
    ListNetworks,
    GetNetworkById,
    CreateNetwork,
    UpdateNetwork,
    DeleteNetwork,
    GetSubnetsExtIds,
    CreateSubnet,
    UpdateSubnet,
    DeleteSubnet,

    // Image operations
    ListImages,
    CopyImage,
    AddImage,
    UpdateImage,
    DeleteImage,

    // Deployment flavour operations
    ListFlavors,
    AddFlavor,
    UpdateFlavor,
    DeleteFlavor,

    // Compute operations
    ListServer,
    LaunchInstance,
    LaunchInstanceAndWait,
    DeleteServerByIdAndWait,

    // Quota and identity operations
    GetQuota,
    GetType,
}

impl Operation {
    /// Returns an iterator over all the variants in this enum.
    ///
    /// This is provided as a helper so dependent packages don't have to pull
    /// in strum explicitly.
    pub fn iter() -> OperationIter {
        <Self as IntoEnumIterator>::iter()
    }
}

/// Positional-argument reader for one invocation
///
/// Each operation consumes the argument array in a fixed order.  The cursor
/// tracks position so decode failures can name both the index and the
/// parameter involved.
struct ArgCursor<'a> {
    operation: Operation,
    arguments: &'a [Value],
    next: usize,
}

impl<'a> ArgCursor<'a> {
    fn new(operation: Operation, arguments: &'a [Value]) -> ArgCursor<'a> {
        ArgCursor { operation, arguments, next: 0 }
    }

    fn invalid(&self, message: &str) -> Error {
        Error::invalid_args(&self.operation.to_string(), message)
    }

    /// Decode the next argument as a `T`
    fn take<T: DeserializeOwned>(&mut self, name: &str) -> Result<T, Error> {
        let index = self.next;
        let Some(value) = self.arguments.get(index) else {
            return Err(
                self.invalid(&format!("missing argument {index} ({name})"))
            );
        };
        self.next += 1;
        serde_json::from_value(value.clone()).map_err(|err| {
            self.invalid(&format!("argument {index} ({name}): {err}"))
        })
    }

    /// Decode the next argument as a `T`, treating an absent or null trailing
    /// argument as `None`
    fn take_optional<T: DeserializeOwned>(
        &mut self,
        name: &str,
    ) -> Result<Option<T>, Error> {
        match self.arguments.get(self.next) {
            None => Ok(None),
            Some(Value::Null) => {
                self.next += 1;
                Ok(None)
            }
            Some(_) => self.take(name).map(Some),
        }
    }

    /// Decode the next argument as base64-encoded bytes
    fn take_bytes(&mut self, name: &str) -> Result<Vec<u8>, Error> {
        let index = self.next;
        let encoded: String = self.take(name)?;
        base64::engine::general_purpose::STANDARD.decode(&encoded).map_err(
            |err| {
                self.invalid(&format!(
                    "argument {index} ({name}): invalid base64: {err}"
                ))
            },
        )
    }

    /// Fail if the request supplied more arguments than the operation takes
    fn finish(&self) -> Result<(), Error> {
        if self.next < self.arguments.len() {
            return Err(self.invalid(&format!(
                "expected {} arguments, got {}",
                self.next,
                self.arguments.len()
            )));
        }
        Ok(())
    }
}

fn encode<T: Serialize>(value: T) -> Result<Value, Error> {
    Ok(serde_json::to_value(value)?)
}

/// Execute one invocation against `driver` and produce its response envelope
///
/// All failures are folded into the envelope as faults; the correlation id
/// is echoed back either way.
pub async fn dispatch(
    driver: &dyn VimDriver,
    request: &InvocationRequest,
) -> InvocationResponse {
    match dispatch_inner(driver, request).await {
        Ok(result) => InvocationResponse::ok(request.correlation_id, result),
        Err(error) => InvocationResponse::fault(request.correlation_id, error),
    }
}

async fn dispatch_inner(
    driver: &dyn VimDriver,
    request: &InvocationRequest,
) -> Result<Value, Error> {
    let operation = request
        .operation
        .parse::<Operation>()
        .map_err(|_| Error::unsupported_operation(&request.operation))?;
    let vim = &request.vim_instance;
    let mut args = ArgCursor::new(operation, &request.arguments);

    let result = match operation {
        Operation::ListNetworks => {
            args.finish()?;
            encode(driver.list_networks(vim).await?)?
        }
        Operation::GetNetworkById => {
            let ext_id: String = args.take("extId")?;
            args.finish()?;
            encode(driver.get_network_by_id(vim, &ext_id).await?)?
        }
        Operation::CreateNetwork => {
            let network: Network = args.take("network")?;
            args.finish()?;
            for subnet in &network.subnets {
                subnet.validate().map_err(|m| args.invalid(&m))?;
            }
            encode(driver.create_network(vim, network).await?)?
        }
        Operation::UpdateNetwork => {
            let network: Network = args.take("network")?;
            args.finish()?;
            for subnet in &network.subnets {
                subnet.validate().map_err(|m| args.invalid(&m))?;
            }
            encode(driver.update_network(vim, network).await?)?
        }
        Operation::DeleteNetwork => {
            let ext_id: String = args.take("extId")?;
            args.finish()?;
            encode(driver.delete_network(vim, &ext_id).await?)?
        }
        Operation::GetSubnetsExtIds => {
            let network_ext_id: String = args.take("networkExtId")?;
            args.finish()?;
            encode(driver.get_subnets_ext_ids(vim, &network_ext_id).await?)?
        }
        Operation::CreateSubnet => {
            let network: Network = args.take("network")?;
            let subnet: Subnet = args.take("subnet")?;
            args.finish()?;
            subnet.validate().map_err(|m| args.invalid(&m))?;
            encode(driver.create_subnet(vim, network, subnet).await?)?
        }
        Operation::UpdateSubnet => {
            let network: Network = args.take("network")?;
            let subnet: Subnet = args.take("subnet")?;
            args.finish()?;
            subnet.validate().map_err(|m| args.invalid(&m))?;
            encode(driver.update_subnet(vim, network, subnet).await?)?
        }
        Operation::DeleteSubnet => {
            let ext_id: String = args.take("extId")?;
            args.finish()?;
            encode(driver.delete_subnet(vim, &ext_id).await?)?
        }
        Operation::ListImages => {
            args.finish()?;
            encode(driver.list_images(vim).await?)?
        }
        Operation::CopyImage => {
            let image: NfvImage = args.take("image")?;
            let bytes = args.take_bytes("imageFile")?;
            args.finish()?;
            encode(driver.copy_image(vim, image, bytes).await?)?
        }
        Operation::AddImage => {
            let image: NfvImage = args.take("image")?;
            let image_url: String = args.take("imageUrl")?;
            args.finish()?;
            encode(driver.add_image(vim, image, &image_url).await?)?
        }
        Operation::UpdateImage => {
            let image: NfvImage = args.take("image")?;
            args.finish()?;
            encode(driver.update_image(vim, image).await?)?
        }
        Operation::DeleteImage => {
            let image: NfvImage = args.take("image")?;
            args.finish()?;
            encode(driver.delete_image(vim, image).await?)?
        }
        Operation::ListFlavors => {
            args.finish()?;
            encode(driver.list_flavors(vim).await?)?
        }
        Operation::AddFlavor => {
            let flavour: DeploymentFlavour = args.take("flavor")?;
            args.finish()?;
            encode(driver.add_flavor(vim, flavour).await?)?
        }
        Operation::UpdateFlavor => {
            let flavour: DeploymentFlavour = args.take("flavor")?;
            args.finish()?;
            encode(driver.update_flavor(vim, flavour).await?)?
        }
        Operation::DeleteFlavor => {
            let ext_id: String = args.take("extId")?;
            args.finish()?;
            encode(driver.delete_flavor(vim, &ext_id).await?)?
        }
        Operation::ListServer => {
            args.finish()?;
            encode(driver.list_server(vim).await?)?
        }
        Operation::LaunchInstance => {
            let spec = decode_launch_spec(&mut args)?;
            args.finish()?;
            encode(driver.launch_instance(vim, spec).await?)?
        }
        Operation::LaunchInstanceAndWait => {
            let spec = decode_launch_spec(&mut args)?;
            args.finish()?;
            encode(driver.launch_instance_and_wait(vim, spec).await?)?
        }
        Operation::DeleteServerByIdAndWait => {
            let ext_id: String = args.take("extId")?;
            args.finish()?;
            driver.delete_server_by_id_and_wait(vim, &ext_id).await?;
            Value::Null
        }
        Operation::GetQuota => {
            args.finish()?;
            encode(driver.get_quota(vim).await?)?
        }
        Operation::GetType => {
            args.finish()?;
            encode(driver.get_type(vim))?
        }
    };
    Ok(result)
}

/// Decode the launch argument sequence shared by `launchInstance` and
/// `launchInstanceAndWait`
///
/// The two trailing arguments (floating ips and extra keys) are only sent by
/// orchestrators that use them, so they may be absent or null.
fn decode_launch_spec(args: &mut ArgCursor<'_>) -> Result<LaunchSpec, Error> {
    let name = args.take("name")?;
    let image_ext_id = args.take("image")?;
    let flavour_ext_id = args.take("flavor")?;
    let keypair = args.take("keypair")?;
    let network_ext_ids = args.take("networks")?;
    let security_groups = args.take("securityGroups")?;
    let user_data = args.take("userData")?;
    let floating_ips = args.take_optional("floatingIps")?.unwrap_or_default();
    let keys = args.take_optional("keys")?.unwrap_or_default();
    Ok(LaunchSpec {
        name,
        image_ext_id,
        flavour_ext_id,
        keypair,
        network_ext_ids,
        security_groups,
        user_data,
        floating_ips,
        keys,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vimdriver_common::api::FaultKind;
    use vimdriver_common::api::InvocationStatus;
    use vimdriver_common::api::VimInstance;

    fn test_vim() -> VimInstance {
        VimInstance {
            name: String::from("test-vim"),
            vim_type: String::from("test"),
            auth_url: String::from("http://127.0.0.1:5000"),
            username: String::from("admin"),
            password: String::from("secret"),
            tenant: String::from("tenant-a"),
        }
    }

    #[test]
    fn test_operation_wire_names() {
        // Every variant must round-trip through its wire form.
        for operation in Operation::iter() {
            let wire = operation.to_string();
            assert_eq!(wire.parse::<Operation>().unwrap(), operation);
        }
        assert_eq!(Operation::ListNetworks.to_string(), "listNetworks");
        assert_eq!(
            Operation::GetSubnetsExtIds.to_string(),
            "getSubnetsExtIds"
        );
        assert_eq!(
            Operation::DeleteServerByIdAndWait.to_string(),
            "deleteServerByIdAndWait"
        );
        assert_eq!(Operation::GetType.to_string(), "getType");
        assert!("destroyDatacenter".parse::<Operation>().is_err());
        // Operation names are case-sensitive.
        assert!("listnetworks".parse::<Operation>().is_err());
    }

    #[test]
    fn test_arg_cursor_decodes_in_order() {
        let arguments = vec![json!("net-1"), json!(42)];
        let mut args = ArgCursor::new(Operation::ListNetworks, &arguments);
        let first: String = args.take("extId").unwrap();
        assert_eq!(first, "net-1");
        let second: u32 = args.take("count").unwrap();
        assert_eq!(second, 42);
        args.finish().unwrap();
    }

    #[test]
    fn test_arg_cursor_missing_argument() {
        let arguments = vec![json!("net-1")];
        let mut args = ArgCursor::new(Operation::CreateSubnet, &arguments);
        let _: String = args.take("network").unwrap();
        let error = args.take::<String>("subnet").unwrap_err();
        assert_eq!(error.kind(), FaultKind::InvalidArguments);
        assert!(error.to_string().contains("missing argument 1 (subnet)"));
    }

    #[test]
    fn test_arg_cursor_type_mismatch() {
        let arguments = vec![json!({"bogus": true})];
        let mut args = ArgCursor::new(Operation::GetNetworkById, &arguments);
        let error = args.take::<String>("extId").unwrap_err();
        assert!(error.to_string().contains("argument 0 (extId)"));
    }

    #[test]
    fn test_arg_cursor_rejects_extra_arguments() {
        let arguments = vec![json!("a"), json!("b")];
        let mut args = ArgCursor::new(Operation::DeleteNetwork, &arguments);
        let _: String = args.take("extId").unwrap();
        let error = args.finish().unwrap_err();
        assert!(error.to_string().contains("expected 1 arguments, got 2"));
    }

    #[test]
    fn test_arg_cursor_optional() {
        let arguments = vec![json!("present"), json!(null)];
        let mut args = ArgCursor::new(Operation::LaunchInstance, &arguments);
        assert_eq!(
            args.take_optional::<String>("first").unwrap(),
            Some(String::from("present"))
        );
        assert_eq!(args.take_optional::<String>("second").unwrap(), None);
        assert_eq!(args.take_optional::<String>("third").unwrap(), None);
        args.finish().unwrap();
    }

    #[test]
    fn test_arg_cursor_bytes() {
        let arguments = vec![json!("aGVsbG8="), json!("not!base64!")];
        let mut args = ArgCursor::new(Operation::CopyImage, &arguments);
        assert_eq!(args.take_bytes("imageFile").unwrap(), b"hello");
        let error = args.take_bytes("imageFile").unwrap_err();
        assert!(error.to_string().contains("invalid base64"));
    }

    #[test]
    fn test_decode_launch_spec_without_trailing_arguments() {
        let arguments = vec![
            json!("vm-1"),
            json!("image-1"),
            json!("flavor-1"),
            json!("default-key"),
            json!(["net-1", "net-2"]),
            json!(["default"]),
            json!("#cloud-config"),
        ];
        let mut args =
            ArgCursor::new(Operation::LaunchInstance, &arguments);
        let spec = decode_launch_spec(&mut args).unwrap();
        args.finish().unwrap();
        assert_eq!(spec.name, "vm-1");
        assert_eq!(spec.network_ext_ids, vec!["net-1", "net-2"]);
        assert!(spec.floating_ips.is_empty());
        assert!(spec.keys.is_empty());
    }

    #[test]
    fn test_decode_launch_spec_with_trailing_arguments() {
        let arguments = vec![
            json!("vm-1"),
            json!("image-1"),
            json!("flavor-1"),
            json!("default-key"),
            json!(["net-1"]),
            json!([]),
            json!(""),
            json!({"net-1": "203.0.113.7"}),
            json!([{"name": "ops", "publicKey": "ssh-ed25519 AAAA"}]),
        ];
        let mut args =
            ArgCursor::new(Operation::LaunchInstanceAndWait, &arguments);
        let spec = decode_launch_spec(&mut args).unwrap();
        args.finish().unwrap();
        assert_eq!(
            spec.floating_ips.get("net-1").map(String::as_str),
            Some("203.0.113.7")
        );
        assert_eq!(spec.keys.len(), 1);
        assert_eq!(spec.keys[0].name, "ops");
    }

    #[tokio::test]
    async fn test_dispatch_unsupported_operation() {
        let logctx = vimdriver_test_utils::dev::test_setup_log(
            "test_dispatch_unsupported_operation",
        );
        let driver = crate::sim::SimDriver::new_default(&logctx.log);
        let request = InvocationRequest {
            operation: String::from("migrateEverything"),
            arguments: vec![],
            correlation_id: uuid::Uuid::new_v4(),
            vim_instance: test_vim(),
        };
        let response = dispatch(&driver, &request).await;
        assert_eq!(response.correlation_id, request.correlation_id);
        assert_eq!(response.status, InvocationStatus::Error);
        let fault = response.fault.unwrap();
        assert_eq!(fault.kind, FaultKind::UnsupportedOperation);
        assert!(fault.message.contains("migrateEverything"));
        assert!(!fault.retryable);
        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn test_dispatch_get_type() {
        let logctx =
            vimdriver_test_utils::dev::test_setup_log("test_dispatch_get_type");
        let driver = crate::sim::SimDriver::new_default(&logctx.log);
        let request = InvocationRequest {
            operation: String::from("getType"),
            arguments: vec![],
            correlation_id: uuid::Uuid::new_v4(),
            vim_instance: test_vim(),
        };
        let response = dispatch(&driver, &request).await;
        assert_eq!(response.status, InvocationStatus::Ok);
        assert_eq!(response.result, Some(json!("test")));
        assert!(response.fault.is_none());
        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn test_dispatch_rejects_bad_subnet() {
        let logctx = vimdriver_test_utils::dev::test_setup_log(
            "test_dispatch_rejects_bad_subnet",
        );
        let driver = crate::sim::SimDriver::new_default(&logctx.log);
        let request = InvocationRequest {
            operation: String::from("createSubnet"),
            arguments: vec![
                json!({"name": "net1"}),
                json!({
                    "name": "subnet1",
                    "cidr": "192.168.1.0/24",
                    "gatewayIp": "10.0.0.1"
                }),
            ],
            correlation_id: uuid::Uuid::new_v4(),
            vim_instance: test_vim(),
        };
        let response = dispatch(&driver, &request).await;
        assert_eq!(response.status, InvocationStatus::Error);
        let fault = response.fault.unwrap();
        assert_eq!(fault.kind, FaultKind::InvalidArguments);
        assert!(fault.message.contains("lies outside cidr"));
        logctx.cleanup_successful();
    }
}
