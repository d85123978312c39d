// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Request and response envelopes exchanged with the orchestrator
//!
//! A request names a contract operation, carries its positional arguments as
//! JSON values, and identifies the VIM to run it against.  The matching
//! response carries either the operation's result or a [`Fault`], never both,
//! correlated by the request's id.

use crate::api::error::Error;
use crate::api::error::Fault;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Connection and authentication parameters for the VIM a request targets
///
/// Read-only per request.  Unknown fields are rejected at the boundary so
/// that a misspelled key surfaces as `invalidArguments` instead of a silently
/// dropped credential.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VimInstance {
    pub name: String,
    /// VIM technology identifier, e.g. "openstack" or "test"
    #[serde(rename = "type")]
    pub vim_type: String,
    pub auth_url: String,
    pub username: String,
    pub password: String,
    pub tenant: String,
}

/// One request envelope from the orchestrator
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InvocationRequest {
    /// Contract operation name, e.g. "listNetworks"
    pub operation: String,
    /// Positional arguments matching the operation's declared parameters
    #[serde(default)]
    pub arguments: Vec<Value>,
    pub correlation_id: Uuid,
    pub vim_instance: VimInstance,
}

/// Outcome discriminant carried by an [`InvocationResponse`]
#[derive(
    Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum InvocationStatus {
    Ok,
    Error,
}

/// One response envelope, correlated to its request
///
/// Exactly one of `result` and `fault` is populated, matching `status`.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResponse {
    pub correlation_id: Uuid,
    pub status: InvocationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<Fault>,
}

impl InvocationResponse {
    /// Builds an OK envelope carrying `result`.
    pub fn ok(correlation_id: Uuid, result: Value) -> InvocationResponse {
        InvocationResponse {
            correlation_id,
            status: InvocationStatus::Ok,
            result: Some(result),
            fault: None,
        }
    }

    /// Builds an ERROR envelope carrying the fault form of `error`.
    pub fn fault(correlation_id: Uuid, error: Error) -> InvocationResponse {
        InvocationResponse {
            correlation_id,
            status: InvocationStatus::Error,
            result: None,
            fault: Some(Fault::from(error)),
        }
    }
}

/// Logical identity a plugin registers under
///
/// Multiple worker instances may share one identity; they then compete for
/// requests on that identity's stream.
#[derive(
    Clone,
    Debug,
    Deserialize,
    Serialize,
    JsonSchema,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
)]
#[serde(rename_all = "camelCase")]
pub struct PluginIdentity {
    pub plugin_type: String,
    pub plugin_name: String,
}

impl fmt::Display for PluginIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.plugin_type, self.plugin_name)
    }
}

/// Registration announcing a plugin endpoint to the registrar
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PluginRegistration {
    #[serde(flatten)]
    pub identity: PluginIdentity,
    /// Base URL where the plugin accepts invocations
    pub endpoint: String,
    /// Number of workers consuming this identity's request stream
    pub workers: usize,
}
