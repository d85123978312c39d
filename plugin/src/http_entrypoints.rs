// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! HTTP entrypoint functions for the plugin API

use dropshot::{
    endpoint, ApiDescription, HttpError, HttpResponseOk, RequestContext,
    TypedBody,
};
use std::sync::Arc;
use vimdriver_common::api::invocation::{
    InvocationRequest, InvocationResponse, PluginIdentity,
};

use crate::server::ServerContext;

type PluginApiDescription = ApiDescription<Arc<ServerContext>>;

/// Returns a description of the plugin API
pub fn api() -> PluginApiDescription {
    fn register_endpoints() -> Result<PluginApiDescription, anyhow::Error> {
        let mut api = PluginApiDescription::new();
        api.register(plugin_invoke)?;
        api.register(plugin_identity)?;
        Ok(api)
    }

    register_endpoints().expect("failed to register entrypoints")
}

/// Execute one driver operation and return its response envelope.
///
/// Faults raised by the driver come back as a 200 whose envelope carries an
/// `ERROR` status; only transport-level failures (a full queue, a server
/// winding down) surface as HTTP errors.
#[endpoint {
    method = POST,
    path = "/invoke",
}]
async fn plugin_invoke(
    rqctx: RequestContext<Arc<ServerContext>>,
    body: TypedBody<InvocationRequest>,
) -> Result<HttpResponseOk<InvocationResponse>, HttpError> {
    let ctx = rqctx.context();
    let response = ctx.enqueue(body.into_inner()).await?;
    Ok(HttpResponseOk(response))
}

/// Fetch the identity this plugin serves
#[endpoint {
    method = GET,
    path = "/identity",
}]
async fn plugin_identity(
    rqctx: RequestContext<Arc<ServerContext>>,
) -> Result<HttpResponseOk<PluginIdentity>, HttpError> {
    let ctx = rqctx.context();
    Ok(HttpResponseOk(ctx.identity().clone()))
}
