// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Simulated plugin registrar
//!
//! Stands in for the orchestrator's plugin registry in tests: accepts
//! registrations over the same HTTP surface the real registry exposes,
//! rejects identity conflicts, and records everything so tests can assert
//! on what a plugin server did.

use anyhow::anyhow;
use dropshot::endpoint;
use dropshot::ApiDescription;
use dropshot::ClientErrorStatusCode;
use dropshot::ConfigDropshot;
use dropshot::HttpError;
use dropshot::HttpResponseCreated;
use dropshot::HttpResponseDeleted;
use dropshot::Path;
use dropshot::RequestContext;
use dropshot::TypedBody;
use schemars::JsonSchema;
use serde::Deserialize;
use slog::Logger;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Mutex;
use vimdriver_common::api::PluginIdentity;
use vimdriver_common::api::PluginRegistration;

/// In-memory registrar for exercising plugin registration
pub struct Registrar {
    server: dropshot::HttpServer<Arc<RegistrarContext>>,
    context: Arc<RegistrarContext>,
}

struct RegistrarContext {
    plugins: Mutex<BTreeMap<PluginIdentity, PluginRegistration>>,
    log: Logger,
}

type RegistrarApiDescription = ApiDescription<Arc<RegistrarContext>>;

impl Registrar {
    pub fn start(log: &Logger) -> Result<Registrar, anyhow::Error> {
        let context = Arc::new(RegistrarContext {
            plugins: Mutex::new(BTreeMap::new()),
            log: log.new(o!("component" => "SimRegistrar")),
        });
        let server = dropshot::ServerBuilder::new(
            api(),
            context.clone(),
            context.log.clone(),
        )
        .config(ConfigDropshot {
            bind_address: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            ..Default::default()
        })
        .start()
        .map_err(|error| {
            anyhow!("setting up registrar server: {:#}", error)
        })?;
        info!(context.log, "simulated registrar listening";
            "local_addr" => %server.local_addr());
        Ok(Registrar { server, context })
    }

    /// Base url plugin servers should register against
    pub fn url(&self) -> String {
        format!("http://{}", self.server.local_addr())
    }

    /// Snapshot of the current registrations, ordered by identity
    pub fn registered(&self) -> Vec<PluginRegistration> {
        self.context.plugins.lock().unwrap().values().cloned().collect()
    }

    pub async fn close(self) -> Result<(), anyhow::Error> {
        self.server
            .close()
            .await
            .map_err(|error| anyhow!("closing registrar server: {}", error))
    }
}

fn api() -> RegistrarApiDescription {
    fn register_endpoints() -> Result<RegistrarApiDescription, anyhow::Error>
    {
        let mut api = ApiDescription::new();
        api.register(plugin_register)?;
        api.register(plugin_deregister)?;
        Ok(api)
    }
    register_endpoints().expect("failed to register entrypoints")
}

/// Path parameters for deregistration requests
#[derive(Deserialize, JsonSchema)]
struct PluginPathParam {
    plugin_type: String,
    plugin_name: String,
}

#[endpoint {
    method = POST,
    path = "/plugins",
}]
async fn plugin_register(
    rqctx: RequestContext<Arc<RegistrarContext>>,
    body: TypedBody<PluginRegistration>,
) -> Result<HttpResponseCreated<PluginRegistration>, HttpError> {
    let ctx = rqctx.context();
    let registration = body.into_inner();
    let mut plugins = ctx.plugins.lock().unwrap();
    if plugins.contains_key(&registration.identity) {
        return Err(HttpError::for_client_error(
            None,
            ClientErrorStatusCode::CONFLICT,
            format!(
                "plugin {} is already registered",
                registration.identity
            ),
        ));
    }
    info!(ctx.log, "plugin registered";
        "identity" => %registration.identity,
        "endpoint" => &registration.endpoint,
        "workers" => registration.workers,
    );
    plugins.insert(registration.identity.clone(), registration.clone());
    Ok(HttpResponseCreated(registration))
}

#[endpoint {
    method = DELETE,
    path = "/plugins/{plugin_type}/{plugin_name}",
}]
async fn plugin_deregister(
    rqctx: RequestContext<Arc<RegistrarContext>>,
    path_params: Path<PluginPathParam>,
) -> Result<HttpResponseDeleted, HttpError> {
    let ctx = rqctx.context();
    let path = path_params.into_inner();
    let identity = PluginIdentity {
        plugin_type: path.plugin_type,
        plugin_name: path.plugin_name,
    };
    if ctx.plugins.lock().unwrap().remove(&identity).is_none() {
        return Err(HttpError::for_not_found(
            None,
            format!("plugin {} is not registered", identity),
        ));
    }
    info!(ctx.log, "plugin deregistered"; "identity" => %identity);
    Ok(HttpResponseDeleted())
}
