// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Assembles a running plugin: HTTP surface, request queue, worker pool,
//! and registrar registration

use crate::config::Config;
use crate::driver::VimDriver;
use crate::http_entrypoints;
use crate::pool::{QueuedRequest, WorkerPool};
use crate::registry::RegistrarClient;

use anyhow::anyhow;
use slog::Logger;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use vimdriver_common::api::error::Error;
use vimdriver_common::api::invocation::{
    InvocationRequest, InvocationResponse, PluginIdentity, PluginRegistration,
};

/// Shared state available to the HTTP handlers
pub struct ServerContext {
    queue: flume::Sender<QueuedRequest>,
    drained: CancellationToken,
    identity: PluginIdentity,
    log: Logger,
}

impl ServerContext {
    pub(crate) fn identity(&self) -> &PluginIdentity {
        &self.identity
    }

    /// Hand `request` to the worker pool and wait for its response.
    ///
    /// The queue holds one slot per worker. When every slot is taken the
    /// request is refused with an unavailability fault rather than queued
    /// behind an unbounded backlog, and the orchestrator retries it against
    /// another worker.
    pub(crate) async fn enqueue(
        &self,
        request: InvocationRequest,
    ) -> Result<InvocationResponse, Error> {
        let correlation_id = request.correlation_id;
        let (reply, response) = oneshot::channel();
        self.queue.try_send(QueuedRequest { request, reply }).map_err(
            |error| match error {
                flume::TrySendError::Full(_) => {
                    Error::unavail("request queue is full")
                }
                flume::TrySendError::Disconnected(_) => {
                    Error::unavail("request queue is closed")
                }
            },
        )?;
        debug!(
            self.log, "request queued";
            "correlation_id" => %correlation_id,
        );
        // A request can land in the queue in the instant between the final
        // shutdown drain and the channel closing; the drained token catches
        // that so no caller is left waiting on a reply that will never come.
        // `biased` so that a response that was already sent wins over the
        // token.
        tokio::select! {
            biased;
            result = response => result
                .map_err(|_| Error::unavail("worker abandoned the request")),
            _ = self.drained.cancelled() => {
                Err(Error::unavail("server is shutting down"))
            }
        }
    }
}

/// Packages up a running plugin: the dropshot server on which invocations
/// arrive, the worker pool executing them, and the registrar registration
/// that makes the plugin reachable.
pub struct Server {
    http_server: dropshot::HttpServer<Arc<ServerContext>>,
    pool: WorkerPool,
    registration: Option<(RegistrarClient, PluginIdentity)>,
    log: Logger,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server").finish_non_exhaustive()
    }
}

impl Server {
    /// Start a plugin server hosting `driver`
    pub async fn start(
        config: &Config,
        driver: Arc<dyn VimDriver>,
        log: &Logger,
    ) -> Result<Server, anyhow::Error> {
        info!(log, "setting up plugin server");

        let identity = config.identity();

        let (sender, receiver) = flume::bounded(config.workers);
        let pool = WorkerPool::start(
            driver,
            receiver,
            config.workers,
            log.new(o!("component" => "WorkerPool")),
        );

        let context = Arc::new(ServerContext {
            queue: sender,
            drained: pool.drained_token(),
            identity: identity.clone(),
            log: log.new(o!("component" => "ServerContext")),
        });

        let http_server = dropshot::ServerBuilder::new(
            http_entrypoints::api(),
            context,
            log.new(o!("component" => "dropshot")),
        )
        .config(config.dropshot.clone())
        .start()
        .map_err(|error| anyhow!("setting up HTTP server: {:#}", error))?;

        info!(
            log, "plugin server listening";
            "local_addr" => %http_server.local_addr(),
            "plugin" => %identity,
        );

        let registration = match &config.registrar_url {
            Some(url) => {
                let client = RegistrarClient::new(
                    url,
                    log.new(o!("component" => "RegistrarClient")),
                );
                let registration = PluginRegistration {
                    identity: identity.clone(),
                    endpoint: format!("http://{}", http_server.local_addr()),
                    workers: config.workers,
                };
                if let Err(error) = client.register(&registration).await {
                    // Nothing can reach a plugin the orchestrator does not
                    // know about, so a failed registration takes the whole
                    // server down with it.
                    pool.shutdown().await;
                    if let Err(message) = http_server.close().await {
                        warn!(
                            log, "failed to close HTTP server";
                            "error" => %message,
                        );
                    }
                    return Err(anyhow::Error::new(error)
                        .context("registering with registrar"));
                }
                info!(log, "registered with registrar"; "registrar_url" => %url);
                Some((client, identity))
            }
            None => {
                info!(log, "no registrar configured; running standalone");
                None
            }
        };

        Ok(Server { http_server, pool, registration, log: log.clone() })
    }

    /// Address on which the server is accepting invocations
    pub fn local_addr(&self) -> SocketAddr {
        self.http_server.local_addr()
    }

    /// Wait for the server to shut down
    ///
    /// Note that this doesn't initiate a shutdown; it returns once something
    /// else does.
    pub async fn wait_for_finish(self) -> Result<(), anyhow::Error> {
        self.http_server
            .wait_for_shutdown()
            .await
            .map_err(|message| anyhow!("server exiting: {}", message))
    }

    /// Shut the server down cleanly
    ///
    /// Withdraws the registrar registration (when one was made), winds down
    /// the worker pool, then closes the HTTP server. Deregistration is
    /// best-effort: a registrar that has already gone away does not keep the
    /// plugin from exiting.
    pub async fn close(self) -> Result<(), anyhow::Error> {
        if let Some((client, identity)) = &self.registration {
            match client.deregister(identity).await {
                Ok(()) => info!(self.log, "deregistered from registrar"),
                Err(error) => {
                    warn!(
                        self.log,
                        "failed to deregister from registrar";
                        &error,
                    );
                }
            }
        }
        // The HTTP close below waits for in-flight handlers, and a handler
        // parked on the request queue only resolves once the workers are
        // gone, so the pool goes down first.
        self.pool.shutdown().await;
        self.http_server
            .close()
            .await
            .map_err(|message| anyhow!("closing HTTP server: {}", message))?;
        Ok(())
    }
}
