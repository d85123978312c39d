// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Hand-written client for the VIM driver plugin API
//!
//! This speaks the invocation protocol the way the orchestrator does: it
//! POSTs request envelopes and reads back response envelopes.  Faults ride
//! inside a successful HTTP exchange; an HTTP-level error here means the
//! request never reached a worker.

use anyhow::ensure;
use anyhow::Context;
use anyhow::Result;
use slog::debug;
use slog::Logger;
use std::net::SocketAddr;
use uuid::Uuid;
use vimdriver_common::api::invocation::InvocationRequest;
use vimdriver_common::api::invocation::InvocationResponse;
use vimdriver_common::api::invocation::PluginIdentity;
use vimdriver_common::api::invocation::VimInstance;

pub struct Client {
    baseurl: String,
    client: reqwest::Client,
    log: Logger,
}

impl Client {
    pub fn new(addr: &SocketAddr, log: Logger) -> Client {
        let baseurl = format!("http://{}", addr);
        // No overall request timeout: wait-variant invocations legitimately
        // run for the driver's full polling window.
        let client = reqwest::ClientBuilder::new()
            .connect_timeout(std::time::Duration::from_secs(15))
            .build()
            .expect("failed to build reqwest client");
        Client { baseurl, client, log }
    }

    /// invoke: POST /invoke
    pub async fn invoke(
        &self,
        request: &InvocationRequest,
    ) -> Result<InvocationResponse> {
        let url = format!("{}/invoke", self.baseurl);
        debug!(self.log, "client request";
            "operation" => &request.operation,
            "correlation_id" => %request.correlation_id,
        );

        let res = self
            .client
            .post(url)
            .json(request)
            .send()
            .await?
            .error_for_status()?;

        let response: InvocationResponse =
            res.json().await.context("reading invocation response")?;
        debug!(self.log, "client response";
            "correlation_id" => %response.correlation_id,
            "status" => ?response.status,
        );
        Ok(response)
    }

    /// identity: GET /identity
    pub async fn identity(&self) -> Result<PluginIdentity> {
        let url = format!("{}/identity", self.baseurl);
        let res = self.client.get(url).send().await?.error_for_status()?;
        Ok(res.json().await?)
    }

    /// Builds an envelope for `operation` with a fresh correlation id, sends
    /// it, and checks that the response carries the same id back.
    pub async fn call(
        &self,
        operation: &str,
        arguments: Vec<serde_json::Value>,
        vim_instance: &VimInstance,
    ) -> Result<InvocationResponse> {
        let request = InvocationRequest {
            operation: operation.to_string(),
            arguments,
            correlation_id: Uuid::new_v4(),
            vim_instance: vim_instance.clone(),
        };
        let response = self.invoke(&request).await?;
        ensure!(
            response.correlation_id == request.correlation_id,
            "response correlation id {} does not match request {}",
            response.correlation_id,
            request.correlation_id,
        );
        Ok(response)
    }
}
