// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Client for the orchestrator's plugin registrar
//!
//! A plugin server announces itself to the registrar on startup so the
//! orchestrator can route that identity's invocations to it, and withdraws
//! the registration on shutdown.

use reqwest::StatusCode;
use slog::Logger;
use slog_error_chain::SlogInlineError;
use thiserror::Error;
use vimdriver_common::api::PluginIdentity;
use vimdriver_common::api::PluginRegistration;
use vimdriver_common::backoff;
use vimdriver_common::backoff::BackoffError;

pub struct RegistrarClient {
    baseurl: String,
    client: reqwest::Client,
    log: Logger,
}

#[derive(Debug, Error, SlogInlineError)]
pub enum RegistrarError {
    #[error("registrar unreachable at {baseurl}")]
    Unreachable {
        baseurl: String,
        #[source]
        err: reqwest::Error,
    },
    #[error("identity {identity} is already registered")]
    Conflict { identity: PluginIdentity },
    #[error("registrar rejected the request")]
    ErrorResponse {
        #[source]
        err: reqwest::Error,
    },
}

impl RegistrarClient {
    pub fn new(baseurl: &str, log: Logger) -> RegistrarClient {
        RegistrarClient {
            baseurl: baseurl.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            log,
        }
    }

    /// Register `registration`, retrying transient failures
    ///
    /// An identity conflict is permanent and fails immediately.  Connection
    /// errors and server-side failures are retried until the backoff policy
    /// gives up, so a plugin that starts moments before its registrar still
    /// comes up.
    pub async fn register(
        &self,
        registration: &PluginRegistration,
    ) -> Result<(), RegistrarError> {
        let try_register = || async {
            self.register_once(registration).await.map_err(
                |error| match error {
                    RegistrarError::Conflict { .. } => {
                        BackoffError::permanent(error)
                    }
                    _ => BackoffError::transient(error),
                },
            )
        };
        let log_failure = |error, delay| {
            warn!(
                self.log,
                "failed to register with registrar, will retry in {:?}",
                delay;
                "error" => ?error,
            );
        };
        backoff::retry_notify(
            backoff::registrar_policy(),
            try_register,
            log_failure,
        )
        .await
    }

    async fn register_once(
        &self,
        registration: &PluginRegistration,
    ) -> Result<(), RegistrarError> {
        let url = format!("{}/plugins", self.baseurl);
        let response = self
            .client
            .post(&url)
            .json(registration)
            .send()
            .await
            .map_err(|err| RegistrarError::Unreachable {
                baseurl: self.baseurl.clone(),
                err,
            })?;
        if response.status() == StatusCode::CONFLICT {
            return Err(RegistrarError::Conflict {
                identity: registration.identity.clone(),
            });
        }
        response
            .error_for_status()
            .map(|_| ())
            .map_err(|err| RegistrarError::ErrorResponse { err })
    }

    /// Withdraw the registration for `identity`
    pub async fn deregister(
        &self,
        identity: &PluginIdentity,
    ) -> Result<(), RegistrarError> {
        let url = format!(
            "{}/plugins/{}/{}",
            self.baseurl, identity.plugin_type, identity.plugin_name
        );
        let response = self.client.delete(&url).send().await.map_err(
            |err| RegistrarError::Unreachable {
                baseurl: self.baseurl.clone(),
                err,
            },
        )?;
        response
            .error_for_status()
            .map(|_| ())
            .map_err(|err| RegistrarError::ErrorResponse { err })
    }
}
