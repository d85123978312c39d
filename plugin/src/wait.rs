// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Polling helpers for the blocking (`...AndWait`) operations
//!
//! VIM backends report server lifecycle transitions asynchronously, so the
//! wait variants of launch and delete repeatedly list servers until the one
//! of interest settles.  Polling is bounded by a [`WaitPolicy`]; exhausting
//! the window produces [`Error::DeadlineExceeded`], which the orchestrator
//! treats as retryable.

use std::time::Duration;
use vimdriver_common::api::Error;
use vimdriver_common::api::Server;
use vimdriver_common::api::ServerStatus;
use vimdriver_common::api::VimInstance;
use vimdriver_common::poll;
use vimdriver_common::poll::CondCheckError;

use crate::driver::VimDriver;

/// Bounds on how a wait variant polls the backend
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WaitPolicy {
    /// Delay between successive polls
    pub poll_interval: Duration,
    /// Total time to keep polling before giving up
    pub poll_max: Duration,
}

impl Default for WaitPolicy {
    fn default() -> WaitPolicy {
        WaitPolicy {
            poll_interval: Duration::from_millis(500),
            poll_max: Duration::from_secs(300),
        }
    }
}

/// Poll until the server with `ext_id` reaches a terminal status
///
/// Returns the server in its terminal state, whether that is `ACTIVE` or
/// `ERROR`; it is the caller's business to care which.  Retryable driver
/// errors keep the poll going (a briefly unreachable backend is exactly what
/// the polling window is for); any other error aborts the wait.
pub async fn wait_for_server_status(
    driver: &dyn VimDriver,
    vim: &VimInstance,
    ext_id: &str,
    policy: &WaitPolicy,
) -> Result<Server, Error> {
    let result = poll::wait_for_condition(
        || async {
            let servers = match driver.list_server(vim).await {
                Ok(servers) => servers,
                Err(error) if error.retryable() => {
                    return Err(CondCheckError::NotYet);
                }
                Err(error) => return Err(CondCheckError::Failed(error)),
            };
            let Some(server) =
                servers.into_iter().find(|s| s.external_id == ext_id)
            else {
                // The server vanished mid-wait (deleted out from under us).
                return Err(CondCheckError::Failed(Error::not_found(
                    &format!("server \"{ext_id}\""),
                )));
            };
            if server.extended_status.is_terminal() {
                Ok(server)
            } else {
                Err(CondCheckError::NotYet)
            }
        },
        &policy.poll_interval,
        &policy.poll_max,
    )
    .await;

    match result {
        Ok(server) => Ok(server),
        Err(poll::Error::PermanentError(error)) => Err(error),
        Err(poll::Error::TimedOut(elapsed)) => {
            Err(Error::deadline_exceeded(&format!(
                "server \"{ext_id}\" did not reach a terminal status \
                 within {elapsed:?}"
            )))
        }
    }
}

/// Poll until the server with `ext_id` is gone (or reports `DELETED`)
pub async fn wait_for_server_gone(
    driver: &dyn VimDriver,
    vim: &VimInstance,
    ext_id: &str,
    policy: &WaitPolicy,
) -> Result<(), Error> {
    let result = poll::wait_for_condition(
        || async {
            let servers = match driver.list_server(vim).await {
                Ok(servers) => servers,
                Err(error) if error.retryable() => {
                    return Err(CondCheckError::NotYet);
                }
                Err(error) => return Err(CondCheckError::Failed(error)),
            };
            let still_there = servers.iter().any(|s| {
                s.external_id == ext_id
                    && s.extended_status != ServerStatus::Deleted
            });
            if still_there {
                Err(CondCheckError::NotYet)
            } else {
                Ok(())
            }
        },
        &policy.poll_interval,
        &policy.poll_max,
    )
    .await;

    match result {
        Ok(()) => Ok(()),
        Err(poll::Error::PermanentError(error)) => Err(error),
        Err(poll::Error::TimedOut(elapsed)) => {
            Err(Error::deadline_exceeded(&format!(
                "server \"{ext_id}\" was still being deleted after \
                 {elapsed:?}"
            )))
        }
    }
}
