// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Quick-and-easy way to poll for a condition within a bounded window
//!
//! This is the primitive underneath the contract's "wait" operations: check a
//! condition, sleep a fixed interval, repeat until the condition holds, the
//! condition fails permanently, or the window is used up.  Tests drive it
//! under a paused tokio clock so no real time passes.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Result of one attempt to check a condition being polled
#[derive(Debug, Error)]
pub enum CondCheckError<E> {
    #[error("poll condition not yet ready")]
    NotYet,
    #[error("poll condition failed")]
    Failed(#[from] E),
}

/// Error returned by [`wait_for_condition()`]
#[derive(Debug, Error)]
pub enum Error<E> {
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
    #[error("poll condition failed permanently")]
    PermanentError(E),
}

/// Poll `cond` every `poll_interval` until it returns `Ok` (success) or
/// `CondCheckError::Failed` (permanent failure), or until `poll_max` time has
/// elapsed (`Error::TimedOut`, carrying the elapsed time).
///
/// The overall timeout is only checked between attempts, so a `cond` future
/// that itself blocks can exceed the window.  Callers' checks are expected to
/// be quick relative to `poll_interval`.
pub async fn wait_for_condition<T, E, Func, Fut>(
    mut cond: Func,
    poll_interval: &Duration,
    poll_max: &Duration,
) -> Result<T, Error<E>>
where
    Func: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CondCheckError<E>>>,
{
    let poll_start = Instant::now();
    loop {
        let elapsed = Instant::now().duration_since(poll_start);
        if elapsed > *poll_max {
            return Err(Error::TimedOut(elapsed));
        }
        match cond().await {
            Ok(result) => return Ok(result),
            Err(CondCheckError::NotYet) => (),
            Err(CondCheckError::Failed(e)) => {
                return Err(Error::PermanentError(e))
            }
        }
        tokio::time::sleep(*poll_interval).await;
    }
}
