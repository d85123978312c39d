// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Module providing utilities for retrying operations with exponential backoff.

use std::time::Duration;

pub use ::backoff::future::{retry, retry_notify};
pub use ::backoff::Error as BackoffError;
pub use ::backoff::{backoff::Backoff, ExponentialBackoff, Notify};

/// Return a backoff policy for registering with the plugin registrar, which
/// may not be up yet when the plugin starts.
///
/// Unlike a background reconnect loop, registration must eventually give up
/// so that a misconfigured deployment fails visibly: the policy stops
/// producing intervals once `MAX_ELAPSED` has passed and the caller surfaces
/// the last error.
pub fn registrar_policy() -> ::backoff::ExponentialBackoff {
    const INITIAL_INTERVAL: Duration = Duration::from_millis(250);
    const MAX_INTERVAL: Duration = Duration::from_secs(10);
    const MAX_ELAPSED: Duration = Duration::from_secs(60);
    ::backoff::ExponentialBackoff {
        current_interval: INITIAL_INTERVAL,
        initial_interval: INITIAL_INTERVAL,
        multiplier: 2.0,
        max_interval: MAX_INTERVAL,
        max_elapsed_time: Some(MAX_ELAPSED),
        ..::backoff::ExponentialBackoff::default()
    }
}
