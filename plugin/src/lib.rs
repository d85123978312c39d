// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Runtime for hosting a VIM driver plugin
//!
//! A plugin embeds an implementation of [`driver::VimDriver`] and lets this
//! crate take care of everything around it: the HTTP invocation surface, the
//! worker pool that executes driver calls, registration with the
//! orchestrator's plugin registrar, and configuration.  The `vimdriver-dummy`
//! binary wires the simulated driver from [`sim`] into this runtime and is
//! what the integration tests (and the orchestrator's own test rigs) run
//! against.

// Module for executing the simulated test driver.
pub mod sim;

pub mod config;
pub mod dispatch;
pub mod driver;
mod http_entrypoints;
pub mod pool;
pub mod registry;
pub mod server;
pub mod wait;

#[macro_use]
extern crate slog;
