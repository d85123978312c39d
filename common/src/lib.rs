// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Facilities shared between VIM driver plugins and their clients
//!
//! This crate implements the pieces common to the plugin runtime and the
//! processes that talk to it: the catalogue of resource records exchanged
//! with the orchestrator, the fault taxonomy, the invocation envelopes, and
//! small process-level helpers (retry policies, exit codes, bounded polling).
//! The crates that host an actual driver (e.g. `vimdriver-plugin`) build on
//! top of these.

pub mod api;
pub mod backoff;
pub mod cmd;
pub mod poll;
