// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Simulated VIM driver implementation
//!
//! The simulated driver answers every operation from seeded in-memory
//! fixtures, which is what orchestrator test rigs (and this crate's own
//! tests) run against.  The simulated registrar stands in for the
//! orchestrator's plugin registry.

mod driver;
mod registry;

pub use driver::CounterIds;
pub use driver::IdSource;
pub use driver::SimDriver;
pub use driver::SimDriverConfig;
pub use driver::UuidIds;
pub use registry::Registrar;
