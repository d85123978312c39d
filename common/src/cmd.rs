// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Facilities used by command-line tools

use std::env::args_os;
use std::process::exit;

/// Represents a fatal error in a command-line program
#[derive(Debug, thiserror::Error)]
pub enum CmdError {
    /// incorrect command-line arguments
    #[error("usage error: {0}")]
    Usage(String),
    /// all other errors
    #[error(transparent)]
    Failure(#[from] anyhow::Error),
}

/// Exit status for a process that terminated successfully
pub const EXIT_SUCCESS: i32 = 0;
/// Exit status for a process that terminated on a runtime failure
pub const EXIT_FAILURE: i32 = 1;
/// Exit status for a process invoked with bad arguments
pub const EXIT_USAGE: i32 = 2;

/// Prints an appropriate formatting of `error` to stderr and exits the
/// process with a status reflecting the class of failure.
pub fn fatal(error: CmdError) -> ! {
    let arg0_os = args_os().next();
    let arg0 = arg0_os
        .as_ref()
        .and_then(|s| s.to_str())
        .unwrap_or("command");
    let (exit_code, message) = match error {
        CmdError::Usage(m) => (EXIT_USAGE, m),
        // {:#} prints the entire anyhow cause chain on one line.
        CmdError::Failure(e) => (EXIT_FAILURE, format!("{:#}", e)),
    };
    eprintln!("{}: {}", arg0, message);
    exit(exit_code);
}
