// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Interfaces for working with plugin configuration

use camino::Utf8Path;
use camino::Utf8PathBuf;
use dropshot::ConfigDropshot;
use dropshot::ConfigLogging;
use dropshot::ConfigLoggingLevel;
use dropshot::HandlerTaskMode;
use serde::Deserialize;
use serde::Serialize;
use slog_error_chain::SlogInlineError;
use std::net::Ipv4Addr;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use vimdriver_common::api::PluginIdentity;

use crate::wait::WaitPolicy;

/// Default number of concurrent driver workers
pub const DEFAULT_WORKERS: usize = 5;

/// Configuration for a plugin server
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Config {
    /// Type of VIM this plugin drives (e.g. "openstack", "test")
    pub plugin_type: String,
    /// Name to register under, when it should differ from `plugin_type`
    #[serde(default)]
    pub plugin_name: Option<String>,
    /// Number of concurrent driver workers
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Base URL of the orchestrator's plugin registrar
    ///
    /// When absent the server runs standalone and skips registration.
    #[serde(default)]
    pub registrar_url: Option<String>,
    /// Polling bounds for the blocking (`...AndWait`) operations
    #[serde(default)]
    pub wait: WaitConfig,
    /// Configuration for the invocation API dropshot server
    #[serde(default = "default_dropshot")]
    pub dropshot: ConfigDropshot,
    /// Server-wide logging configuration
    pub log: ConfigLogging,
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_dropshot() -> ConfigDropshot {
    ConfigDropshot {
        bind_address: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
        // Image copies arrive as base64 in the request body, so the dropshot
        // default of 1 KiB is far too small.
        default_request_body_max_bytes: 4 * 1024 * 1024,
        // Invoke handlers park on a reply channel while a worker runs the
        // operation; a caller that disconnects abandons the invocation, and
        // cancelling the handler is what tells the worker so.
        default_handler_task_mode: HandlerTaskMode::CancelOnDisconnect,
        ..Default::default()
    }
}

/// Polling bounds for operations that block until the backend settles
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct WaitConfig {
    /// Delay between successive polls of the backend, in milliseconds
    pub poll_interval_ms: u64,
    /// Total time to keep polling before giving up, in milliseconds
    pub poll_max_ms: u64,
}

impl Default for WaitConfig {
    fn default() -> WaitConfig {
        WaitConfig { poll_interval_ms: 500, poll_max_ms: 300_000 }
    }
}

impl WaitConfig {
    pub fn policy(&self) -> WaitPolicy {
        WaitPolicy {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            poll_max: Duration::from_millis(self.poll_max_ms),
        }
    }
}

impl Config {
    /// Default configuration for a plugin of the given type
    ///
    /// Matches what loading a TOML file containing only `plugin_type` and
    /// stderr logging would produce.
    pub fn new_for_type(plugin_type: String) -> Config {
        Config {
            plugin_type,
            plugin_name: None,
            workers: DEFAULT_WORKERS,
            registrar_url: None,
            wait: WaitConfig::default(),
            dropshot: default_dropshot(),
            log: ConfigLogging::StderrTerminal {
                level: ConfigLoggingLevel::Info,
            },
        }
    }

    /// Load a `Config` from the given TOML file
    ///
    /// This config object can then be used to create a new plugin server.
    pub fn from_file(path: &Utf8Path) -> Result<Config, LoadError> {
        let file_contents = std::fs::read_to_string(path)
            .map_err(|err| LoadError::Io { path: path.into(), err })?;
        let config_parsed: Config = toml::from_str(&file_contents)
            .map_err(|err| LoadError::Parse { path: path.into(), err })?;
        config_parsed.validate().map_err(|reason| LoadError::Invalid {
            path: path.into(),
            reason,
        })?;
        Ok(config_parsed)
    }

    /// Check constraints that the TOML schema alone cannot express
    ///
    /// Callers that override fields after loading (the `vimdriver-dummy`
    /// command line does) must call this again afterwards.
    pub fn validate(&self) -> Result<(), String> {
        if self.workers == 0 {
            return Err(String::from("workers must be at least 1"));
        }
        Ok(())
    }

    /// The identity this plugin registers under
    ///
    /// `plugin_name` falls back to `plugin_type` when not set, matching how
    /// orchestrators address a VIM type's default plugin.
    pub fn identity(&self) -> PluginIdentity {
        PluginIdentity {
            plugin_type: self.plugin_type.clone(),
            plugin_name: self
                .plugin_name
                .clone()
                .unwrap_or_else(|| self.plugin_type.clone()),
        }
    }
}

#[derive(Debug, Error, SlogInlineError)]
pub enum LoadError {
    #[error("error reading \"{path}\": {err}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("error parsing \"{path}\": {err}")]
    Parse {
        path: Utf8PathBuf,
        #[source]
        err: toml::de::Error,
    },
    #[error("invalid config \"{path}\": {reason}")]
    Invalid { path: Utf8PathBuf, reason: String },
}
