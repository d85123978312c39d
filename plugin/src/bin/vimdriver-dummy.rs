// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Executable program to run a dummy VIM plugin backed by the simulated
//! driver

use anyhow::Context;
use camino::Utf8PathBuf;
use clap::Parser;
use std::sync::Arc;
use vimdriver_common::cmd::fatal;
use vimdriver_common::cmd::CmdError;
use vimdriver_plugin::config::Config;
use vimdriver_plugin::server::Server;
use vimdriver_plugin::sim::{SimDriver, SimDriverConfig, UuidIds};

#[derive(Debug, Parser)]
#[clap(name = "vimdriver-dummy", about = "Run a dummy VIM driver plugin")]
struct Args {
    /// VIM type to serve (default: "test")
    #[clap(short = 't', long = "plugin-type")]
    plugin_type: Option<String>,

    /// Name to register under (default: the plugin type)
    #[clap(short = 'n', long = "plugin-name")]
    plugin_name: Option<String>,

    /// Number of concurrent worker instances
    #[clap(short = 'i', long = "instances")]
    instances: Option<usize>,

    /// Plugin configuration file; defaults are applied when absent
    #[clap(short = 'c', long = "config-file")]
    config_file: Option<Utf8PathBuf>,
}

#[tokio::main]
async fn main() {
    if let Err(message) = do_run().await {
        fatal(message);
    }
}

async fn do_run() -> Result<(), CmdError> {
    let args = Args::parse();

    let mut config = match &args.config_file {
        Some(path) => Config::from_file(path).map_err(anyhow::Error::new)?,
        None => Config::new_for_type(String::from("test")),
    };
    if let Some(plugin_type) = args.plugin_type {
        config.plugin_type = plugin_type;
    }
    if let Some(plugin_name) = args.plugin_name {
        config.plugin_name = Some(plugin_name);
    }
    if let Some(instances) = args.instances {
        config.workers = instances;
    }
    config.validate().map_err(CmdError::Usage)?;

    let log = config
        .log
        .to_logger("vimdriver-dummy")
        .context("initializing logger")?;

    let sim_config =
        SimDriverConfig { wait: config.wait.policy(), ..Default::default() };
    let driver = Arc::new(SimDriver::new(sim_config, Box::new(UuidIds), &log));
    let server =
        Server::start(&config, driver, &log).await.map_err(CmdError::Failure)?;
    server.wait_for_finish().await.map_err(CmdError::Failure)
}
