// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use slog::o;
use slog::Logger;
use uuid::Uuid;
use vimdriver_client::Client;
use vimdriver_common::api::DeploymentFlavour;
use vimdriver_common::api::FaultKind;
use vimdriver_common::api::InvocationStatus;
use vimdriver_common::api::Network;
use vimdriver_common::api::Quota;
use vimdriver_common::api::VimInstance;
use vimdriver_plugin::config::Config;
use vimdriver_plugin::dispatch::Operation;
use vimdriver_plugin::server::Server;
use vimdriver_plugin::sim::CounterIds;
use vimdriver_plugin::sim::Registrar;
use vimdriver_plugin::sim::SimDriver;
use vimdriver_plugin::sim::SimDriverConfig;
use vimdriver_plugin::wait::WaitPolicy;
use vimdriver_test_utils::dev::test_setup_log;

#[tokio::test]
pub async fn identity_and_unknown_operations() -> Result<(), anyhow::Error> {
    let logctx = test_setup_log("identity_and_unknown_operations");
    let plugin = start_plugin(
        &logctx.log,
        &test_config(2),
        SimDriverConfig::default(),
    )
    .await?;
    let vim = test_vim();

    // the identity endpoint reflects the configured plugin type
    let identity = plugin.client.identity().await?;
    assert_eq!(identity.plugin_type, "test");
    assert_eq!(identity.plugin_name, "test");

    // getType round-trips through the envelope
    let response = plugin.client.call("getType", vec![], &vim).await?;
    assert_eq!(response.status, InvocationStatus::Ok);
    assert_eq!(response.result, Some(json!("test")));

    // an operation outside the contract is a fault, not a transport error
    let response =
        plugin.client.call("destroyDatacenter", vec![], &vim).await?;
    assert_eq!(response.status, InvocationStatus::Error);
    let fault = response.fault.expect("expected a fault");
    assert_eq!(fault.kind, FaultKind::UnsupportedOperation);
    assert!(!fault.retryable);
    assert!(fault.message.contains("destroyDatacenter"));

    // a misspelled credential key is rejected at the boundary instead of
    // being silently dropped
    let body = json!({
        "operation": "listNetworks",
        "arguments": [],
        "correlationId": Uuid::new_v4(),
        "vimInstance": {
            "name": "test-vim",
            "type": "test",
            "authUrl": "http://127.0.0.1:5000",
            "username": "admin",
            "passwrod": "secret",
            "tenant": "tenant-a",
        },
    });
    let url = format!("http://{}/invoke", plugin.server.local_addr());
    let response = reqwest::Client::new().post(url).json(&body).send().await?;
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

    plugin.cleanup().await;
    logctx.cleanup_successful();
    Ok(())
}

// Every contract operation dispatches to a response envelope, never a
// transport error or a crash.  With no arguments the list-style operations
// succeed against the seeded fixtures and the rest fault on their missing
// first argument.
#[tokio::test]
pub async fn all_operations_dispatch() -> Result<(), anyhow::Error> {
    let logctx = test_setup_log("all_operations_dispatch");
    let plugin = start_plugin(
        &logctx.log,
        &test_config(2),
        SimDriverConfig::default(),
    )
    .await?;
    let vim = test_vim();

    for operation in Operation::iter() {
        let response = plugin
            .client
            .call(&operation.to_string(), vec![], &vim)
            .await?;
        match response.status {
            InvocationStatus::Ok => {
                assert!(
                    response.result.is_some(),
                    "no result for {operation}"
                );
            }
            InvocationStatus::Error => {
                let fault = response.fault.expect("expected a fault");
                assert_eq!(
                    fault.kind,
                    FaultKind::InvalidArguments,
                    "unexpected fault for {operation}: {}",
                    fault.message
                );
            }
        }
    }

    plugin.cleanup().await;
    logctx.cleanup_successful();
    Ok(())
}

#[tokio::test]
pub async fn network_crud() -> Result<(), anyhow::Error> {
    let logctx = test_setup_log("network_crud");
    let plugin = start_plugin(
        &logctx.log,
        &test_config(2),
        SimDriverConfig::default(),
    )
    .await?;
    let client = &plugin.client;
    let vim = test_vim();

    // ten seeded networks to start
    let response = client.call("listNetworks", vec![], &vim).await?;
    let networks: Vec<Network> =
        serde_json::from_value(response.result.expect("no result"))?;
    assert_eq!(networks.len(), 10);

    // create a network; the backend assigns ids and a default subnet
    let response = client
        .call("createNetwork", vec![json!({ "name": "mynet" })], &vim)
        .await?;
    assert_eq!(response.status, InvocationStatus::Ok);
    let created: Network =
        serde_json::from_value(response.result.expect("no result"))?;
    assert_eq!(created.name, "mynet");
    assert_eq!(created.external_id, "net_id_11");
    assert_eq!(created.subnets.len(), 1);
    assert_eq!(created.subnets[0].name, "mynet_subnet");
    assert_eq!(created.subnets[0].external_id, "subnet_id_12");

    // read it back
    let response =
        client.call("getNetworkById", vec![json!("net_id_11")], &vim).await?;
    let fetched: Network =
        serde_json::from_value(response.result.expect("no result"))?;
    assert_eq!(fetched, created);

    let response = client.call("listNetworks", vec![], &vim).await?;
    let networks: Vec<Network> =
        serde_json::from_value(response.result.expect("no result"))?;
    assert_eq!(networks.len(), 11);

    // deletion reports the network gone, and again for an id that no
    // longer exists
    for _ in 0..2 {
        let response = client
            .call("deleteNetwork", vec![json!("net_id_11")], &vim)
            .await?;
        assert_eq!(response.status, InvocationStatus::Ok);
        assert_eq!(response.result, Some(json!(true)));
    }

    // looking up the deleted network faults
    let response =
        client.call("getNetworkById", vec![json!("net_id_11")], &vim).await?;
    assert_eq!(response.status, InvocationStatus::Error);
    let fault = response.fault.expect("expected a fault");
    assert_eq!(fault.kind, FaultKind::NotFound);
    assert!(!fault.retryable);
    assert!(fault.message.contains("net_id_11"));

    plugin.cleanup().await;
    logctx.cleanup_successful();
    Ok(())
}

#[tokio::test]
pub async fn catalogue_fixtures() -> Result<(), anyhow::Error> {
    let logctx = test_setup_log("catalogue_fixtures");
    let plugin = start_plugin(
        &logctx.log,
        &test_config(2),
        SimDriverConfig::default(),
    )
    .await?;
    let client = &plugin.client;
    let vim = test_vim();

    // flavours come back in catalogue order
    let response = client.call("listFlavors", vec![], &vim).await?;
    let flavours: Vec<DeploymentFlavour> =
        serde_json::from_value(response.result.expect("no result"))?;
    let keys: Vec<&str> =
        flavours.iter().map(|f| f.flavour_key.as_str()).collect();
    assert_eq!(keys, ["m1.tiny", "m1.small", "m1.medium", "m1.large",
        "m1.xlarge"]);

    // ten seeded images
    let response = client.call("listImages", vec![], &vim).await?;
    let images = response.result.expect("no result");
    assert_eq!(images.as_array().map(Vec::len), Some(10));

    // quota is reported for the requesting tenant
    let response = client.call("getQuota", vec![], &vim).await?;
    let quota: Quota =
        serde_json::from_value(response.result.expect("no result"))?;
    assert_eq!(quota.tenant, "tenant-a");
    assert!(quota.instances > 0);

    plugin.cleanup().await;
    logctx.cleanup_successful();
    Ok(())
}

#[tokio::test]
pub async fn launch_and_delete_server() -> Result<(), anyhow::Error> {
    let logctx = test_setup_log("launch_and_delete_server");
    let plugin =
        start_plugin(&logctx.log, &test_config(2), fast_sim_config()).await?;
    let client = &plugin.client;
    let vim = test_vim();

    // launch without waiting: the server is still building when the call
    // returns
    let response = client
        .call("launchInstance", launch_arguments("vm-1"), &vim)
        .await?;
    assert_eq!(response.status, InvocationStatus::Ok);
    let result = response.result.expect("no result");
    assert_eq!(result["externalId"], json!("server_id_11"));
    assert_eq!(result["extendedStatus"], json!("BUILD"));
    assert_eq!(result["flavor"]["flavourKey"], json!("m1.tiny"));
    assert!(!result["ips"].as_array().expect("ips array").is_empty());

    // once settled, the server lists as ACTIVE
    tokio::time::sleep(Duration::from_millis(100)).await;
    let response = client.call("listServer", vec![], &vim).await?;
    let servers = response.result.expect("no result");
    assert_eq!(servers.as_array().map(Vec::len), Some(1));
    assert_eq!(servers[0]["extendedStatus"], json!("ACTIVE"));

    // launch-and-wait returns only once the server settles
    let response = client
        .call("launchInstanceAndWait", launch_arguments("vm-2"), &vim)
        .await?;
    assert_eq!(response.status, InvocationStatus::Ok);
    let result = response.result.expect("no result");
    assert_eq!(result["externalId"], json!("server_id_12"));
    assert_eq!(result["extendedStatus"], json!("ACTIVE"));

    // delete both and wait for them to disappear
    for ext_id in ["server_id_11", "server_id_12"] {
        let response = client
            .call("deleteServerByIdAndWait", vec![json!(ext_id)], &vim)
            .await?;
        assert_eq!(response.status, InvocationStatus::Ok);
        assert!(response.fault.is_none());
    }
    let response = client.call("listServer", vec![], &vim).await?;
    assert_eq!(response.result, Some(json!([])));

    plugin.cleanup().await;
    logctx.cleanup_successful();
    Ok(())
}

// Concurrent blocking launches across the pool all complete, each with its
// own correlation id and server.
#[tokio::test]
pub async fn concurrent_launches() -> Result<(), anyhow::Error> {
    let logctx = test_setup_log("concurrent_launches");
    let plugin =
        start_plugin(&logctx.log, &test_config(3), fast_sim_config()).await?;
    let client = &plugin.client;
    let vim = test_vim();

    let (a, b, c) = tokio::join!(
        client.call("launchInstanceAndWait", launch_arguments("vm-a"), &vim),
        client.call("launchInstanceAndWait", launch_arguments("vm-b"), &vim),
        client.call("launchInstanceAndWait", launch_arguments("vm-c"), &vim),
    );
    let responses = [a?, b?, c?];

    let mut ids = BTreeSet::new();
    for response in &responses {
        assert_eq!(
            response.status,
            InvocationStatus::Ok,
            "fault: {:?}",
            response.fault
        );
        let result = response.result.as_ref().expect("no result");
        assert_eq!(result["extendedStatus"], json!("ACTIVE"));
        ids.insert(
            result["externalId"]
                .as_str()
                .expect("externalId string")
                .to_string(),
        );
    }
    assert_eq!(ids.len(), 3);

    let response = client.call("listServer", vec![], &vim).await?;
    let servers = response.result.expect("no result");
    assert_eq!(servers.as_array().map(Vec::len), Some(3));

    plugin.cleanup().await;
    logctx.cleanup_successful();
    Ok(())
}

// A server that never leaves BUILD exhausts the polling window, and the
// caller sees that as a retryable fault rather than a hung request.
#[tokio::test]
pub async fn wait_deadline_fault() -> Result<(), anyhow::Error> {
    let logctx = test_setup_log("wait_deadline_fault");
    let sim_config = SimDriverConfig {
        wait: WaitPolicy {
            poll_interval: Duration::from_millis(10),
            poll_max: Duration::from_millis(100),
        },
        launch_target: None,
        ..Default::default()
    };
    let plugin =
        start_plugin(&logctx.log, &test_config(2), sim_config).await?;
    let vim = test_vim();

    let response = plugin
        .client
        .call("launchInstanceAndWait", launch_arguments("vm-stuck"), &vim)
        .await?;
    assert_eq!(response.status, InvocationStatus::Error);
    let fault = response.fault.expect("expected a fault");
    assert_eq!(fault.kind, FaultKind::DeadlineExceeded);
    assert!(fault.retryable);
    assert!(fault.message.contains("server_id_11"));

    plugin.cleanup().await;
    logctx.cleanup_successful();
    Ok(())
}

// With a single worker wedged and the queue full, a further request is
// refused outright; shutting down then answers everything still outstanding
// instead of hanging up on it.
#[tokio::test]
pub async fn queue_saturation_and_shutdown() -> Result<(), anyhow::Error> {
    let logctx = test_setup_log("queue_saturation_and_shutdown");
    let plugin = start_plugin(
        &logctx.log,
        &test_config(1),
        SimDriverConfig::default(),
    )
    .await?;
    let vim = test_vim();
    let addr = plugin.server.local_addr();

    // wedge the only worker
    plugin.driver.stall_next();
    let stalled = {
        let log = logctx.log.clone();
        let vim = vim.clone();
        tokio::spawn(async move {
            let client = Client::new(&addr, log);
            client.call("listNetworks", vec![], &vim).await
        })
    };
    tokio::time::sleep(Duration::from_millis(250)).await;

    // fill the queue's one slot
    let queued = {
        let log = logctx.log.clone();
        let vim = vim.clone();
        tokio::spawn(async move {
            let client = Client::new(&addr, log);
            client.call("getType", vec![], &vim).await
        })
    };
    tokio::time::sleep(Duration::from_millis(250)).await;

    // a third request has nowhere to go
    let error = plugin
        .client
        .call("listImages", vec![], &vim)
        .await
        .expect_err("expected the full queue to refuse a third request");
    let status = error
        .downcast_ref::<reqwest::Error>()
        .and_then(|error| error.status());
    assert_eq!(status, Some(reqwest::StatusCode::SERVICE_UNAVAILABLE));

    // shutdown answers both the in-flight request and the queued one with
    // a cancellation fault
    plugin.server.close().await?;
    for task in [stalled, queued] {
        let response = task.await??;
        assert_eq!(response.status, InvocationStatus::Error);
        let fault = response.fault.expect("expected a fault");
        assert_eq!(fault.kind, FaultKind::Cancelled);
        assert!(!fault.retryable);
    }

    logctx.cleanup_successful();
    Ok(())
}

#[tokio::test]
pub async fn registrar_lifecycle() -> Result<(), anyhow::Error> {
    let logctx = test_setup_log("registrar_lifecycle");
    let log = &logctx.log;
    let registrar = Registrar::start(log)?;

    let mut config = test_config(2);
    config.plugin_name = Some(String::from("alpha"));
    config.registrar_url = Some(registrar.url());
    let plugin =
        start_plugin(log, &config, SimDriverConfig::default()).await?;

    // the plugin registered itself on startup
    let registered = registrar.registered();
    assert_eq!(registered.len(), 1);
    assert_eq!(registered[0].identity.plugin_type, "test");
    assert_eq!(registered[0].identity.plugin_name, "alpha");
    assert_eq!(
        registered[0].endpoint,
        format!("http://{}", plugin.server.local_addr())
    );
    assert_eq!(registered[0].workers, 2);

    // a second server claiming the same identity is refused and winds
    // itself back down
    let second = Arc::new(SimDriver::new(
        SimDriverConfig::default(),
        Box::new(CounterIds::starting_at(11)),
        log,
    ));
    let error = Server::start(&config, second, log)
        .await
        .expect_err("second registration should fail");
    assert!(
        format!("{:#}", error).contains("already registered"),
        "unexpected error: {:#}",
        error
    );
    assert_eq!(registrar.registered().len(), 1);

    // closing the plugin withdraws the registration
    plugin.cleanup().await;
    assert!(registrar.registered().is_empty());

    registrar.close().await?;
    logctx.cleanup_successful();
    Ok(())
}

/// VIM descriptor used by every test; the simulated driver takes whatever
/// credentials it is handed
fn test_vim() -> VimInstance {
    VimInstance {
        name: String::from("test-vim"),
        vim_type: String::from("test"),
        auth_url: String::from("http://127.0.0.1:5000"),
        username: String::from("admin"),
        password: String::from("secret"),
        tenant: String::from("tenant-a"),
    }
}

/// Standalone plugin configuration with `workers` driver workers
fn test_config(workers: usize) -> Config {
    let mut config = Config::new_for_type(String::from("test"));
    config.workers = workers;
    config
}

/// Simulated-driver tunables with quick transitions and polling bounds
/// tight enough to keep the wait variants fast
fn fast_sim_config() -> SimDriverConfig {
    SimDriverConfig {
        wait: WaitPolicy {
            poll_interval: Duration::from_millis(10),
            poll_max: Duration::from_secs(5),
        },
        settle_after: Duration::from_millis(50),
        ..Default::default()
    }
}

/// Positional arguments launching `name` against the seeded fixtures
fn launch_arguments(name: &str) -> Vec<serde_json::Value> {
    vec![
        json!(name),
        json!("img_name_1"),
        json!("m1.tiny"),
        json!("default-key"),
        json!(["net_id_1"]),
        json!(["default"]),
        json!(""),
    ]
}

struct TestPlugin {
    client: Client,
    driver: Arc<SimDriver>,
    server: Server,
}

impl TestPlugin {
    async fn cleanup(self) {
        self.server.close().await.expect("failed to clean up server");
    }
}

async fn start_plugin(
    log: &Logger,
    config: &Config,
    sim_config: SimDriverConfig,
) -> Result<TestPlugin, anyhow::Error> {
    let driver = Arc::new(SimDriver::new(
        sim_config,
        Box::new(CounterIds::starting_at(11)),
        log,
    ));
    let server = Server::start(config, driver.clone(), log).await?;
    let client = Client::new(
        &server.local_addr(),
        log.new(o!("component" => "vimdriver-client")),
    );
    Ok(TestPlugin { client, driver, server })
}
