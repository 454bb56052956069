//! End-to-end pipeline runs against a scripted JSON-RPC node.
//!
//! Run with: cargo test --test rpc_pipeline

use alloy_core::primitives::{Address, Bytes, U256};
use grantscube_deploy::{
    Artifact, ArtifactSet, BoundArtifacts, CompilerProfile, ConstructorArg, CreationTx,
    DeployErrorKind, DeploymentPlan, NetworkConfig, NetworkContext, ProfileSettings, RpcNetwork,
};
use serde_json::{Value, json};
use url::Url;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, method},
};

const SIGNER: &str = "0x5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e";
const FACTORY_TX: &str = "0x1111111111111111111111111111111111111111111111111111111111111111";
const PROJECT_TX: &str = "0x2222222222222222222222222222222222222222222222222222222222222222";
const FACTORY_ADDRESS: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
const PROJECT_ADDRESS: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

const FACTORY_ABI: &str = r#"[
    {"type":"constructor","stateMutability":"nonpayable","inputs":[{"name":"owner","type":"address","internalType":"address"}]}
]"#;

fn rpc_result(result: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "jsonrpc": "2.0",
        "id": 1,
        "result": result,
    }))
}

async fn mount(server: &MockServer, rpc_method: &str, result: Value) {
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": rpc_method })))
        .respond_with(rpc_result(result))
        .mount(server)
        .await;
}

/// A node on chain 1337 with one unlocked account.
async fn dev_node() -> MockServer {
    let server = MockServer::start().await;
    mount(&server, "eth_chainId", json!("0x539")).await;
    mount(&server, "eth_accounts", json!([SIGNER])).await;
    mount(&server, "eth_getBalance", json!("0xde0b6b3a7640000")).await;
    server
}

/// Accept exactly one creation transaction, answering with `tx_hash`.
async fn accept_once(server: &MockServer, tx_hash: &str) {
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "eth_sendTransaction" })))
        .respond_with(rpc_result(json!(tx_hash)))
        .up_to_n_times(1)
        .expect(1)
        .mount(server)
        .await;
}

async fn receipt(server: &MockServer, tx_hash: &str, result: Value) {
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "method": "eth_getTransactionReceipt",
            "params": [tx_hash],
        })))
        .respond_with(rpc_result(result))
        .mount(server)
        .await;
}

fn mined(contract_address: &str, block: &str) -> Value {
    json!({
        "status": "0x1",
        "contractAddress": contract_address,
        "blockNumber": block,
    })
}

fn network_config(server: &MockServer) -> NetworkConfig {
    let mut config = NetworkConfig::new(1337, Url::parse(&server.uri()).unwrap());
    config.confirmation_timeout_secs = 1;
    config.poll_interval_ms = 50;
    config
}

fn artifacts() -> BoundArtifacts {
    let profile = CompilerProfile::new(ProfileSettings::default()).unwrap();
    let bytecode = Bytes::from_static(&[0x60, 0x80, 0x60, 0x40]);
    ArtifactSet::new(
        [
            Artifact::new(
                "GrantsCubeNFTFactory",
                serde_json::from_str(FACTORY_ABI).unwrap(),
                bytecode.clone(),
            ),
            Artifact::new("ProjectFactory", serde_json::from_str("[]").unwrap(), bytecode),
        ],
        Some(profile.clone()),
    )
    .bind(&profile)
    .unwrap()
}

fn plan(artifacts: &BoundArtifacts) -> DeploymentPlan {
    DeploymentPlan::builder(artifacts)
        .step("GrantsCubeNFTFactory", [ConstructorArg::Signer])
        .unwrap()
        .step("ProjectFactory", [])
        .unwrap()
        .build()
        .unwrap()
}

/// Bodies of every `eth_sendTransaction` request the node received.
async fn sent_transactions(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter_map(|request| serde_json::from_slice::<Value>(&request.body).ok())
        .filter(|body| body["method"] == "eth_sendTransaction")
        .map(|body| body["params"][0].clone())
        .collect()
}

#[tokio::test]
async fn test_deploys_every_step_in_order() {
    let server = dev_node().await;
    accept_once(&server, FACTORY_TX).await;
    accept_once(&server, PROJECT_TX).await;
    receipt(&server, FACTORY_TX, mined(FACTORY_ADDRESS, "0x5")).await;
    receipt(&server, PROJECT_TX, mined(PROJECT_ADDRESS, "0x6")).await;

    let network = RpcNetwork::connect(&network_config(&server)).await.unwrap();
    assert_eq!(network.chain_id(), 1337);

    let artifacts = artifacts();
    let ledger = plan(&artifacts).execute(&network).await.unwrap();

    assert_eq!(
        ledger.kinds().collect::<Vec<_>>(),
        vec!["GrantsCubeNFTFactory", "ProjectFactory"]
    );
    assert_eq!(
        ledger.address_of("GrantsCubeNFTFactory"),
        Some(FACTORY_ADDRESS.parse::<Address>().unwrap())
    );
    let project = ledger.get("ProjectFactory").unwrap();
    assert_eq!(project.address, PROJECT_ADDRESS.parse::<Address>().unwrap());
    assert_eq!(project.confirmed_at_block, Some(6));

    let sent = sent_transactions(&server).await;
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0]["from"].as_str().unwrap().to_lowercase(), SIGNER);
    // The factory's constructor receives the signer address.
    assert!(
        sent[0]["data"]
            .as_str()
            .unwrap()
            .ends_with(SIGNER.trim_start_matches("0x"))
    );
    assert_eq!(sent[1]["data"], "0x60806040");
}

#[tokio::test]
async fn test_chain_id_mismatch_is_rejected_on_connect() {
    let server = dev_node().await;
    let mut config = network_config(&server);
    config.chain_id = 11155111;

    let err = RpcNetwork::connect(&config).await.unwrap_err();

    assert_eq!(err.kind(), DeployErrorKind::Configuration);
    assert!(sent_transactions(&server).await.is_empty());
}

#[tokio::test]
async fn test_reverted_step_aborts_with_partial_ledger() {
    let server = dev_node().await;
    accept_once(&server, FACTORY_TX).await;
    accept_once(&server, PROJECT_TX).await;
    receipt(&server, FACTORY_TX, mined(FACTORY_ADDRESS, "0x5")).await;
    receipt(
        &server,
        PROJECT_TX,
        json!({ "status": "0x0", "contractAddress": null, "blockNumber": "0x6" }),
    )
    .await;

    let network = RpcNetwork::connect(&network_config(&server)).await.unwrap();
    let artifacts = artifacts();
    let failure = plan(&artifacts).execute(&network).await.unwrap_err();

    assert_eq!(failure.step, 1);
    assert_eq!(failure.kind, "ProjectFactory");
    assert_eq!(failure.error.kind(), DeployErrorKind::DeploymentRejected);
    assert_eq!(failure.ledger.kinds().collect::<Vec<_>>(), vec!["GrantsCubeNFTFactory"]);
}

#[tokio::test]
async fn test_missing_receipt_times_out_without_resubmitting() {
    let server = dev_node().await;
    accept_once(&server, FACTORY_TX).await;
    receipt(&server, FACTORY_TX, Value::Null).await;

    let network = RpcNetwork::connect(&network_config(&server)).await.unwrap();
    let artifacts = artifacts();
    let failure = plan(&artifacts).execute(&network).await.unwrap_err();

    assert_eq!(failure.step, 0);
    assert_eq!(failure.error.kind(), DeployErrorKind::ConfirmationTimeout);
    assert!(failure.ledger.is_empty());
    assert_eq!(sent_transactions(&server).await.len(), 1);
}

#[tokio::test]
async fn test_node_without_accounts_has_no_signer() {
    let server = MockServer::start().await;
    mount(&server, "eth_chainId", json!("0x539")).await;
    mount(&server, "eth_accounts", json!([])).await;

    let network = RpcNetwork::connect(&network_config(&server)).await.unwrap();
    let artifacts = artifacts();
    let failure = plan(&artifacts).execute(&network).await.unwrap_err();

    assert_eq!(failure.error.kind(), DeployErrorKind::NoSignerAvailable);
    assert!(failure.ledger.is_empty());
    assert!(sent_transactions(&server).await.is_empty());
}

#[tokio::test]
async fn test_configured_sender_skips_account_lookup() {
    let server = dev_node().await;
    let mut config = network_config(&server);
    let from: Address = "0x7777777777777777777777777777777777777777".parse().unwrap();
    config.from = Some(from);

    let network = RpcNetwork::connect(&config).await.unwrap();

    assert_eq!(network.current_signer().await.unwrap().address(), from);
    let requests = server.received_requests().await.unwrap_or_default();
    assert!(
        requests
            .iter()
            .filter_map(|r| serde_json::from_slice::<Value>(&r.body).ok())
            .all(|body| body["method"] != "eth_accounts")
    );
}

#[tokio::test]
async fn test_deploy_contract_waits_for_receipt() {
    let server = dev_node().await;
    accept_once(&server, PROJECT_TX).await;
    receipt(&server, PROJECT_TX, mined(PROJECT_ADDRESS, "0x9")).await;

    let network = RpcNetwork::connect(&network_config(&server)).await.unwrap();
    let from = network.current_signer().await.unwrap();
    let init_code = Bytes::from_static(&[0x60, 0x80, 0x60, 0x40]);

    let result = network
        .deploy_contract(CreationTx {
            kind: "ProjectFactory",
            constructor_args: &[],
            init_code: &init_code,
            from,
        })
        .await
        .unwrap();

    assert_eq!(result.kind, "ProjectFactory");
    assert_eq!(result.address, PROJECT_ADDRESS.parse::<Address>().unwrap());
    assert_eq!(result.confirmed_at_block, Some(9));
    assert_eq!(result.tx_hash.map(|hash| hash.to_string()).as_deref(), Some(PROJECT_TX));
    assert_eq!(sent_transactions(&server).await.len(), 1);
}

#[tokio::test]
async fn test_account_balance_is_repeatable_and_sends_nothing() {
    let server = dev_node().await;

    let network = RpcNetwork::connect(&network_config(&server)).await.unwrap();
    let signer = network.current_signer().await.unwrap();

    let first = network.account_balance(&signer).await.unwrap();
    let second = network.account_balance(&signer).await.unwrap();

    assert_eq!(first, U256::from(1_000_000_000_000_000_000u64));
    assert_eq!(first, second);
    assert!(sent_transactions(&server).await.is_empty());
}
