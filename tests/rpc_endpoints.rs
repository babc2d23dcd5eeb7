//! Integration tests for the govchain JSON-RPC endpoint
//!
//! Each test builds a node over in-memory persistence and a manual clock,
//! then drives it only through `POST /rpc` and `GET /health`.

#![cfg(feature = "api")]

use axum_test::TestServer;
use govchain::clock::ManualClock;
use govchain::config::{ChainConfig, Config, GovernanceConfig};
use govchain::node::Node;
use govchain::persistence::InMemoryPersistence;
use govchain::rpc::build_rpc_router;
use govchain::transaction::Transaction;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const START: u64 = 1_700_000_000_000;

fn test_node() -> (Arc<Node>, ManualClock) {
    let clock = ManualClock::new(START);
    let config = Config {
        chain: ChainConfig {
            difficulty: 1,
            ..ChainConfig::default()
        },
        governance: GovernanceConfig {
            required_approvals: 2,
            authorities: vec!["auth1".into(), "auth2".into(), "auth3".into()],
            ..GovernanceConfig::default()
        },
        ..Config::default()
    };
    let node = Node::with_parts(
        config,
        Arc::new(clock.clone()),
        Arc::new(InMemoryPersistence::new()),
    )
    .expect("Failed to create node");
    (Arc::new(node), clock)
}

fn test_server(node: Arc<Node>) -> TestServer {
    TestServer::new(build_rpc_router(node)).expect("Failed to create test server")
}

async fn call(server: &TestServer, method: &str, params: Value) -> Value {
    let response = server
        .post("/rpc")
        .json(&json!({"jsonrpc": "2.0", "id": 1, "method": method, "params": params}))
        .await;
    assert_eq!(response.status_code(), 200);
    response.json()
}

async fn call_ok(server: &TestServer, method: &str, params: Value) -> Value {
    let body = call(server, method, params).await;
    assert!(
        body.get("error").is_none(),
        "{} failed: {}",
        method,
        body["error"]
    );
    body["result"].clone()
}

fn signed_transfer(from: &str, to: &str, amount: u64, timestamp: u64) -> Value {
    let mut tx = Transaction::new_at(Some(from.to_string()), to, amount, None, timestamp);
    tx.sign();
    serde_json::to_value(tx).expect("Failed to encode transaction")
}

async fn fund(server: &TestServer, to: &str, amount: u64, timestamp: u64) -> String {
    let tx = signed_transfer("GENESIS", to, amount, timestamp);
    let hash = call_ok(server, "submit", json!({ "transaction": tx })).await;
    call_ok(server, "mine", json!({ "minerAddress": "miner" })).await;
    hash.as_str().expect("hash is a string").to_string()
}

#[tokio::test]
async fn test_health_and_chain_info() {
    let (node, _) = test_node();
    let server = test_server(node);

    let response = server.get("/health").await;
    assert_eq!(response.status_code(), 200);
    let health: Value = response.json();
    assert_eq!(health["height"], 1);
    assert_eq!(health["mempoolSize"], 0);
    assert_eq!(health["role"], "miner");

    let info = call_ok(&server, "getChainInfo", Value::Null).await;
    assert_eq!(info["height"], 1);
    assert_eq!(info["difficulty"], 1);
    assert_eq!(info["isValid"], true);

    let genesis = call_ok(&server, "getBlock", json!({ "block": 0 })).await;
    assert_eq!(genesis["previousHash"], "0");
    let latest = call_ok(&server, "getBlock", json!({ "block": "latest" })).await;
    assert_eq!(latest["hash"], genesis["hash"]);
}

#[tokio::test]
async fn test_submit_mine_and_query() {
    let (node, _) = test_node();
    let server = test_server(node);

    let tx = signed_transfer("GENESIS", "alice", 250, 1);
    let hash = call_ok(&server, "submit", json!({ "transaction": tx })).await;

    let pending = call_ok(&server, "getTransaction", json!({ "hash": hash })).await;
    assert_eq!(pending["status"], "pending");
    let mempool = call_ok(&server, "getMempool", Value::Null).await;
    assert_eq!(mempool.as_array().map(Vec::len), Some(1));

    let block = call_ok(&server, "mine", json!({ "minerAddress": "miner" })).await;
    assert_eq!(block["index"], 1);
    assert_eq!(block["transactionCount"], 2);

    let committed = call_ok(&server, "getTransaction", json!({ "hash": hash })).await;
    assert_eq!(committed["status"], "committed");
    assert_eq!(committed["blockIndex"], 1);

    let balance = call_ok(&server, "getBalance", json!({ "address": "alice" })).await;
    assert_eq!(balance["balance"], 250);
    let reward = call_ok(&server, "getBalance", json!({ "address": "miner" })).await;
    assert_eq!(reward["balance"], 50);

    let valid = call_ok(&server, "validateChain", Value::Null).await;
    assert_eq!(valid["valid"], true);
}

#[tokio::test]
async fn test_protocol_errors() {
    let (node, _) = test_node();
    let server = test_server(node);

    let response = server.post("/rpc").text("{not json").await;
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], -32700);

    let body = call(&server, "noSuchMethod", Value::Null).await;
    assert_eq!(body["error"]["code"], -32601);

    let body = call(&server, "getBalance", json!({ "wrong": 1 })).await;
    assert_eq!(body["error"]["code"], -32602);

    let response = server
        .post("/rpc")
        .json(&json!({"jsonrpc": "1.0", "id": 7, "method": "getChainInfo"}))
        .await;
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], -32600);
    assert_eq!(body["id"], 7);

    let body = call(&server, "mine", json!({ "minerAddress": "miner" })).await;
    assert_eq!(body["error"]["code"], -32005);

    let body = call(&server, "getBlock", json!({ "block": 42 })).await;
    assert_eq!(body["error"]["code"], -32004);
}

#[tokio::test]
async fn test_batch_requests() {
    let (node, _) = test_node();
    let server = test_server(node);

    let response = server
        .post("/rpc")
        .json(&json!([
            {"jsonrpc": "2.0", "id": 1, "method": "getChainInfo"},
            {"jsonrpc": "2.0", "id": 2, "method": "unknown"},
        ]))
        .await;
    let body: Value = response.json();
    let responses = body.as_array().expect("batch response is an array");
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0]["id"], 1);
    assert!(responses[0]["result"].is_object());
    assert_eq!(responses[1]["error"]["code"], -32601);
}

#[tokio::test]
async fn test_overdraft_is_rejected() {
    let (node, _) = test_node();
    let server = test_server(node);

    let tx = signed_transfer("nobody", "alice", 5, 1);
    let body = call(&server, "submit", json!({ "transaction": tx })).await;
    assert_eq!(body["error"]["code"], -32006);
}

#[tokio::test]
async fn test_reversal_flow() {
    let (node, _) = test_node();
    let server = test_server(node);
    let tx_id = fund(&server, "alice", 100, 1).await;

    assert_eq!(
        call_ok(&server, "canReverse", json!({ "transactionId": tx_id })).await,
        true
    );

    let request = call_ok(
        &server,
        "requestReversal",
        json!({ "transactionId": tx_id, "requester": "GENESIS", "reason": "sent to wrong address" }),
    )
    .await;
    assert_eq!(request["status"], "pending");

    let body = call(
        &server,
        "approveReversal",
        json!({ "transactionId": tx_id, "approver": "stranger" }),
    )
    .await;
    assert_eq!(body["error"]["code"], -32001);

    let first = call_ok(
        &server,
        "approveReversal",
        json!({ "transactionId": tx_id, "approver": "auth1" }),
    )
    .await;
    assert_eq!(first["status"], "pending");
    let pending = call_ok(&server, "listPendingReversals", Value::Null).await;
    assert_eq!(pending.as_array().map(Vec::len), Some(1));
    assert_eq!(pending[0]["approvals"].as_array().map(Vec::len), Some(1));
    let second = call_ok(
        &server,
        "approveReversal",
        json!({ "transactionId": tx_id, "approver": "auth2" }),
    )
    .await;
    assert_eq!(second["status"], "executed");
    assert!(second["reversalTransactionId"].is_string());

    let stored = call_ok(&server, "getReversal", json!({ "transactionId": tx_id })).await;
    assert_eq!(stored["status"], "executed");
    let pending = call_ok(&server, "listPendingReversals", Value::Null).await;
    assert_eq!(pending.as_array().map(Vec::len), Some(0));

    call_ok(&server, "mine", json!({ "minerAddress": "miner" })).await;
    let balance = call_ok(&server, "getBalance", json!({ "address": "alice" })).await;
    assert_eq!(balance["balance"], 0);
}

#[tokio::test]
async fn test_voting_flow_applies_bound_action() {
    let (node, clock) = test_node();
    let server = test_server(node.clone());

    call_ok(&server, "registerVoter", json!({ "address": "GENESIS" })).await;
    let proposal = call_ok(
        &server,
        "createProposal",
        json!({
            "proposer": "GENESIS",
            "title": "Raise the mining reward",
            "options": ["keep", "raise"],
            "votingPeriod": "1h",
            "action": {"triggerOption": 1, "action": {"kind": "set_mining_reward", "reward": 75}},
        }),
    )
    .await;
    let proposal_id = proposal["id"].clone();
    assert_eq!(proposal["status"], "active");

    let vote = call_ok(
        &server,
        "castVote",
        json!({ "proposalId": proposal_id, "voter": "GENESIS", "optionId": 1, "weight": 5 }),
    )
    .await;
    assert_eq!(vote["weight"], 5);

    let early = call(&server, "finalizeProposal", json!({ "proposalId": proposal_id })).await;
    assert_eq!(early["error"]["code"], -32002);

    clock.advance(Duration::from_secs(3600));
    let result = call_ok(&server, "finalizeProposal", json!({ "proposalId": proposal_id })).await;
    assert_eq!(result["winningOption"]["id"], 1);
    assert_eq!(node.blockchain.read().await.mining_reward, 75);

    let fetched = call_ok(&server, "getProposal", json!({ "proposalId": proposal_id })).await;
    assert_eq!(fetched["proposal"]["status"], "finalized");
    assert_eq!(fetched["votes"].as_array().map(Vec::len), Some(1));
    assert_eq!(fetched["votes"][0]["optionId"], 1);
    let listed = call_ok(&server, "listProposals", Value::Null).await;
    assert_eq!(listed.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn test_bad_voting_period_is_invalid_params() {
    let (node, _) = test_node();
    let server = test_server(node);
    call_ok(&server, "registerVoter", json!({ "address": "GENESIS" })).await;

    let body = call(
        &server,
        "createProposal",
        json!({ "proposer": "GENESIS", "title": "t", "options": ["a", "b"], "votingPeriod": "soon" }),
    )
    .await;
    assert_eq!(body["error"]["code"], -32602);
}

#[tokio::test]
async fn test_report_blacklists_address() {
    let (node, _) = test_node();
    let server = test_server(node);
    fund(&server, "spammer", 100, 1).await;

    let report = call_ok(
        &server,
        "submitReport",
        json!({
            "reporter": "GENESIS",
            "targetType": "address",
            "targetId": "spammer",
            "category": "spam",
            "description": "floods the mempool",
        }),
    )
    .await;
    let report_id = report["id"].clone();
    assert_eq!(report["status"], "pending");

    let voted = call_ok(
        &server,
        "voteOnReport",
        json!({ "reportId": report_id, "voter": "GENESIS", "isValid": true }),
    )
    .await;
    assert_eq!(voted["status"], "pending");
    let open = call_ok(&server, "listOpenReports", Value::Null).await;
    assert_eq!(open.as_array().map(Vec::len), Some(1));
    assert_eq!(open[0]["id"], report_id);

    let moderated = call_ok(
        &server,
        "moderateReport",
        json!({ "reportId": report_id, "moderator": "auth1", "action": "approve" }),
    )
    .await;
    assert_eq!(moderated["status"], "approved");
    let open = call_ok(&server, "listOpenReports", Value::Null).await;
    assert_eq!(open.as_array().map(Vec::len), Some(0));

    let flagged = call_ok(&server, "isBlacklisted", json!({ "address": "spammer" })).await;
    assert_eq!(flagged["blacklisted"], true);

    let tx = signed_transfer("spammer", "friend", 10, 2);
    let body = call(&server, "submit", json!({ "transaction": tx })).await;
    assert_eq!(body["error"]["code"], -32001);

    let stored = call_ok(&server, "getReport", json!({ "reportId": report_id })).await;
    assert_eq!(stored["moderatorActions"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn test_export_and_import_chain() {
    let (source, _) = test_node();
    let source_server = test_server(source);
    fund(&source_server, "alice", 40, 1).await;
    let snapshot = call_ok(&source_server, "exportChain", Value::Null).await;
    assert_eq!(snapshot["chain"].as_array().map(Vec::len), Some(2));

    let (target, _) = test_node();
    let target_server = test_server(target);
    let info = call_ok(&target_server, "importChain", json!({ "snapshot": snapshot.clone() })).await;
    assert_eq!(info["height"], 2);
    let balance = call_ok(&target_server, "getBalance", json!({ "address": "alice" })).await;
    assert_eq!(balance["balance"], 40);

    let mut tampered = snapshot;
    tampered["chain"][1]["nonce"] = json!(999_999_999u64);
    let body = call(&target_server, "importChain", json!({ "snapshot": tampered })).await;
    assert_eq!(body["error"]["code"], -32003);
    let info = call_ok(&target_server, "getChainInfo", Value::Null).await;
    assert_eq!(info["height"], 2);
}
