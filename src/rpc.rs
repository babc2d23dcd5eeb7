//! JSON-RPC 2.0 endpoint for govchain
//!
//! A single `POST /rpc` route dispatches to chain and governance operations.
//! Every failure becomes a JSON-RPC error object; a bad request never takes
//! the server down.

use axum::{
    extract::{Request, State},
    http,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{debug, info, warn};

use crate::blockchain::{Block, BlockRef, ChainSnapshot, TransactionLocation};
use crate::clock::duration_millis;
use crate::error::ChainError;
use crate::governance::{BoundAction, ModerationAction, NewReport};
use crate::node::Node;
use crate::transaction::Transaction;

pub const JSONRPC_VERSION: &str = "2.0";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
}

impl From<ChainError> for RpcErrorObject {
    fn from(err: ChainError) -> Self {
        RpcErrorObject {
            code: err.rpc_code(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorObject>,
}

impl RpcResponse {
    fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    fn failure(id: Value, error: RpcErrorObject) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

fn rpc_error(code: i64, message: impl Into<String>) -> RpcErrorObject {
    RpcErrorObject {
        code,
        message: message.into(),
    }
}

fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, RpcErrorObject> {
    // methods without arguments may omit params entirely
    let params = if params.is_null() { json!({}) } else { params };
    serde_json::from_value(params)
        .map_err(|e| rpc_error(INVALID_PARAMS, format!("Invalid params: {}", e)))
}

fn to_value<T: Serialize>(value: T) -> Result<Value, RpcErrorObject> {
    serde_json::to_value(value).map_err(|e| rpc_error(INTERNAL_ERROR, e.to_string()))
}

// ============================================================================
// Params
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitParams {
    transaction: Transaction,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MineParams {
    miner_address: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetBlockParams {
    block: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddressParams {
    address: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HashParams {
    hash: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportParams {
    snapshot: ChainSnapshot,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionIdParams {
    transaction_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestReversalParams {
    transaction_id: String,
    requester: String,
    reason: String,
    #[serde(default)]
    evidence: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApproveReversalParams {
    transaction_id: String,
    approver: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RejectReversalParams {
    transaction_id: String,
    rejecter: String,
    #[serde(default)]
    reason: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateProposalParams {
    proposer: String,
    title: String,
    #[serde(default)]
    description: String,
    options: Vec<String>,
    /// Human duration such as `"3d"`; the configured default when absent.
    #[serde(default)]
    voting_period: Option<String>,
    #[serde(default)]
    action: Option<BoundAction>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CastVoteParams {
    proposal_id: String,
    voter: String,
    option_id: usize,
    #[serde(default = "default_weight")]
    weight: u64,
}

fn default_weight() -> u64 {
    1
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProposalIdParams {
    proposal_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModerateReportParams {
    report_id: String,
    moderator: String,
    action: ModerationAction,
    #[serde(default)]
    notes: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VoteOnReportParams {
    report_id: String,
    voter: String,
    is_valid: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportIdParams {
    report_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockSummary {
    pub index: u64,
    pub hash: String,
    pub previous_hash: String,
    pub nonce: u64,
    pub timestamp: u64,
    pub transaction_count: usize,
}

impl From<&Block> for BlockSummary {
    fn from(block: &Block) -> Self {
        Self {
            index: block.index,
            hash: block.hash.clone(),
            previous_hash: block.previous_hash.clone(),
            nonce: block.nonce,
            timestamp: block.timestamp,
            transaction_count: block.transactions.len(),
        }
    }
}

fn parse_block_ref(value: &Value) -> Result<BlockRef, RpcErrorObject> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .map(BlockRef::Index)
            .ok_or_else(|| rpc_error(INVALID_PARAMS, "Block index must be a non-negative integer")),
        Value::String(s) => s.parse::<BlockRef>().map_err(RpcErrorObject::from),
        _ => Err(rpc_error(
            INVALID_PARAMS,
            "Block must be an index, a hash or 'latest'",
        )),
    }
}

// ============================================================================
// Dispatch
// ============================================================================

/// Runs one method against the node.
pub async fn dispatch(node: &Node, method: &str, params: Value) -> Result<Value, RpcErrorObject> {
    match method {
        // Chain
        "submit" => {
            let p: SubmitParams = parse_params(params)?;
            let governance = node.governance.read().await;
            let mut chain = node.blockchain.write().await;
            let hash = governance.submit_transaction(&mut chain, p.transaction)?;
            Ok(json!(hash))
        }
        "mine" => {
            let p: MineParams = parse_params(params)?;
            let block = node.mine(&p.miner_address).await?;
            to_value(BlockSummary::from(&block))
        }
        "getBlock" => {
            let p: GetBlockParams = parse_params(params)?;
            let block_ref = parse_block_ref(&p.block)?;
            let chain = node.blockchain.read().await;
            let block = chain
                .get_block(&block_ref)
                .ok_or_else(|| ChainError::NotFound(format!("Block {:?}", block_ref)))?;
            to_value(block)
        }
        "getBalance" => {
            let p: AddressParams = parse_params(params)?;
            let balance = node.blockchain.read().await.get_balance(&p.address);
            Ok(json!({ "address": p.address, "balance": balance }))
        }
        "getChainInfo" => to_value(node.blockchain.read().await.chain_info()),
        "validateChain" => Ok(json!({ "valid": node.validate().await })),
        "getMempool" => to_value(node.blockchain.read().await.mempool.get_all_transactions()),
        "getTransaction" => {
            let p: HashParams = parse_params(params)?;
            let chain = node.blockchain.read().await;
            match chain.find_transaction(&p.hash) {
                Some(TransactionLocation::Committed { transaction, block }) => Ok(json!({
                    "transaction": transaction,
                    "status": "committed",
                    "blockIndex": block.index,
                })),
                Some(TransactionLocation::Pending(transaction)) => Ok(json!({
                    "transaction": transaction,
                    "status": "pending",
                })),
                None => Err(ChainError::NotFound(format!("Transaction {}", p.hash)).into()),
            }
        }
        "exportChain" => to_value(node.blockchain.read().await.export_snapshot()),
        "importChain" => {
            let p: ImportParams = parse_params(params)?;
            node.import_chain(p.snapshot).await?;
            to_value(node.blockchain.read().await.chain_info())
        }

        // Reversal
        "requestReversal" => {
            let p: RequestReversalParams = parse_params(params)?;
            let result = {
                let mut governance = node.governance.write().await;
                let mut chain = node.blockchain.write().await;
                governance.reversal.request_reversal(
                    &mut chain,
                    &p.transaction_id,
                    &p.requester,
                    &p.reason,
                    p.evidence,
                )?
            };
            node.checkpoint_governance().await;
            to_value(result)
        }
        "approveReversal" => {
            let p: ApproveReversalParams = parse_params(params)?;
            let result = {
                let mut governance = node.governance.write().await;
                let mut chain = node.blockchain.write().await;
                governance
                    .reversal
                    .approve_reversal(&mut chain, &p.transaction_id, &p.approver)?
            };
            node.checkpoint_governance().await;
            to_value(result)
        }
        "rejectReversal" => {
            let p: RejectReversalParams = parse_params(params)?;
            let result = {
                let mut governance = node.governance.write().await;
                let chain = node.blockchain.read().await;
                governance
                    .reversal
                    .reject_reversal(&chain, &p.transaction_id, &p.rejecter, &p.reason)?
            };
            node.checkpoint_governance().await;
            to_value(result)
        }
        "canReverse" => {
            let p: TransactionIdParams = parse_params(params)?;
            let governance = node.governance.read().await;
            let chain = node.blockchain.read().await;
            Ok(json!(governance.reversal.can_reverse(&chain, &p.transaction_id)))
        }
        "getReversal" => {
            let p: TransactionIdParams = parse_params(params)?;
            let governance = node.governance.read().await;
            let request = governance
                .reversal
                .get_request(&p.transaction_id)
                .ok_or_else(|| {
                    ChainError::NotFound(format!("Reversal request for {}", p.transaction_id))
                })?;
            to_value(request)
        }
        "listPendingReversals" => {
            let governance = node.governance.read().await;
            let pending: Vec<_> = governance.reversal.pending_requests().collect();
            to_value(pending)
        }

        // Voting
        "registerVoter" => {
            let p: AddressParams = parse_params(params)?;
            {
                let mut governance = node.governance.write().await;
                let chain = node.blockchain.read().await;
                governance.voting.register_voter(&chain, &p.address)?;
            }
            node.checkpoint_governance().await;
            Ok(json!({ "address": p.address, "registered": true }))
        }
        "createProposal" => {
            let p: CreateProposalParams = parse_params(params)?;
            let voting_period = p
                .voting_period
                .as_deref()
                .map(humantime::parse_duration)
                .transpose()
                .map_err(|e| rpc_error(INVALID_PARAMS, format!("Invalid votingPeriod: {}", e)))?;
            let proposal = {
                let mut governance = node.governance.write().await;
                let mut chain = node.blockchain.write().await;
                governance.voting.create_proposal(
                    &mut chain,
                    &p.proposer,
                    &p.title,
                    &p.description,
                    p.options,
                    voting_period,
                    p.action,
                )?
            };
            node.checkpoint_governance().await;
            to_value(proposal)
        }
        "castVote" => {
            let p: CastVoteParams = parse_params(params)?;
            let vote = {
                let mut governance = node.governance.write().await;
                let mut chain = node.blockchain.write().await;
                governance
                    .voting
                    .cast_vote(&mut chain, &p.proposal_id, &p.voter, p.option_id, p.weight)?
            };
            node.checkpoint_governance().await;
            to_value(vote)
        }
        "finalizeProposal" => {
            let p: ProposalIdParams = parse_params(params)?;
            let result = {
                let mut governance = node.governance.write().await;
                let mut chain = node.blockchain.write().await;
                governance.finalize_proposal(&mut chain, &p.proposal_id)?
            };
            node.checkpoint_governance().await;
            to_value(result)
        }
        "getProposal" => {
            let p: ProposalIdParams = parse_params(params)?;
            let now = node.blockchain.read().await.now_millis();
            let governance = node.governance.read().await;
            let proposal = governance
                .voting
                .get_proposal(&p.proposal_id, now)
                .ok_or_else(|| ChainError::NotFound(format!("Proposal {}", p.proposal_id)))?;
            let result = governance.voting.get_result(&p.proposal_id);
            let votes = governance.voting.get_votes(&p.proposal_id);
            Ok(json!({ "proposal": proposal, "result": result, "votes": votes }))
        }
        "listProposals" => {
            let now = node.blockchain.read().await.now_millis();
            to_value(node.governance.read().await.voting.list_proposals(now))
        }

        // Reports
        "submitReport" => {
            let p: NewReport = parse_params(params)?;
            let report = {
                let mut governance = node.governance.write().await;
                let mut chain = node.blockchain.write().await;
                governance.report.submit_report(&mut chain, p)?
            };
            node.checkpoint_governance().await;
            to_value(report)
        }
        "moderateReport" => {
            let p: ModerateReportParams = parse_params(params)?;
            let report = {
                let mut governance = node.governance.write().await;
                let mut chain = node.blockchain.write().await;
                governance.report.moderate_report(
                    &mut chain,
                    &p.report_id,
                    &p.moderator,
                    p.action,
                    p.notes,
                )?
            };
            node.checkpoint_governance().await;
            to_value(report)
        }
        "voteOnReport" => {
            let p: VoteOnReportParams = parse_params(params)?;
            let report = {
                let mut governance = node.governance.write().await;
                let chain = node.blockchain.read().await;
                governance
                    .report
                    .vote_on_report(&chain, &p.report_id, &p.voter, p.is_valid)?
            };
            node.checkpoint_governance().await;
            to_value(report)
        }
        "getReport" => {
            let p: ReportIdParams = parse_params(params)?;
            let governance = node.governance.read().await;
            let report = governance
                .report
                .get_report(&p.report_id)
                .ok_or_else(|| ChainError::NotFound(format!("Report {}", p.report_id)))?;
            to_value(report)
        }
        "listOpenReports" => to_value(node.governance.read().await.report.open_reports()),
        "isBlacklisted" => {
            let p: AddressParams = parse_params(params)?;
            let blacklisted = node.governance.read().await.report.is_blacklisted(&p.address);
            Ok(json!({ "address": p.address, "blacklisted": blacklisted }))
        }

        other => Err(rpc_error(
            METHOD_NOT_FOUND,
            format!("Method not found: {}", other),
        )),
    }
}

async fn handle_single(node: &Node, raw: Value) -> RpcResponse {
    let request: RpcRequest = match serde_json::from_value(raw) {
        Ok(request) => request,
        Err(e) => {
            return RpcResponse::failure(
                Value::Null,
                rpc_error(INVALID_REQUEST, format!("Invalid request: {}", e)),
            )
        }
    };
    if request.jsonrpc != JSONRPC_VERSION {
        return RpcResponse::failure(
            request.id,
            rpc_error(INVALID_REQUEST, "jsonrpc must be \"2.0\""),
        );
    }

    let start = Instant::now();
    let outcome = dispatch(node, &request.method, request.params).await;
    let duration_ms = duration_millis(start.elapsed());
    match outcome {
        Ok(result) => {
            info!(method = %request.method, duration_ms, "rpc.ok");
            RpcResponse::success(request.id, result)
        }
        Err(error) => {
            warn!(
                method = %request.method,
                duration_ms,
                code = error.code,
                message = %error.message,
                "rpc.error"
            );
            RpcResponse::failure(request.id, error)
        }
    }
}

/// Accepts a single request or a batch.
async fn rpc_handler(State(node): State<Arc<Node>>, body: String) -> Json<Value> {
    let parsed: Value = match serde_json::from_str(&body) {
        Ok(value) => value,
        Err(e) => {
            let response = RpcResponse::failure(
                Value::Null,
                rpc_error(PARSE_ERROR, format!("Parse error: {}", e)),
            );
            return Json(json!(response));
        }
    };

    match parsed {
        Value::Array(batch) if batch.is_empty() => Json(json!(RpcResponse::failure(
            Value::Null,
            rpc_error(INVALID_REQUEST, "Empty batch"),
        ))),
        Value::Array(batch) => {
            let mut responses = Vec::with_capacity(batch.len());
            for raw in batch {
                responses.push(handle_single(&node, raw).await);
            }
            Json(json!(responses))
        }
        single => Json(json!(handle_single(&node, single).await)),
    }
}

async fn health_check(State(node): State<Arc<Node>>) -> Json<Value> {
    let chain = node.blockchain.read().await;
    Json(json!({
        "status": node.node_state().await,
        "height": chain.height(),
        "mempoolSize": chain.mempool.len(),
        "role": format!("{:?}", node.config.node.role).to_lowercase(),
    }))
}

/// Logs method, path, status, duration and current `NodeState`.
async fn logging_middleware(State(node): State<Arc<Node>>, req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    let duration = start.elapsed();
    let status = response.status();
    let node_state = node.node_state().await;

    debug!(
        method = %method,
        path = %path,
        status = %status.as_u16(),
        duration_ms = %duration.as_millis(),
        node_state = ?node_state,
        "http.request"
    );

    response
}

/// Build the RPC router (also used by tests).
pub fn build_rpc_router(node: Arc<Node>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(vec![
            http::Method::GET,
            http::Method::POST,
            http::Method::OPTIONS,
        ])
        .allow_headers(vec![http::header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    Router::new()
        .route("/rpc", post(rpc_handler))
        .route("/health", get(health_check))
        .layer(middleware::from_fn_with_state(node.clone(), logging_middleware))
        .with_state(node)
        .layer(cors)
}

pub async fn serve(node: Arc<Node>, port: u16) -> Result<(), ChainError> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ChainError::ConfigError(format!("RPC port {} unavailable: {}", port, e)))?;
    info!("JSON-RPC server listening on {}", addr);

    axum::serve(listener, build_rpc_router(node))
        .await
        .map_err(|e| ChainError::PersistenceError(format!("RPC server failed: {}", e)))
}
