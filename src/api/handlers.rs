use actix_web::{web, HttpResponse, Responder};
use log::error;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::blockchain::transaction::TransactionError;
use crate::blockchain::{Block, LedgerError, Transaction, Wallet};
use crate::node::{Node, NodeError};

/// Data structure for the node state
pub type NodeData = web::Data<Node>;

/// Response for the chain endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ChainResponse {
    /// The length of the chain
    pub length: usize,

    /// The blocks in the chain
    pub chain: Vec<Block>,
}

/// Request for the transaction endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct TransactionRequest {
    /// The sender's user id
    pub sender_id: String,

    /// The recipient's user id
    pub recipient_id: String,

    /// The amount to transfer
    pub amount: u64,

    /// Hex signature by the sender over `sender_key || recipient_key || amount`
    #[serde(default)]
    pub signature: String,
}

/// Response for the transaction endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct TransactionResponse {
    /// The message
    pub message: String,

    /// The index of the block that will include this transaction
    pub block_index: u64,
}

/// Response for the mine endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct MineResponse {
    pub message: String,
    pub index: u64,
    pub transactions: Vec<Transaction>,
    pub proof: u64,
    pub previous_hash: String,
}

/// Request for the register nodes endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct RegisterNodesRequest {
    /// Peer addresses, `host:port` or `http://host:port`
    pub nodes: Option<Vec<String>>,
}

/// Response for the register nodes endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct RegisterNodesResponse {
    pub message: String,
    pub total_nodes: Vec<String>,
}

/// Response for the resolve endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ResolveResponse {
    pub message: String,

    /// Whether the local chain was replaced
    pub replaced: bool,

    /// The chain after resolution
    pub chain: Vec<Block>,
}

/// Request for the register identity endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct IdentityRequest {
    pub user_id: String,

    /// Hex-encoded Ed25519 public key
    pub public_key: String,
}

/// Response for the create wallet endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct WalletResponse {
    /// The wallet's public key (hex encoded)
    pub public_key: String,

    /// The wallet's private key (hex encoded)
    pub private_key: String,
}

fn error_body(message: String) -> serde_json::Value {
    serde_json::json!({ "error": message })
}

/// Maps a node error to the response a client sees
fn error_response(err: NodeError) -> HttpResponse {
    match err {
        NodeError::Ledger(LedgerError::TransactionError(TransactionError::InvalidSignature)) => {
            HttpResponse::BadRequest().json(error_body(err.to_string()))
        }
        NodeError::UnknownIdentity(_) => HttpResponse::NotFound().json(error_body(err.to_string())),
        NodeError::PeerRegistry(_) => HttpResponse::BadRequest().json(error_body(err.to_string())),
        NodeError::MiningInProgress
        | NodeError::MiningCancelled
        | NodeError::BlockRejected(_)
        | NodeError::Ledger(LedgerError::StaleTip) => {
            HttpResponse::Conflict().json(error_body(err.to_string()))
        }
        NodeError::Ledger(_) => {
            error!("Ledger failure: {}", err);
            HttpResponse::InternalServerError().json(error_body(err.to_string()))
        }
    }
}

/// Get the full blockchain
///
/// Returns the entire blockchain and its length
#[utoipa::path(
    get,
    path = "/api/v1/chain",
    responses(
        (status = 200, description = "Blockchain retrieved successfully", body = ChainResponse)
    )
)]
pub async fn get_chain(node: NodeData) -> impl Responder {
    let chain = node.ledger().get_chain();

    HttpResponse::Ok().json(ChainResponse {
        length: chain.len(),
        chain,
    })
}

/// Check if the blockchain is valid
#[utoipa::path(
    get,
    path = "/api/v1/validate",
    responses(
        (status = 200, description = "Blockchain validation status", body = bool)
    )
)]
pub async fn validate_chain(node: NodeData) -> impl Responder {
    HttpResponse::Ok().json(node.ledger().is_valid())
}

/// Get all pending transactions
///
/// Returns all transactions waiting to be included in a block
#[utoipa::path(
    get,
    path = "/api/v1/transactions/pending",
    responses(
        (status = 200, description = "Pending transactions retrieved successfully", body = Vec<Transaction>)
    )
)]
pub async fn get_pending_transactions(node: NodeData) -> impl Responder {
    HttpResponse::Ok().json(node.ledger().get_pending_transactions())
}

/// Create a new transaction
///
/// Resolves both user ids to public keys and admits the transaction
#[utoipa::path(
    post,
    path = "/api/v1/transactions/new",
    request_body = TransactionRequest,
    responses(
        (status = 201, description = "Transaction created successfully", body = TransactionResponse),
        (status = 400, description = "Invalid transaction signature"),
        (status = 404, description = "Unknown user id")
    )
)]
pub async fn new_transaction(
    node: NodeData,
    transaction_req: web::Json<TransactionRequest>,
) -> impl Responder {
    let request = transaction_req.into_inner();
    let signature = Some(request.signature).filter(|s| !s.is_empty());

    match node.submit_transaction(&request.sender_id, &request.recipient_id, request.amount, signature) {
        Ok(block_index) => HttpResponse::Created().json(TransactionResponse {
            message: format!("Transaction will be added to Block {}", block_index),
            block_index,
        }),
        Err(err) => error_response(err),
    }
}

/// Mine a new block
///
/// Runs proof of work, rewards this node, forges the block and sends it to peers
#[utoipa::path(
    post,
    path = "/api/v1/mine",
    responses(
        (status = 200, description = "Block mined successfully", body = MineResponse),
        (status = 409, description = "Mining already in progress or chain replaced meanwhile"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn mine_block(node: NodeData) -> impl Responder {
    let miner = node.clone();

    let block = match web::block(move || miner.mine()).await {
        Ok(Ok(block)) => block,
        Ok(Err(err)) => return error_response(err),
        Err(err) => {
            error!("Mining worker failed: {}", err);
            return HttpResponse::InternalServerError().json(error_body(err.to_string()));
        }
    };

    node.broadcast(&block).await;

    HttpResponse::Ok().json(MineResponse {
        message: "New Block Forged".to_string(),
        index: block.index,
        transactions: block.transactions,
        proof: block.proof,
        previous_hash: block.previous_hash,
    })
}

/// Receive a block from a peer
///
/// The block is applied only if it extends the local chain
#[utoipa::path(
    post,
    path = "/api/v1/blocks/new",
    request_body = Block,
    responses(
        (status = 200, description = "Block accepted"),
        (status = 409, description = "Block does not extend the local chain")
    )
)]
pub async fn receive_block(node: NodeData, block: web::Json<Block>) -> impl Responder {
    match node.accept_block(block.into_inner()) {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({
            "message": "Block accepted",
            "length": node.ledger().len()
        })),
        Err(err) => error_response(err),
    }
}

/// Register peer nodes
#[utoipa::path(
    post,
    path = "/api/v1/nodes/register",
    request_body = RegisterNodesRequest,
    responses(
        (status = 201, description = "Nodes registered", body = RegisterNodesResponse),
        (status = 400, description = "Missing or invalid node list")
    )
)]
pub async fn register_nodes(
    node: NodeData,
    register_req: web::Json<RegisterNodesRequest>,
) -> impl Responder {
    let nodes = match &register_req.nodes {
        Some(nodes) => nodes,
        None => {
            return HttpResponse::BadRequest()
                .json(error_body("Please supply a valid list of nodes".to_string()));
        }
    };

    match node.register_peers(nodes) {
        Ok(total_nodes) => HttpResponse::Created().json(RegisterNodesResponse {
            message: "New nodes have been added".to_string(),
            total_nodes,
        }),
        Err(err) => error_response(err),
    }
}

/// Resolve conflicts with peers
///
/// Replaces the local chain with the longest valid peer chain, if any is longer
#[utoipa::path(
    get,
    path = "/api/v1/nodes/resolve",
    responses(
        (status = 200, description = "Resolution finished", body = ResolveResponse)
    )
)]
pub async fn resolve_conflicts(node: NodeData) -> impl Responder {
    match node.resolve().await {
        Ok(replaced) => {
            let message = if replaced {
                "Our chain was replaced"
            } else {
                "Our chain is authoritative"
            };

            HttpResponse::Ok().json(ResolveResponse {
                message: message.to_string(),
                replaced,
                chain: node.ledger().get_chain(),
            })
        }
        Err(err) => error_response(err),
    }
}

/// Register a user identity
///
/// Binds a user id to the public key its transactions are verified against
#[utoipa::path(
    post,
    path = "/api/v1/identities",
    request_body = IdentityRequest,
    responses(
        (status = 201, description = "Identity registered"),
        (status = 400, description = "Invalid public key")
    )
)]
pub async fn register_identity(
    node: NodeData,
    identity_req: web::Json<IdentityRequest>,
) -> impl Responder {
    match node.identities().register(&identity_req.user_id, &identity_req.public_key) {
        Ok(()) => HttpResponse::Created().json(serde_json::json!({
            "message": format!("Registered identity {}", identity_req.user_id)
        })),
        Err(err) => HttpResponse::BadRequest().json(error_body(err.to_string())),
    }
}

/// Create a new wallet
///
/// Creates a new wallet with a random keypair
///
/// The private key must be stored by your own
#[utoipa::path(
    post,
    path = "/api/v1/wallet/new",
    responses(
        (status = 201, description = "Wallet created successfully", body = WalletResponse)
    )
)]
pub async fn create_wallet() -> impl Responder {
    let wallet = Wallet::new();

    HttpResponse::Created().json(WalletResponse {
        public_key: wallet.public_key_hex(),
        private_key: wallet.secret_key_hex(),
    })
}
