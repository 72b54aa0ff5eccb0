use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use log::{info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod api;
mod blockchain;
mod config;
mod identity;
mod network;
mod node;

use blockchain::{ChainStore, Ledger, MemoryChainStore, ProofOfWork, SledChainStore};
use config::NodeConfig;
use network::HttpPeerClient;
use node::Node;

// Open the chain store, falling back to memory when the database cannot be opened
fn open_store(config: &NodeConfig) -> Arc<dyn ChainStore> {
    if config.in_memory {
        info!("Keeping the chain in memory only");
        return Arc::new(MemoryChainStore::new());
    }

    // Create data directory if it doesn't exist
    std::fs::create_dir_all(&config.data_dir).unwrap_or_else(|e| {
        warn!("Failed to create data directory: {}", e);
    });

    match SledChainStore::open(&config.data_dir) {
        Ok(store) => {
            info!("Using chain storage at {}", config.data_dir.display());
            Arc::new(store)
        }
        Err(err) => {
            warn!("Failed to open storage at {}: {}", config.data_dir.display(), err);
            warn!("Creating in-memory blockchain instead");
            Arc::new(MemoryChainStore::new())
        }
    }
}

// Build the node: load-or-genesis, peer client, bootstrap peers
fn initialize_node(config: &NodeConfig) -> anyhow::Result<Node> {
    let ledger = Ledger::open(open_store(config), ProofOfWork::new(config.difficulty))
        .context("failed to initialize the ledger")?;

    let client = Arc::new(
        HttpPeerClient::new(config.peer_timeout()).context("failed to build the peer client")?,
    );

    let node_id = config
        .node_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
    info!("Node identifier: {}", node_id);

    let node = Node::new(ledger, client.clone(), client, node_id, config.mining_reward);

    if !config.bootstrap_peers.is_empty() {
        node.register_peers(&config.bootstrap_peers)
            .context("invalid bootstrap peer")?;
    }

    Ok(node)
}

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::get_chain,
        api::handlers::validate_chain,
        api::handlers::get_pending_transactions,
        api::handlers::new_transaction,
        api::handlers::mine_block,
        api::handlers::receive_block,
        api::handlers::register_nodes,
        api::handlers::resolve_conflicts,
        api::handlers::register_identity,
        api::handlers::create_wallet
    ),
    components(
        schemas(
            blockchain::Block,
            blockchain::Transaction,
            blockchain::PeerChain,
            api::handlers::ChainResponse,
            api::handlers::TransactionRequest,
            api::handlers::TransactionResponse,
            api::handlers::MineResponse,
            api::handlers::RegisterNodesRequest,
            api::handlers::RegisterNodesResponse,
            api::handlers::ResolveResponse,
            api::handlers::IdentityRequest,
            api::handlers::WalletResponse
        )
    ),
    tags(
        (name = "ledger", description = "Ledger node API endpoints")
    ),
    info(
        title = "Ledger Node API",
        version = "1.0.0",
        description = "A proof-of-work ledger node",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
struct ApiDoc;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = NodeConfig::load().context("failed to load configuration")?;
    let node = web::Data::new(initialize_node(&config)?);
    let shutdown_handle = node.clone();

    info!("Starting HTTP server at http://{}:{}", config.host, config.port);

    // Start HTTP server
    HttpServer::new(move || {
        // Configure CORS
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        // Configure OpenAPI documentation
        let openapi = ApiDoc::openapi();

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(node.clone())
            // API routes
            .configure(api::configure_routes)
            // Swagger UI
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", openapi.clone())
            )
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await?;

    // Let a search still running on the blocking pool give up
    shutdown_handle.shutdown();
    info!("Server stopped");

    Ok(())
}
