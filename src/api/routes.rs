use actix_web::web;

use super::handlers;
use super::API_SCOPE;

/// Configures the API routes
///
/// # Arguments
///
/// * `cfg` - The service configuration
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope(API_SCOPE)
            .route("/chain", web::get().to(handlers::get_chain))
            .route("/validate", web::get().to(handlers::validate_chain))
            .route("/transactions/pending", web::get().to(handlers::get_pending_transactions))
            .route("/transactions/new", web::post().to(handlers::new_transaction))
            .route("/mine", web::post().to(handlers::mine_block))
            .route("/blocks/new", web::post().to(handlers::receive_block))
            .route("/nodes/register", web::post().to(handlers::register_nodes))
            .route("/nodes/resolve", web::get().to(handlers::resolve_conflicts))
            .route("/identities", web::post().to(handlers::register_identity))
            .route("/wallet/new", web::post().to(handlers::create_wallet))
    );
}
