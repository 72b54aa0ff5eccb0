// API module
//
// This module contains the REST API exposing the node

pub mod handlers;
pub mod routes;

/// Scope every endpoint is mounted under; peers are reached at the same paths
pub const API_SCOPE: &str = "/api/v1";

// Re-export main components for easier access
pub use routes::configure_routes;
