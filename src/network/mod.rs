// Network module
//
// HTTP implementations of the peer capabilities the ledger consumes:
// fetching a peer's chain and broadcasting forged blocks.

pub mod client;

pub use client::HttpPeerClient;
