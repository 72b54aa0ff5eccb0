// Blockchain module
//
// This module contains the ledger engine:
// - Block structure and digest
// - Proof of work algorithm
// - Transaction structure and signature checks
// - Ledger owning the chain and the pending pool
// - Peer registry and longest-valid-chain consensus
// - Chain storage

pub mod block;
pub mod chain;
pub mod consensus;
pub mod crypto;
pub mod peers;
pub mod pow;
pub mod storage;
pub mod transaction;

// Re-export main components for easier access
pub use block::Block;
pub use chain::{Ledger, LedgerError};
pub use consensus::{BlockBroadcaster, ChainFetcher, PeerChain, PeerError};
pub use crypto::Wallet;
pub use peers::PeerRegistry;
pub use pow::{CancelToken, ProofOfWork};
pub use storage::{ChainStore, MemoryChainStore, SledChainStore};
pub use transaction::Transaction;
