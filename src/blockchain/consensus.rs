use async_trait::async_trait;
use futures::future::join_all;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use super::block::Block;
use super::chain::{valid_chain, Ledger, LedgerError};
use super::peers::PeerRegistry;

/// Errors that can occur while talking to a peer
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("Peer {0} is unreachable: {1}")]
    Unreachable(String, String),

    #[error("Peer {0} timed out")]
    Timeout(String),

    #[error("Peer {0} sent a bad response: {1}")]
    BadResponse(String, String),
}

/// A peer's chain as reported by the peer
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PeerChain {
    /// The blocks in the chain
    pub chain: Vec<Block>,

    /// The length of the chain
    pub length: usize,
}

/// Fetches a peer's current chain over whatever transport the node uses
#[async_trait]
pub trait ChainFetcher: Send + Sync {
    async fn fetch_chain(&self, peer: &str) -> Result<PeerChain, PeerError>;
}

/// Pushes a freshly forged block to peers
///
/// Delivery is best-effort: failures are logged per peer, never retried.
#[async_trait]
pub trait BlockBroadcaster: Send + Sync {
    async fn notify(&self, peers: &[String], block: &Block);
}

/// Applies the longest-valid-chain rule against every registered peer
///
/// Peers are queried concurrently. Unreachable peers and invalid chains are
/// skipped; only a valid chain strictly longer than the local one replaces it.
///
/// # Returns
///
/// true if the local chain was replaced
pub async fn resolve(
    ledger: &Ledger,
    peers: &PeerRegistry,
    fetcher: &dyn ChainFetcher,
) -> Result<bool, LedgerError> {
    let addresses = peers.list();
    let responses = join_all(addresses.iter().map(|peer| fetcher.fetch_chain(peer))).await;

    let mut max_length = ledger.len();
    let mut new_chain: Option<Vec<Block>> = None;

    for (peer, response) in addresses.iter().zip(responses) {
        let reported = match response {
            Ok(reported) => reported,
            Err(err) => {
                warn!("Skipping peer during resolution: {}", err);
                continue;
            }
        };

        if reported.length != reported.chain.len() {
            warn!(
                "Peer {} reported length {} for a chain of {} blocks",
                peer,
                reported.length,
                reported.chain.len()
            );
        }

        let length = reported.chain.len();
        if length <= max_length {
            continue;
        }

        if !valid_chain(&reported.chain, ledger.pow()) {
            warn!("Ignoring invalid chain of {} blocks from peer {}", length, peer);
            continue;
        }

        max_length = length;
        new_chain = Some(reported.chain);
    }

    match new_chain {
        Some(chain) => {
            let replaced = ledger.replace_chain(chain)?;
            if replaced {
                info!("Chain replaced by a peer chain of {} blocks", max_length);
            }
            Ok(replaced)
        }
        None => Ok(false),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use super::*;
    use crate::blockchain::pow::ProofOfWork;
    use crate::blockchain::storage::MemoryChainStore;
    use crate::blockchain::transaction::Transaction;

    /// Serves canned chains; peers without an entry are unreachable
    #[derive(Default)]
    pub(crate) struct FakeFetcher {
        pub chains: HashMap<String, Vec<Block>>,
    }

    #[async_trait]
    impl ChainFetcher for FakeFetcher {
        async fn fetch_chain(&self, peer: &str) -> Result<PeerChain, PeerError> {
            match self.chains.get(peer) {
                Some(chain) => Ok(PeerChain {
                    length: chain.len(),
                    chain: chain.clone(),
                }),
                None => Err(PeerError::Unreachable(peer.to_string(), "connection refused".to_string())),
            }
        }
    }

    pub(crate) fn ledger() -> Ledger {
        Ledger::open(Arc::new(MemoryChainStore::new()), ProofOfWork::new(2)).unwrap()
    }

    /// Builds a valid chain of `len` blocks on top of a fresh genesis
    pub(crate) fn valid_chain_of(len: usize) -> Vec<Block> {
        let ledger = ledger();
        while ledger.len() < len {
            let last = ledger.last_block().unwrap();
            let proof = ledger.pow().search(last.proof);
            ledger
                .forge_on(&last, proof, Transaction::new_reward("peer", 1))
                .unwrap();
        }
        ledger.get_chain()
    }

    fn registry(peers: &[&str]) -> PeerRegistry {
        let registry = PeerRegistry::new();
        for peer in peers {
            registry.register(peer).unwrap();
        }
        registry
    }

    #[tokio::test]
    async fn test_no_peers_keeps_local_chain() {
        let local = ledger();

        let replaced = resolve(&local, &PeerRegistry::new(), &FakeFetcher::default()).await.unwrap();

        assert!(!replaced);
        assert_eq!(local.len(), 1);
    }

    #[tokio::test]
    async fn test_shorter_or_equal_chains_never_replace() {
        let local = ledger();
        local.replace_chain(valid_chain_of(3)).unwrap();
        let before = local.get_chain();

        let mut fetcher = FakeFetcher::default();
        fetcher.chains.insert("a:1".to_string(), valid_chain_of(2));
        fetcher.chains.insert("b:1".to_string(), valid_chain_of(3));

        let replaced = resolve(&local, &registry(&["a:1", "b:1"]), &fetcher).await.unwrap();

        assert!(!replaced);
        assert_eq!(local.get_chain(), before);
    }

    #[tokio::test]
    async fn test_longest_valid_chain_wins() {
        let local = ledger();
        let longest = valid_chain_of(4);

        let mut fetcher = FakeFetcher::default();
        fetcher.chains.insert("a:1".to_string(), valid_chain_of(3));
        fetcher.chains.insert("b:1".to_string(), longest.clone());

        let replaced = resolve(&local, &registry(&["a:1", "b:1", "down:1"]), &fetcher).await.unwrap();

        assert!(replaced);
        assert_eq!(local.get_chain(), longest);
    }

    #[tokio::test]
    async fn test_longer_invalid_chain_is_ignored() {
        let local = ledger();
        let mut invalid = valid_chain_of(3);
        invalid[2].previous_hash = "0".repeat(64);

        let mut fetcher = FakeFetcher::default();
        fetcher.chains.insert("a:1".to_string(), invalid);

        let replaced = resolve(&local, &registry(&["a:1"]), &fetcher).await.unwrap();

        assert!(!replaced);
        assert_eq!(local.len(), 1);
    }

    #[tokio::test]
    async fn test_valid_peer_preferred_over_longer_broken_peer() {
        let local = ledger();
        local.replace_chain(valid_chain_of(4)).unwrap();

        let chain_a = valid_chain_of(5);
        let mut chain_b = valid_chain_of(7);
        chain_b[2].previous_hash = "broken".to_string();

        let mut fetcher = FakeFetcher::default();
        fetcher.chains.insert("a:1".to_string(), chain_a.clone());
        fetcher.chains.insert("b:1".to_string(), chain_b);

        let replaced = resolve(&local, &registry(&["a:1", "b:1"]), &fetcher).await.unwrap();

        assert!(replaced);
        assert_eq!(local.len(), 5);
        assert_eq!(local.get_chain(), chain_a);
    }

    #[tokio::test]
    async fn test_all_peers_unreachable() {
        let local = ledger();

        let replaced = resolve(&local, &registry(&["x:1", "y:1"]), &FakeFetcher::default()).await.unwrap();

        assert!(!replaced);
    }
}
