use std::sync::{Arc, Mutex, TryLockError};

use log::{info, warn};
use thiserror::Error;

use crate::blockchain::consensus::{self, BlockBroadcaster, ChainFetcher};
use crate::blockchain::peers::PeerRegistryError;
use crate::blockchain::{Block, CancelToken, Ledger, LedgerError, PeerRegistry, Transaction};
use crate::identity::IdentityDirectory;

/// Errors surfaced by node operations
#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    PeerRegistry(#[from] PeerRegistryError),

    #[error("Unknown user id: {0}")]
    UnknownIdentity(String),

    #[error("A block is already being mined")]
    MiningInProgress,

    #[error("Mining was cancelled")]
    MiningCancelled,

    #[error("Block {0} does not extend the local chain")]
    BlockRejected(u64),
}

/// A ledger node: the ledger plus everything it needs to talk to its peers
pub struct Node {
    ledger: Ledger,
    peers: PeerRegistry,
    identities: IdentityDirectory,
    fetcher: Arc<dyn ChainFetcher>,
    broadcaster: Arc<dyn BlockBroadcaster>,

    /// Recipient of mining rewards
    node_id: String,
    mining_reward: u64,

    /// Held for the duration of a proof search
    mining: Mutex<()>,
    shutdown: CancelToken,
}

impl Node {
    pub fn new(
        ledger: Ledger,
        fetcher: Arc<dyn ChainFetcher>,
        broadcaster: Arc<dyn BlockBroadcaster>,
        node_id: String,
        mining_reward: u64,
    ) -> Self {
        Node {
            ledger,
            peers: PeerRegistry::new(),
            identities: IdentityDirectory::new(),
            fetcher,
            broadcaster,
            node_id,
            mining_reward,
            mining: Mutex::new(()),
            shutdown: CancelToken::new(),
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn peers(&self) -> &PeerRegistry {
        &self.peers
    }

    pub fn identities(&self) -> &IdentityDirectory {
        &self.identities
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Mines a block on top of the current tip and credits the reward to this node
    ///
    /// Blocks the calling thread for the whole proof search. The search stops
    /// early on shutdown or when the chain is replaced underneath it.
    pub fn mine(&self) -> Result<Block, NodeError> {
        let _guard = match self.mining.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return Err(NodeError::MiningInProgress),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };

        // Epoch first: a replacement landing before the tip read still stops the search
        let epoch = self.ledger.epoch();
        let tip = self.ledger.last_block()?;
        info!("Mining on top of block {}", tip.index);

        let proof = self
            .ledger
            .pow()
            .search_until(tip.proof, || {
                self.shutdown.is_cancelled() || self.ledger.epoch() != epoch
            })
            .ok_or(NodeError::MiningCancelled)?;

        let reward = Transaction::new_reward(self.node_id.clone(), self.mining_reward);
        let block = self.ledger.forge_on(&tip, proof, reward)?;

        info!("Mined block {} with proof {}", block.index, block.proof);
        Ok(block)
    }

    /// Sends `block` to every registered peer, best-effort
    pub async fn broadcast(&self, block: &Block) {
        let peers = self.peers.list();
        if peers.is_empty() {
            return;
        }

        self.broadcaster.notify(&peers, block).await;
    }

    /// Admits a transaction between two registered users
    ///
    /// # Returns
    ///
    /// The index of the block the transaction should land in
    pub fn submit_transaction(
        &self,
        sender_id: &str,
        recipient_id: &str,
        amount: u64,
        signature: Option<String>,
    ) -> Result<u64, NodeError> {
        let sender = self
            .identities
            .lookup(sender_id)
            .ok_or_else(|| NodeError::UnknownIdentity(sender_id.to_string()))?;
        let recipient = self
            .identities
            .lookup(recipient_id)
            .ok_or_else(|| NodeError::UnknownIdentity(recipient_id.to_string()))?;

        Ok(self.ledger.new_transaction(&sender, &recipient, amount, signature)?)
    }

    /// Registers peers, returning the full peer list afterwards
    pub fn register_peers(&self, addresses: &[String]) -> Result<Vec<String>, NodeError> {
        for address in addresses {
            if self.peers.register(address)? {
                info!("Registered peer {}", address);
            }
        }

        Ok(self.peers.list())
    }

    /// Runs consensus against the registered peers
    pub async fn resolve(&self) -> Result<bool, NodeError> {
        Ok(consensus::resolve(&self.ledger, &self.peers, self.fetcher.as_ref()).await?)
    }

    /// Applies a block pushed by a peer if it extends the local tip
    pub fn accept_block(&self, block: Block) -> Result<(), NodeError> {
        let index = block.index;
        let mut candidate = self.ledger.get_chain();
        candidate.push(block);

        if self.ledger.replace_chain(candidate)? {
            info!("Accepted block {} from a peer", index);
            Ok(())
        } else {
            warn!("Rejected block {} from a peer", index);
            Err(NodeError::BlockRejected(index))
        }
    }

    /// Stops any in-flight proof search
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
