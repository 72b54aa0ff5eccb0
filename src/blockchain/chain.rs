use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{error, info, warn};
use thiserror::Error;

use super::block::Block;
use super::pow::ProofOfWork;
use super::storage::{ChainStore, StorageError};
use super::transaction::{Transaction, TransactionError};

/// Errors that can occur during ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Transaction error: {0}")]
    TransactionError(#[from] TransactionError),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    /// Genesis is created on initialization, so this is a broken invariant
    #[error("Chain holds no blocks")]
    EmptyChain,

    #[error("Invalid chain: {0}")]
    InvalidChain(String),

    /// The chain moved on while a proof was being searched
    #[error("Chain tip changed since mining started")]
    StaleTip,
}

/// Checks hash linkage, proof linkage and index contiguity of `chain`.
///
/// Empty and single-block chains are trivially valid.
pub fn valid_chain(chain: &[Block], pow: &ProofOfWork) -> bool {
    for (position, pair) in chain.windows(2).enumerate() {
        let (last_block, block) = (&pair[0], &pair[1]);

        if block.previous_hash != last_block.digest() {
            warn!("Block {} does not link to the digest of its predecessor", block.index);
            return false;
        }

        if !pow.valid(last_block.proof, block.proof) {
            warn!("Block {} carries an invalid proof", block.index);
            return false;
        }

        if last_block.index != position as u64 + 1 || block.index != last_block.index + 1 {
            warn!("Block {} is out of sequence", block.index);
            return false;
        }
    }

    true
}

/// Owner of the chain and the pending transaction pool
///
/// The chain and the pool sit behind separate locks. Whenever both are held,
/// the chain lock is taken first.
pub struct Ledger {
    /// The chain of blocks
    chain: Mutex<Vec<Block>>,

    /// Pending transactions to be included in the next block
    pending_transactions: Mutex<Vec<Transaction>>,

    /// Number of wholesale chain replacements so far
    epoch: AtomicU64,

    /// Proof-of-work rules used to validate chains
    pow: ProofOfWork,

    /// Storage for the chain
    store: Arc<dyn ChainStore>,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("pow", &self.pow)
            .field("epoch", &self.epoch)
            .finish()
    }
}

impl Ledger {
    /// Opens the ledger from `store`, creating the genesis block when the store is empty
    ///
    /// # Arguments
    ///
    /// * `store` - Where the chain is loaded from and saved to
    /// * `pow` - The proof-of-work rules for this chain
    pub fn open(store: Arc<dyn ChainStore>, pow: ProofOfWork) -> Result<Self, LedgerError> {
        let mut chain = store.load()?;

        if chain.is_empty() {
            info!("No existing chain found in storage, creating genesis block");
            chain.push(Block::genesis());
            store.save(&chain)?;
        } else if !valid_chain(&chain, &pow) {
            return Err(LedgerError::InvalidChain(
                "stored chain failed validation".to_string(),
            ));
        } else {
            info!("Loaded chain of {} blocks from storage", chain.len());
        }

        Ok(Ledger {
            chain: Mutex::new(chain),
            pending_transactions: Mutex::new(Vec::new()),
            epoch: AtomicU64::new(0),
            pow,
            store,
        })
    }

    fn lock_chain(&self) -> MutexGuard<'_, Vec<Block>> {
        self.chain.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_pending(&self) -> MutexGuard<'_, Vec<Transaction>> {
        self.pending_transactions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn pow(&self) -> &ProofOfWork {
        &self.pow
    }

    /// Gets the last block in the chain
    pub fn last_block(&self) -> Result<Block, LedgerError> {
        self.lock_chain().last().cloned().ok_or(LedgerError::EmptyChain)
    }

    /// Admits a transaction into the pending pool
    ///
    /// Rewards (sender "0") and unsigned transactions are admitted as they
    /// are; anything else must carry a valid signature from the sender.
    ///
    /// # Returns
    ///
    /// The index of the next block to be forged. This is informational only:
    /// other admissions or a chain replacement can make it stale.
    pub fn new_transaction(
        &self,
        sender: &str,
        recipient: &str,
        amount: u64,
        signature: Option<String>,
    ) -> Result<u64, LedgerError> {
        let transaction = Transaction::new(sender, recipient, amount, signature);

        if !transaction.skips_verification() {
            transaction.verify_signature()?;
        }

        let next_index = self.last_block()?.index + 1;
        self.lock_pending().push(transaction);

        Ok(next_index)
    }

    /// Forges a block from the pending pool and appends it to the chain
    ///
    /// # Arguments
    ///
    /// * `proof` - The proof of work for the new block
    /// * `previous_hash` - Digest of the previous block, defaults to the digest of the current tip
    pub fn new_block(&self, proof: u64, previous_hash: Option<String>) -> Result<Block, LedgerError> {
        let mut chain = self.lock_chain();
        self.forge(&mut chain, proof, previous_hash)
    }

    /// Forges a mined block, provided the tip is still the block the proof was searched against
    ///
    /// The reward is admitted and the block forged under the chain lock, so a
    /// concurrent replacement either happens before (and the call fails with
    /// [`LedgerError::StaleTip`]) or after.
    pub fn forge_on(&self, tip: &Block, proof: u64, reward: Transaction) -> Result<Block, LedgerError> {
        let mut chain = self.lock_chain();

        match chain.last() {
            Some(last) if last == tip => {}
            Some(_) => return Err(LedgerError::StaleTip),
            None => return Err(LedgerError::EmptyChain),
        }

        self.lock_pending().push(reward);
        self.forge(&mut chain, proof, Some(tip.digest()))
    }

    fn forge(
        &self,
        chain: &mut Vec<Block>,
        proof: u64,
        previous_hash: Option<String>,
    ) -> Result<Block, LedgerError> {
        let previous_hash = match previous_hash {
            Some(hash) => hash,
            None => chain.last().ok_or(LedgerError::EmptyChain)?.digest(),
        };

        let transactions = std::mem::take(&mut *self.lock_pending());
        let block = Block::new(chain.len() as u64 + 1, transactions, proof, previous_hash);

        chain.push(block.clone());

        // The in-memory chain stays ahead of storage if this save fails.
        if let Err(err) = self.store.save(chain.as_slice()) {
            error!("Block {} forged but not persisted: {}", block.index, err);
            return Err(err.into());
        }

        info!("Forged block {} with {} transactions", block.index, block.transactions.len());

        Ok(block)
    }

    /// Replaces the chain with `candidate` if it is strictly longer and valid
    ///
    /// The swap happens under the chain lock, so readers observe either the old
    /// chain or the new one. The pending pool is left untouched.
    ///
    /// # Returns
    ///
    /// true if the chain was replaced
    pub fn replace_chain(&self, candidate: Vec<Block>) -> Result<bool, LedgerError> {
        let mut chain = self.lock_chain();

        if candidate.len() <= chain.len() || !valid_chain(&candidate, &self.pow) {
            return Ok(false);
        }

        self.store.save(&candidate)?;

        info!("Replacing chain of {} blocks with chain of {} blocks", chain.len(), candidate.len());
        *chain = candidate;
        self.epoch.fetch_add(1, Ordering::SeqCst);

        Ok(true)
    }

    /// Gets the number of chain replacements since the ledger was opened
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Gets the entire chain
    pub fn get_chain(&self) -> Vec<Block> {
        self.lock_chain().clone()
    }

    /// Gets the number of blocks in the chain
    pub fn len(&self) -> usize {
        self.lock_chain().len()
    }

    /// Gets all pending transactions
    pub fn get_pending_transactions(&self) -> Vec<Transaction> {
        self.lock_pending().clone()
    }

    /// Validates the local chain
    pub fn is_valid(&self) -> bool {
        valid_chain(&self.lock_chain(), &self.pow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::block::{GENESIS_PREVIOUS_HASH, GENESIS_PROOF};
    use crate::blockchain::crypto::Wallet;
    use crate::blockchain::storage::{MemoryChainStore, SledChainStore};

    fn test_ledger() -> Ledger {
        Ledger::open(Arc::new(MemoryChainStore::new()), ProofOfWork::new(2)).unwrap()
    }

    fn mine(ledger: &Ledger) -> Block {
        let last = ledger.last_block().unwrap();
        let proof = ledger.pow().search(last.proof);
        ledger.new_block(proof, None).unwrap()
    }

    #[test]
    fn test_new_ledger_has_genesis() {
        let ledger = test_ledger();
        let chain = ledger.get_chain();

        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].index, 1);
        assert_eq!(chain[0].previous_hash, GENESIS_PREVIOUS_HASH);
        assert_eq!(chain[0].proof, GENESIS_PROOF);
    }

    #[test]
    fn test_reward_admitted_without_signature() {
        let ledger = test_ledger();

        let index = ledger.new_transaction("0", "miner", 1, None).unwrap();

        assert_eq!(index, 2);
        assert_eq!(ledger.get_pending_transactions().len(), 1);
    }

    #[test]
    fn test_signed_transaction_admitted() {
        let ledger = test_ledger();
        let sender = Wallet::new();
        let transaction = Transaction::new_signed(&sender, "bob", 10);

        let index = ledger
            .new_transaction(&transaction.sender, "bob", 10, transaction.signature)
            .unwrap();

        assert_eq!(index, 2);
        assert_eq!(ledger.get_pending_transactions().len(), 1);
    }

    #[test]
    fn test_forged_signature_rejected() {
        let ledger = test_ledger();
        let sender = Wallet::new();
        let forger = Wallet::new();
        ledger.new_transaction("0", "miner", 1, None).unwrap();

        let forged = forger.sign(b"anything");
        let result = ledger.new_transaction(&sender.public_key_hex(), "bob", 10, Some(forged));

        assert!(matches!(
            result,
            Err(LedgerError::TransactionError(TransactionError::InvalidSignature))
        ));
        assert_eq!(ledger.get_pending_transactions().len(), 1);
    }

    #[test]
    fn test_new_block_drains_pending_pool() {
        let ledger = test_ledger();
        ledger.new_transaction("0", "a", 1, None).unwrap();
        ledger.new_transaction("0", "b", 2, None).unwrap();
        let pending = ledger.get_pending_transactions();

        let block = mine(&ledger);

        assert_eq!(block.index, 2);
        assert_eq!(block.transactions, pending);
        assert!(ledger.get_pending_transactions().is_empty());
        assert!(ledger.is_valid());
    }

    #[test]
    fn test_new_block_uses_explicit_previous_hash() {
        let ledger = test_ledger();

        let block = ledger.new_block(1, Some("explicit".to_string())).unwrap();

        assert_eq!(block.previous_hash, "explicit");
        assert!(!ledger.is_valid());
    }

    #[test]
    fn test_mining_once_from_genesis() {
        let ledger = Ledger::open(Arc::new(MemoryChainStore::new()), ProofOfWork::default()).unwrap();
        let genesis = ledger.last_block().unwrap();

        let proof = ledger.pow().search(genesis.proof);
        let block = ledger
            .forge_on(&genesis, proof, Transaction::new_reward("node-id", 1))
            .unwrap();

        assert_eq!(ledger.len(), 2);
        assert_eq!(block.previous_hash, genesis.digest());
        assert_eq!(block.transactions, vec![Transaction::new_reward("node-id", 1)]);
        assert!(ledger.is_valid());
    }

    #[test]
    fn test_forge_on_stale_tip_fails() {
        let ledger = test_ledger();
        let genesis = ledger.last_block().unwrap();
        mine(&ledger);

        let result = ledger.forge_on(&genesis, 0, Transaction::new_reward("node-id", 1));

        assert!(matches!(result, Err(LedgerError::StaleTip)));
        assert!(ledger.get_pending_transactions().is_empty());
    }

    #[test]
    fn test_valid_chain_detects_tampering() {
        let ledger = test_ledger();
        for _ in 0..3 {
            mine(&ledger);
        }
        let chain = ledger.get_chain();
        assert!(valid_chain(&chain, ledger.pow()));

        let mut tampered = chain.clone();
        let mut bytes = tampered[2].previous_hash.clone().into_bytes();
        bytes[0] = if bytes[0] == b'a' { b'b' } else { b'a' };
        tampered[2].previous_hash = String::from_utf8(bytes).unwrap();
        assert!(!valid_chain(&tampered, ledger.pow()));

        let mut reordered = chain.clone();
        reordered[1].index = 7;
        assert!(!valid_chain(&reordered, ledger.pow()));
    }

    #[test]
    fn test_short_chains_are_valid() {
        let pow = ProofOfWork::default();

        assert!(valid_chain(&[], &pow));
        assert!(valid_chain(&[Block::genesis()], &pow));
    }

    #[test]
    fn test_replace_chain_requires_longer_valid_chain() {
        let donor = test_ledger();
        for _ in 0..2 {
            mine(&donor);
        }
        let ledger = test_ledger();
        mine(&ledger);

        assert!(!ledger.replace_chain(ledger.get_chain()).unwrap());

        let mut invalid = donor.get_chain();
        invalid[1].proof += 1;
        assert!(!ledger.replace_chain(invalid).unwrap());
        assert_eq!(ledger.epoch(), 0);

        assert!(ledger.replace_chain(donor.get_chain()).unwrap());
        assert_eq!(ledger.get_chain(), donor.get_chain());
        assert_eq!(ledger.epoch(), 1);
    }

    #[test]
    fn test_replace_chain_keeps_pending_pool() {
        let donor = test_ledger();
        mine(&donor);
        mine(&donor);
        let ledger = test_ledger();
        ledger.new_transaction("0", "a", 1, None).unwrap();

        assert!(ledger.replace_chain(donor.get_chain()).unwrap());
        assert_eq!(ledger.get_pending_transactions().len(), 1);
    }

    #[test]
    fn test_ledger_reopens_from_storage() {
        let store: Arc<dyn ChainStore> = Arc::new(SledChainStore::temporary().unwrap());
        let ledger = Ledger::open(store.clone(), ProofOfWork::new(2)).unwrap();
        ledger.new_transaction("0", "miner", 1, None).unwrap();
        mine(&ledger);
        let chain = ledger.get_chain();
        drop(ledger);

        let reopened = Ledger::open(store, ProofOfWork::new(2)).unwrap();

        assert_eq!(reopened.get_chain(), chain);
    }

    #[test]
    fn test_ledger_reopens_rewarded_blocks_from_storage() {
        let store: Arc<dyn ChainStore> = Arc::new(SledChainStore::temporary().unwrap());
        let ledger = Ledger::open(store.clone(), ProofOfWork::new(2)).unwrap();
        for _ in 0..2 {
            let tip = ledger.last_block().unwrap();
            let proof = ledger.pow().search(tip.proof);
            ledger.forge_on(&tip, proof, Transaction::new_reward("node-id", 1)).unwrap();
        }
        let chain = ledger.get_chain();
        drop(ledger);

        let reopened = Ledger::open(store, ProofOfWork::new(2)).unwrap();

        assert_eq!(reopened.len(), 3);
        assert_eq!(reopened.get_chain(), chain);
        assert!(reopened.is_valid());
    }

    #[test]
    fn test_open_rejects_corrupt_store() {
        let store = Arc::new(MemoryChainStore::new());
        let genesis = Block::genesis();
        let bogus = Block::new(2, Vec::new(), 0, "not-a-digest".to_string());
        store.save(&[genesis, bogus]).unwrap();

        let result = Ledger::open(store, ProofOfWork::new(2));

        assert!(matches!(result, Err(LedgerError::InvalidChain(_))));
    }
}
