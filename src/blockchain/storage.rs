use std::path::Path;
use std::sync::{Mutex, PoisonError};

use log::{debug, warn};
use sled::{Batch, Db, Tree};
use thiserror::Error;

use super::block::Block;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

/// Persistence contract for the chain
///
/// `save` stores a full snapshot; `load` on the next startup returns an equal
/// chain, or an empty one when nothing has been saved yet.
pub trait ChainStore: Send + Sync {
    fn load(&self) -> Result<Vec<Block>, StorageError>;

    fn save(&self, chain: &[Block]) -> Result<(), StorageError>;
}

/// Sled-backed chain storage, one entry per block keyed by big-endian index
pub struct SledChainStore {
    /// The database instance
    db: Db,

    /// Tree for blocks
    blocks: Tree,

    /// Tree for metadata
    metadata: Tree,
}

impl std::fmt::Debug for SledChainStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledChainStore")
            .finish()
    }
}

impl SledChainStore {
    /// Opens (or creates) the database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        Self::from_db(sled::open(path)?)
    }

    /// Opens a throwaway database that is removed when dropped
    pub fn temporary() -> Result<Self, StorageError> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> Result<Self, StorageError> {
        let blocks = db.open_tree("blocks")?;
        let metadata = db.open_tree("metadata")?;

        Ok(Self {
            db,
            blocks,
            metadata,
        })
    }

    /// Gets the stored chain height
    pub fn height(&self) -> Result<u64, StorageError> {
        match self.metadata.get("block_height")? {
            Some(value) => bincode::deserialize(&value)
                .map_err(|e| StorageError::DeserializationError(e.to_string())),
            None => Ok(0),
        }
    }
}

impl ChainStore for SledChainStore {
    fn load(&self) -> Result<Vec<Block>, StorageError> {
        let mut blocks = Vec::new();

        // Keys are big-endian indices, so iteration order is chain order.
        for result in self.blocks.iter() {
            let (_, value) = result?;
            let block: Block = bincode::deserialize(&value)
                .map_err(|e| StorageError::DeserializationError(e.to_string()))?;
            blocks.push(block);
        }

        let height = self.height()?;
        if height != blocks.len() as u64 {
            warn!(
                "Stored block height {} does not match {} stored blocks",
                height,
                blocks.len()
            );
        }

        Ok(blocks)
    }

    fn save(&self, chain: &[Block]) -> Result<(), StorageError> {
        let mut batch = Batch::default();

        for block in chain {
            let value = bincode::serialize(block)
                .map_err(|e| StorageError::SerializationError(e.to_string()))?;
            batch.insert(block.index.to_be_bytes().to_vec(), value);
        }

        // Drop entries past the end of the new chain.
        let stale_from = (chain.len() as u64 + 1).to_be_bytes();
        for result in self.blocks.range(stale_from..) {
            let (key, _) = result?;
            batch.remove(key);
        }

        self.blocks.apply_batch(batch)?;

        let height_bytes = bincode::serialize(&(chain.len() as u64))
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        self.metadata.insert("block_height", height_bytes)?;

        self.db.flush()?;
        debug!("Persisted chain of {} blocks", chain.len());

        Ok(())
    }
}

/// Chain storage that lives only as long as the process
#[derive(Debug, Default)]
pub struct MemoryChainStore {
    chain: Mutex<Vec<Block>>,
}

impl MemoryChainStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChainStore for MemoryChainStore {
    fn load(&self) -> Result<Vec<Block>, StorageError> {
        Ok(self.chain.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn save(&self, chain: &[Block]) -> Result<(), StorageError> {
        *self.chain.lock().unwrap_or_else(PoisonError::into_inner) = chain.to_vec();
        Ok(())
    }
}
