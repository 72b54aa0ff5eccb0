use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use super::transaction::Transaction;

/// Proof carried by the genesis block
pub const GENESIS_PROOF: u64 = 100;

/// `previous_hash` sentinel carried by the genesis block
pub const GENESIS_PREVIOUS_HASH: &str = "1";

/// Represents a block in the blockchain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Block {
    /// Position of the block in the chain, starting at 1
    pub index: u64,

    /// Timestamp when the block was created
    #[schema(value_type = String, example = "2023-01-01T12:00:00Z")]
    pub timestamp: DateTime<Utc>,

    /// Transactions included in this block, in admission order
    pub transactions: Vec<Transaction>,

    /// Proof of work, valid relative to the previous block's proof
    pub proof: u64,

    /// Digest of the previous block
    pub previous_hash: String,
}

impl Block {
    /// Creates a new block stamped with the current time
    ///
    /// # Arguments
    ///
    /// * `index` - The index of the block in the chain
    /// * `transactions` - The list of transactions to include in the block
    /// * `proof` - The proof of work
    /// * `previous_hash` - The digest of the previous block
    pub fn new(index: u64, transactions: Vec<Transaction>, proof: u64, previous_hash: String) -> Self {
        Block {
            index,
            timestamp: Utc::now(),
            transactions,
            proof,
            previous_hash,
        }
    }

    /// Creates the first block of a chain
    pub fn genesis() -> Self {
        Block::new(1, Vec::new(), GENESIS_PROOF, GENESIS_PREVIOUS_HASH.to_string())
    }

    /// Calculates the digest of the block
    ///
    /// # Returns
    ///
    /// The SHA-256 hash of the block's canonical encoding as a hexadecimal string
    pub fn digest(&self) -> String {
        hash_block(self)
    }
}

/// Hashes a block over its canonical JSON encoding.
///
/// Object keys are sorted at every level, so the digest only depends on field
/// values and never on how the block was built or which serde features are on.
pub fn hash_block(block: &Block) -> String {
    let block_data = serde_json::json!({
        "index": block.index,
        "timestamp": block.timestamp,
        "transactions": block.transactions,
        "proof": block.proof,
        "previous_hash": block.previous_hash,
    });

    let mut encoded = String::new();
    write_canonical(&block_data, &mut encoded);

    let mut hasher = Sha256::new();
    hasher.update(encoded.as_bytes());

    format!("{:x}", hasher.finalize())
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            out.push('{');
            for (i, (key, value)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(value, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
