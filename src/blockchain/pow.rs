use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sha2::{Digest, Sha256};

/// Default number of leading zero hex characters a valid proof must produce
pub const DEFAULT_DIFFICULTY: usize = 4;

/// How many candidates are tried between two checks of the stop condition
const CANCEL_CHECK_INTERVAL: u64 = 4096;

/// Shared flag used to stop an in-flight proof search
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Proof-of-work predicate over a pair of proofs
///
/// A proof is valid when SHA-256 of the decimal string `"{last_proof}{proof}"`
/// starts with `difficulty` zero hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofOfWork {
    difficulty: usize,
}

impl ProofOfWork {
    pub fn new(difficulty: usize) -> Self {
        ProofOfWork { difficulty }
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    /// Checks whether `proof` solves the puzzle posed by `last_proof`
    pub fn valid(&self, last_proof: u64, proof: u64) -> bool {
        let mut hasher = Sha256::new();
        hasher.update(format!("{}{}", last_proof, proof).as_bytes());
        let guess_hash = hex::encode(hasher.finalize());

        match guess_hash.get(..self.difficulty) {
            Some(prefix) => prefix.bytes().all(|b| b == b'0'),
            None => false,
        }
    }

    /// Finds the smallest proof valid against `last_proof`
    pub fn search(&self, last_proof: u64) -> u64 {
        let mut proof = 0;
        while !self.valid(last_proof, proof) {
            proof += 1;
        }
        proof
    }

    /// Same search as [`ProofOfWork::search`], giving up once `should_stop` returns true.
    ///
    /// The stop condition is polled every few thousand candidates. A stopped
    /// search keeps no state: starting again means searching again from 0.
    pub fn search_until<F>(&self, last_proof: u64, should_stop: F) -> Option<u64>
    where
        F: Fn() -> bool,
    {
        let mut proof = 0;
        loop {
            if proof % CANCEL_CHECK_INTERVAL == 0 && should_stop() {
                return None;
            }
            if self.valid(last_proof, proof) {
                return Some(proof);
            }
            proof += 1;
        }
    }
}

impl Default for ProofOfWork {
    fn default() -> Self {
        ProofOfWork::new(DEFAULT_DIFFICULTY)
    }
}
