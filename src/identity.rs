use dashmap::DashMap;

use crate::blockchain::crypto::{parse_public_key, CryptoError};

/// Maps user identifiers to the hex public keys they sign with
#[derive(Debug, Default)]
pub struct IdentityDirectory {
    keys: DashMap<String, String>,
}

impl IdentityDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or rebinds) `user_id` to `public_key` once the key parses
    pub fn register(&self, user_id: &str, public_key: &str) -> Result<(), CryptoError> {
        parse_public_key(public_key)?;
        self.keys.insert(user_id.to_string(), public_key.to_string());
        Ok(())
    }

    /// Looks up the public key registered for `user_id`
    pub fn lookup(&self, user_id: &str) -> Option<String> {
        self.keys.get(user_id).map(|key| key.value().clone())
    }
}
