use dashmap::DashSet;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PeerRegistryError {
    #[error("Invalid peer address: {0:?}")]
    InvalidAddress(String),
}

/// Set of known peer addresses
///
/// Addresses are stored as `host:port`; a leading `http://` or `https://`
/// and any path are dropped on registration.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: DashSet<String>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a peer. Registering a known peer again is a no-op.
    ///
    /// # Returns
    ///
    /// true if the peer was not known before
    pub fn register(&self, address: &str) -> Result<bool, PeerRegistryError> {
        let normalized = normalize_address(address)?;
        Ok(self.peers.insert(normalized))
    }

    /// Lists the known peers, sorted for stable output
    pub fn list(&self) -> Vec<String> {
        let mut peers: Vec<String> = self.peers.iter().map(|peer| peer.key().clone()).collect();
        peers.sort();
        peers
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

fn normalize_address(address: &str) -> Result<String, PeerRegistryError> {
    let trimmed = address.trim();
    let without_scheme = trimmed
        .strip_prefix("http://")
        .or_else(|| trimmed.strip_prefix("https://"))
        .unwrap_or(trimmed);
    let host = without_scheme.split('/').next().unwrap_or_default();

    if host.is_empty() || host.contains(char::is_whitespace) {
        return Err(PeerRegistryError::InvalidAddress(address.to_string()));
    }

    Ok(host.to_string())
}
