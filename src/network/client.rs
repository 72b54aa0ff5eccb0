use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use log::{debug, warn};
use reqwest::Client;

use crate::api::API_SCOPE;
use crate::blockchain::consensus::{BlockBroadcaster, ChainFetcher, PeerChain, PeerError};
use crate::blockchain::Block;

/// Talks to other nodes over their REST API
#[derive(Debug, Clone)]
pub struct HttpPeerClient {
    client: Client,
}

impl HttpPeerClient {
    /// Creates a client whose every request is bounded by `timeout`
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;

        Ok(HttpPeerClient { client })
    }

    fn url(peer: &str, path: &str) -> String {
        format!("http://{}{}{}", peer, API_SCOPE, path)
    }

    async fn post_block(&self, peer: &str, block: &Block) -> Result<(), PeerError> {
        let response = self
            .client
            .post(Self::url(peer, "/blocks/new"))
            .json(block)
            .send()
            .await
            .map_err(|e| request_error(peer, e))?;

        if !response.status().is_success() {
            return Err(PeerError::BadResponse(
                peer.to_string(),
                format!("status {}", response.status()),
            ));
        }

        Ok(())
    }
}

fn request_error(peer: &str, err: reqwest::Error) -> PeerError {
    if err.is_timeout() {
        PeerError::Timeout(peer.to_string())
    } else if err.is_decode() {
        PeerError::BadResponse(peer.to_string(), err.to_string())
    } else {
        PeerError::Unreachable(peer.to_string(), err.to_string())
    }
}

#[async_trait]
impl ChainFetcher for HttpPeerClient {
    async fn fetch_chain(&self, peer: &str) -> Result<PeerChain, PeerError> {
        let response = self
            .client
            .get(Self::url(peer, "/chain"))
            .send()
            .await
            .map_err(|e| request_error(peer, e))?;

        if !response.status().is_success() {
            return Err(PeerError::BadResponse(
                peer.to_string(),
                format!("status {}", response.status()),
            ));
        }

        response
            .json::<PeerChain>()
            .await
            .map_err(|e| request_error(peer, e))
    }
}

#[async_trait]
impl BlockBroadcaster for HttpPeerClient {
    async fn notify(&self, peers: &[String], block: &Block) {
        let results = join_all(peers.iter().map(|peer| self.post_block(peer, block))).await;

        for (peer, result) in peers.iter().zip(results) {
            match result {
                Ok(()) => debug!("Sent block {} to {}", block.index, peer),
                Err(err) => warn!("Failed to send block {}: {}", block.index, err),
            }
        }
    }
}
