//! Trusted peer set
//!
//! Membership means inbound DATA from that fingerprint is delivered.
//! In memory only; a restart starts from an empty set.

use crate::types::Fingerprint;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared handle; clones refer to the same set
#[derive(Debug, Clone, Default)]
pub struct TrustStore {
    peers: Arc<RwLock<HashSet<Fingerprint>>>,
}

impl TrustStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the fingerprint was not trusted before
    pub async fn add(&self, fingerprint: Fingerprint) -> bool {
        self.peers.write().await.insert(fingerprint)
    }

    pub async fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.peers.read().await.contains(fingerprint)
    }

    pub async fn len(&self) -> usize {
        self.peers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.peers.read().await.is_empty()
    }

    /// Sorted snapshot
    pub async fn snapshot(&self) -> Vec<Fingerprint> {
        let mut peers: Vec<_> = self.peers.read().await.iter().cloned().collect();
        peers.sort();
        peers
    }
}
