//! Mutual handshake protocol
//!
//! Trust is established independently in each direction. State of peer B
//! as seen by node A:
//!
//! ```text
//!             connect_to(B)                 ACK from B
//!  Unknown ───────────────────► RequestSent ───────────────┐
//!     │                                                    ▼
//!     │  REQ from B (manual accept)               ┌──────────────┐
//!     ├──────────────► RequestReceivedPending ───►│   Trusted    │
//!     │                    │ accept (send ACK)    └──────────────┘
//!     │                    │ ignore → Unknown            ▲
//!     │  REQ from B (auto-accept) / ACK from B / manual  │
//!     └──────────────────────────────────────────────────┘
//! ```
//!
//! # Dispatch
//!
//! | type          | sender trusted | action                               |
//! |---------------|----------------|--------------------------------------|
//! | HANDSHAKE_REQ | any            | auto-accept: trust + ACK, else queue |
//! | HANDSHAKE_ACK | any            | trust sender                         |
//! | DATA          | yes            | decode, deliver                      |
//! | DATA          | no             | drop, never answer                   |

use super::packet::PacketKind;
use crate::types::{Fingerprint, PeerAddress};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Handshake state of one remote peer, local perspective only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Not trusted, nothing in flight
    Unknown,
    /// We requested a handshake and have no ACK yet
    RequestSent,
    /// Peer requested a handshake, application has not decided
    RequestReceivedPending,
    /// Inbound DATA from this peer is delivered
    Trusted,
}

impl HandshakeState {
    /// Trust wins over pending, pending over our own request
    pub fn resolve(trusted: bool, pending: bool, requested: bool) -> Self {
        if trusted {
            HandshakeState::Trusted
        } else if pending {
            HandshakeState::RequestReceivedPending
        } else if requested {
            HandshakeState::RequestSent
        } else {
            HandshakeState::Unknown
        }
    }
}

/// What the accept loop does with one inbound packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Trust the requester and send an ACK back
    AutoAccept,
    /// Queue the request for the application
    QueueRequest,
    /// Trust the sender of an ACK
    TrustSender,
    /// Decode and publish the payload
    Deliver,
    /// Untrusted DATA; no reply
    Drop,
}

pub fn route(kind: PacketKind, sender_trusted: bool, auto_accept: bool) -> Route {
    match kind {
        PacketKind::HandshakeReq if auto_accept => Route::AutoAccept,
        PacketKind::HandshakeReq => Route::QueueRequest,
        PacketKind::HandshakeAck => Route::TrustSender,
        PacketKind::Data if sender_trusted => Route::Deliver,
        PacketKind::Data => Route::Drop,
    }
}

/// Inbound requests awaiting an application decision, with the address
/// the ACK should go to.
#[derive(Debug, Clone, Default)]
pub struct PendingHandshakes {
    requests: Arc<RwLock<HashMap<Fingerprint, PeerAddress>>>,
}

impl PendingHandshakes {
    pub fn new() -> Self {
        Self::default()
    }

    /// A repeated request replaces the reply address
    pub async fn insert(&self, sender: Fingerprint, reply_to: PeerAddress) {
        self.requests.write().await.insert(sender, reply_to);
    }

    pub async fn take(&self, sender: &Fingerprint) -> Option<PeerAddress> {
        self.requests.write().await.remove(sender)
    }

    pub async fn contains(&self, sender: &Fingerprint) -> bool {
        self.requests.read().await.contains_key(sender)
    }

    pub async fn list(&self) -> Vec<(Fingerprint, PeerAddress)> {
        let mut list: Vec<_> = self
            .requests
            .read()
            .await
            .iter()
            .map(|(fp, addr)| (fp.clone(), addr.clone()))
            .collect();
        list.sort_by(|a, b| a.0.cmp(&b.0));
        list
    }
}

/// Peers we dialed through discovery and have not heard back from
#[derive(Debug, Clone, Default)]
pub struct OutboundRequests {
    targets: Arc<RwLock<HashSet<Fingerprint>>>,
}

impl OutboundRequests {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, target: Fingerprint) {
        self.targets.write().await.insert(target);
    }

    pub async fn remove(&self, target: &Fingerprint) -> bool {
        self.targets.write().await.remove(target)
    }

    pub async fn contains(&self, target: &Fingerprint) -> bool {
        self.targets.read().await.contains(target)
    }
}
