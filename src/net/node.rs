//! Peer node: listening socket, trust state and packet dispatch
//!
//! # Architecture
//!
//! ```text
//!                    ┌─────────────────┐
//!                    │   Application   │
//!                    └───┬─────────▲───┘
//!       send_packet,     │         │ NetEvent (channel)
//!       handshakes       │         │
//!                    ┌───▼─────────┴───┐
//!                    │    PeerNode     │ ◄── This module
//!                    └───┬─────────┬───┘
//!                        │         │
//!                 ┌──────▼───┐ ┌───▼────────────┐
//!                 │TrustStore│ │ accept loop    │
//!                 │ pending  │ │ (one task,     │
//!                 └──────────┘ │  sequential)   │
//!                              └────────────────┘
//! ```
//!
//! # Concurrency
//!
//! One accept-loop task per node. Each inbound connection is read, parsed
//! and dispatched, and its event published, before the next accept. Two
//! inbound packets are never processed in parallel. The trust set and
//! pending queue are the only state shared with application calls.
//!
//! There is no server-side read timeout by default, so a peer that connects
//! and never closes stalls the loop until `stop()`, which abandons the
//! connection. `NodeConfig::inbound_read_timeout` bounds it.
//!
//! # Security
//!
//! - DATA from untrusted senders is dropped without any reply, so an
//!   unvetted peer cannot confirm this node is alive.
//! - `send_packet` refuses untrusted targets before opening a connection.
//! - HANDSHAKE_ACK is accepted from anyone; auto-accept trusts any requester.
//!   Both are policy, not authentication.

use super::discovery::{DiscoveryError, PeerDiscovery};
use super::handshake::{route, HandshakeState, OutboundRequests, PendingHandshakes, Route};
use super::packet::{Packet, PacketError};
use super::transport::{read_envelope, send_envelope};
use super::trust::TrustStore;
use super::{DEFAULT_PORT, EVENT_BUFFER, MAX_PACKET_SIZE, SEND_TIMEOUT_SECS};
use crate::codec::{CodecError, DecodedMessage, MessageCodec};
use crate::identity::IdentityProvider;
use crate::types::{Fingerprint, PeerAddress};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum NetError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },
    #[error("node is already listening")]
    AlreadyListening,
    #[error("timed out")]
    Timeout,
    #[error("packet error: {0}")]
    Packet(#[from] PacketError),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Event published by the accept loop
#[derive(Debug, Clone)]
pub enum NetEvent {
    /// DATA from a trusted peer, decoded
    MessageReceived {
        sender: Fingerprint,
        message: DecodedMessage,
    },
    /// Handshake request queued for an application decision
    HandshakeRequested {
        sender: Fingerprint,
        reply_to: PeerAddress,
    },
    /// Peer entered the trust set from the network side (ACK or auto-accept)
    PeerTrusted(Fingerprint),
}

/// Node configuration
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub listen_port: u16,
    /// Trust every requester and ACK immediately
    pub auto_accept_handshakes: bool,
    /// ACK port for requests that do not advertise `listen_port`
    pub fallback_reply_port: u16,
    pub send_timeout: Duration,
    pub max_packet_size: usize,
    pub inbound_read_timeout: Option<Duration>,
    pub event_buffer: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_port: DEFAULT_PORT,
            auto_accept_handshakes: false,
            fallback_reply_port: DEFAULT_PORT,
            send_timeout: Duration::from_secs(SEND_TIMEOUT_SECS),
            max_packet_size: MAX_PACKET_SIZE,
            inbound_read_timeout: None,
            event_buffer: EVENT_BUFFER,
        }
    }
}

/// State shared between the application side and the accept loop
struct Shared {
    config: NodeConfig,
    fingerprint: Fingerprint,
    codec: Arc<dyn MessageCodec>,
    trust: TrustStore,
    pending: PendingHandshakes,
    outbound: OutboundRequests,
    event_tx: mpsc::Sender<NetEvent>,
}

impl Shared {
    /// Best effort; failures are logged and reported as false
    async fn transmit(&self, host: &str, port: u16, packet: Packet) -> bool {
        match send_envelope(host, port, &packet, self.config.send_timeout).await {
            Ok(()) => {
                debug!("Sent {:?} to {}:{}", packet.kind, host, port);
                true
            }
            Err(e) => {
                warn!("Send failed to {}:{}: {}", host, port, e);
                false
            }
        }
    }

    async fn publish(&self, event: NetEvent) {
        if self.event_tx.send(event).await.is_err() {
            debug!("Event receiver dropped");
        }
    }

    async fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) -> Result<(), NetError> {
        let bytes = read_envelope(
            stream,
            self.config.max_packet_size,
            self.config.inbound_read_timeout,
        )
        .await?;
        let packet = Packet::decode(&bytes)?;
        self.dispatch(packet, addr).await
    }

    async fn dispatch(&self, packet: Packet, addr: SocketAddr) -> Result<(), NetError> {
        let sender = packet.sender;
        let trusted = self.trust.contains(&sender).await;

        match route(packet.kind, trusted, self.config.auto_accept_handshakes) {
            Route::AutoAccept => {
                let reply_to = self.reply_address(addr, packet.listen_port);
                info!("Handshake request from {}, auto-accepting", sender.short());
                self.pending.take(&sender).await;
                if self.trust.add(sender.clone()).await {
                    self.publish(NetEvent::PeerTrusted(sender.clone())).await;
                }
                let ack = Packet::handshake_ack(self.fingerprint.clone());
                self.transmit(&reply_to.host, reply_to.port, ack).await;
            }
            Route::QueueRequest => {
                let reply_to = self.reply_address(addr, packet.listen_port);
                info!("Handshake request from {} ({})", sender.short(), reply_to);
                self.pending.insert(sender.clone(), reply_to.clone()).await;
                self.publish(NetEvent::HandshakeRequested { sender, reply_to }).await;
            }
            Route::TrustSender => {
                info!("Handshake ACK from {}", sender.short());
                self.outbound.remove(&sender).await;
                if self.trust.add(sender.clone()).await {
                    self.publish(NetEvent::PeerTrusted(sender)).await;
                }
            }
            Route::Deliver => {
                let payload = packet.payload.ok_or(PacketError::MissingPayload)?;
                let message = self.codec.decode(&payload)?;
                debug!(
                    "DATA from {}: {} chars, fidelity {:.3}",
                    sender.short(),
                    message.text.chars().count(),
                    message.fidelity
                );
                self.publish(NetEvent::MessageReceived { sender, message }).await;
            }
            Route::Drop => {
                debug!("Ignored DATA packet from untrusted peer {}", sender.short());
            }
        }

        Ok(())
    }

    fn reply_address(&self, addr: SocketAddr, listen_port: Option<u16>) -> PeerAddress {
        let port = listen_port.unwrap_or(self.config.fallback_reply_port);
        PeerAddress::new(addr.ip().to_string(), port)
    }
}

/// A peer in the trust-gated messaging network
pub struct PeerNode {
    shared: Arc<Shared>,
    discovery: Arc<dyn PeerDiscovery>,
    local_addr: RwLock<Option<SocketAddr>>,
    shutdown: watch::Sender<bool>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl PeerNode {
    /// Derives the fingerprint; binds nothing yet.
    pub fn new(
        config: NodeConfig,
        identity: &dyn IdentityProvider,
        codec: Arc<dyn MessageCodec>,
        discovery: Arc<dyn PeerDiscovery>,
    ) -> (Self, mpsc::Receiver<NetEvent>) {
        let (event_tx, event_rx) = mpsc::channel(config.event_buffer.max(1));
        let (shutdown, _) = watch::channel(false);
        let fingerprint = identity.fingerprint();

        let node = Self {
            shared: Arc::new(Shared {
                config,
                fingerprint,
                codec,
                trust: TrustStore::new(),
                pending: PendingHandshakes::new(),
                outbound: OutboundRequests::new(),
                event_tx,
            }),
            discovery,
            local_addr: RwLock::new(None),
            shutdown,
            accept_task: Mutex::new(None),
        };

        (node, event_rx)
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.shared.fingerprint
    }

    pub fn config(&self) -> &NodeConfig {
        &self.shared.config
    }

    /// Bound address while listening
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.read().await
    }

    /// Port advertised to peers: the bound port, else the configured one
    pub async fn listen_port(&self) -> u16 {
        self.local_addr()
            .await
            .map(|a| a.port())
            .unwrap_or(self.shared.config.listen_port)
    }

    /// Bind on all interfaces and spawn the accept loop.
    pub async fn start_listening(&self) -> Result<Fingerprint, NetError> {
        let mut task = self.accept_task.lock().await;
        if task.is_some() {
            return Err(NetError::AlreadyListening);
        }

        let port = self.shared.config.listen_port;
        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .map_err(|source| NetError::Bind { port, source })?;
        let addr = listener.local_addr()?;
        *self.local_addr.write().await = Some(addr);

        self.shutdown.send_replace(false);
        let shutdown_rx = self.shutdown.subscribe();
        let shared = self.shared.clone();
        *task = Some(tokio::spawn(accept_loop(listener, shared, shutdown_rx)));

        info!("Listening on port {}", addr.port());
        info!("Local fingerprint: {}", self.shared.fingerprint);
        Ok(self.shared.fingerprint.clone())
    }

    /// Signal the accept loop and wait for it to release the socket.
    /// A connection still being read is abandoned.
    pub async fn stop(&self) {
        self.shutdown.send_replace(true);

        let handle = self.accept_task.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Accept loop ended abnormally: {}", e);
            }
            info!("Node {} stopped", self.shared.fingerprint.short());
        }
        *self.local_addr.write().await = None;
    }

    /// Fire-and-forget HANDSHAKE_REQ advertising our listen port
    pub async fn request_handshake(&self, host: &str, port: u16) -> bool {
        let packet = Packet::handshake_req(self.shared.fingerprint.clone(), self.listen_port().await);
        info!("Requesting handshake with {}:{}", host, port);
        self.shared.transmit(host, port, packet).await
    }

    /// Trusts `target` locally, then sends the ACK. Trust is kept even if
    /// the ACK cannot be delivered.
    pub async fn send_handshake_ack(&self, host: &str, port: u16, target: &Fingerprint) -> bool {
        self.shared.pending.take(target).await;
        self.shared.outbound.remove(target).await;
        self.add_trusted_peer(target.clone()).await;

        let packet = Packet::handshake_ack(self.shared.fingerprint.clone());
        self.shared.transmit(host, port, packet).await
    }

    /// Encode and send DATA. False without any I/O when `target` is not
    /// trusted; false on codec or transport failure.
    pub async fn send_packet(&self, host: &str, port: u16, message: &str, target: &Fingerprint) -> bool {
        if !self.shared.trust.contains(target).await {
            warn!(
                "Target peer {} is not in trusted list. Perform handshake first.",
                target.short()
            );
            return false;
        }

        let payload = match self.shared.codec.encode(message) {
            Ok(p) => p,
            Err(e) => {
                warn!("Failed to encode message for {}: {}", target.short(), e);
                return false;
            }
        };

        let packet = Packet::data(self.shared.fingerprint.clone(), payload);
        self.shared.transmit(host, port, packet).await
    }

    /// Idempotent
    pub async fn add_trusted_peer(&self, fingerprint: Fingerprint) {
        let short = fingerprint.short().to_string();
        if self.shared.trust.add(fingerprint).await {
            info!("Peer {} added to trusted list", short);
        }
    }

    pub async fn is_trusted(&self, fingerprint: &Fingerprint) -> bool {
        self.shared.trust.contains(fingerprint).await
    }

    pub async fn trusted_peers(&self) -> Vec<Fingerprint> {
        self.shared.trust.snapshot().await
    }

    pub async fn pending_handshakes(&self) -> Vec<(Fingerprint, PeerAddress)> {
        self.shared.pending.list().await
    }

    pub async fn handshake_state(&self, peer: &Fingerprint) -> HandshakeState {
        HandshakeState::resolve(
            self.shared.trust.contains(peer).await,
            self.shared.pending.contains(peer).await,
            self.shared.outbound.contains(peer).await,
        )
    }

    // Application helpers

    /// Resolve `target` through discovery and request a handshake
    pub async fn connect_to(&self, target: &Fingerprint) -> bool {
        let Some(addr) = self.discovery.resolve(target) else {
            warn!("Fingerprint {} not found in discovery", target.short());
            return false;
        };

        let sent = self.request_handshake(&addr.host, addr.port).await;
        if sent && !self.shared.trust.contains(target).await {
            self.shared.outbound.insert(target.clone()).await;
        }
        sent
    }

    /// ACK a pending request at the address it advertised
    pub async fn accept_handshake(&self, sender: &Fingerprint) -> bool {
        let Some(reply_to) = self.shared.pending.take(sender).await else {
            debug!("No pending handshake from {}", sender.short());
            return false;
        };
        self.send_handshake_ack(&reply_to.host, reply_to.port, sender).await
    }

    /// Discard a pending request; true if one existed
    pub async fn ignore_handshake(&self, sender: &Fingerprint) -> bool {
        let removed = self.shared.pending.take(sender).await.is_some();
        if removed {
            info!("Ignored handshake request from {}", sender.short());
        }
        removed
    }

    /// Resolve `target` through discovery and send DATA
    pub async fn send_to(&self, target: &Fingerprint, message: &str) -> bool {
        match self.discovery.resolve(target) {
            Some(addr) => self.send_packet(&addr.host, addr.port, message, target).await,
            None => {
                warn!("Fingerprint {} not found in discovery", target.short());
                false
            }
        }
    }

    /// Publish our fingerprint at `host` and the advertised port
    pub async fn register_self(&self, host: &str) -> Result<(), DiscoveryError> {
        let port = self.listen_port().await;
        self.discovery.register(&self.shared.fingerprint, host, port)
    }
}

impl Drop for PeerNode {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    debug!("Incoming connection from {}", addr);
                    // A stalled peer must not hold the listener past stop()
                    tokio::select! {
                        biased;

                        _ = shutdown.changed() => {
                            debug!("Dropping in-flight connection from {} on shutdown", addr);
                            break;
                        }
                        handled = shared.handle_connection(stream, addr) => {
                            if let Err(e) = handled {
                                warn!("Error processing packet from {}: {}", addr, e);
                            }
                        }
                    }
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            },
        }
    }

    debug!("Accept loop for {} exited", shared.fingerprint.short());
}
