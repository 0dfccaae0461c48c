//! Trust-gated peer-to-peer messaging

pub mod discovery;
pub mod handshake;
pub mod node;
pub mod packet;
pub mod transport;
pub mod trust;

pub use discovery::{DiscoveryError, FileDiscovery, MemoryDiscovery, PeerDiscovery, DEFAULT_CACHE_FILE};
pub use handshake::{HandshakeState, Route};
pub use node::{NetError, NetEvent, NodeConfig, PeerNode};
pub use packet::{Packet, PacketError, PacketKind};
pub use trust::TrustStore;

/// Default listen port, and the ACK port assumed for requests that do not
/// advertise one
pub const DEFAULT_PORT: u16 = 5005;

/// Receive buffer bound for one envelope (64 KiB)
pub const MAX_PACKET_SIZE: usize = 65536;

/// Connect + write timeout for outbound envelopes
pub const SEND_TIMEOUT_SECS: u64 = 5;

/// Event channel capacity
pub const EVENT_BUFFER: usize = 1024;
