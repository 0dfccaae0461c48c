pub mod codec;
pub mod identity;
pub mod net;
pub mod types;

pub use codec::{BimoCodec, CodecError, DecodedMessage, MessageCodec};
pub use identity::{HardwareIdentity, IdentityProvider, StaticIdentity};
pub use net::{
    FileDiscovery, HandshakeState, MemoryDiscovery, NetError, NetEvent, NodeConfig, Packet,
    PacketKind, PeerDiscovery, PeerNode, DEFAULT_PORT,
};
pub use types::{Fingerprint, PeerAddress};
