//! Wire envelope
//!
//! One JSON object per TCP connection, written once and followed by EOF:
//!
//! ```text
//! {"sender": "<fp>", "type": "HANDSHAKE_REQ" | "HANDSHAKE_ACK" | "DATA",
//!  "payload": null | {...}, "listen_port": 6001}
//! ```
//!
//! `payload` is present iff `type == DATA`. `listen_port` is only meaningful
//! on HANDSHAKE_REQ, where it tells the responder where to send the ACK.

use crate::types::Fingerprint;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PacketError {
    #[error("envelope json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("empty envelope")]
    Empty,
    #[error("DATA envelope without payload")]
    MissingPayload,
    #[error("{0:?} envelope carries a payload")]
    UnexpectedPayload(PacketKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PacketKind {
    HandshakeReq,
    HandshakeAck,
    Data,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    pub sender: Fingerprint,
    #[serde(rename = "type")]
    pub kind: PacketKind,
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen_port: Option<u16>,
}

impl Packet {
    pub fn handshake_req(sender: Fingerprint, listen_port: u16) -> Self {
        Self {
            sender,
            kind: PacketKind::HandshakeReq,
            payload: None,
            listen_port: Some(listen_port),
        }
    }

    pub fn handshake_ack(sender: Fingerprint) -> Self {
        Self {
            sender,
            kind: PacketKind::HandshakeAck,
            payload: None,
            listen_port: None,
        }
    }

    pub fn data(sender: Fingerprint, payload: serde_json::Value) -> Self {
        Self {
            sender,
            kind: PacketKind::Data,
            payload: Some(payload),
            listen_port: None,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        self.validate()?;
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, PacketError> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(PacketError::Empty);
        }
        let packet: Packet = serde_json::from_slice(bytes)?;
        packet.validate()?;
        Ok(packet)
    }

    /// payload present iff DATA; JSON null counts as absent
    fn validate(&self) -> Result<(), PacketError> {
        let has_payload = matches!(&self.payload, Some(v) if !v.is_null());
        match (self.kind, has_payload) {
            (PacketKind::Data, false) => Err(PacketError::MissingPayload),
            (PacketKind::HandshakeReq | PacketKind::HandshakeAck, true) => {
                Err(PacketError::UnexpectedPayload(self.kind))
            }
            _ => Ok(()),
        }
    }
}
