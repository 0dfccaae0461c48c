//! BiMoType message codec
//!
//! Each character becomes a single-qubit state
//! `|ψ⟩ = cos(φ/2)|0⟩ + sin(φ/2)|1⟩` whose phase is derived from the
//! character code. Decoding perturbs the amplitudes with Gaussian noise,
//! reconstructs the phase and scores it against the encoded one.
//!
//! The network layer treats the encoded packet as an opaque JSON value.

use chrono::{DateTime, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use siphasher::sip::SipHasher13;
use std::f64::consts::PI;
use std::hash::Hasher;
use std::sync::Mutex;
use thiserror::Error;

pub const PROTOCOL_NAME: &str = "Ternary-BiMoType-v1.0";

/// Minimum fidelity for a character to be accepted
pub const FIDELITY_THRESHOLD: f64 = 0.7;

/// Substituted for characters below the threshold
pub const REJECTED_CHAR: char = '?';

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("payload json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// Decoded message with its fidelity score
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedMessage {
    pub text: String,
    /// Mean per-character fidelity, 0.0 for an empty message
    pub fidelity: f64,
    pub character_fidelities: Vec<f64>,
}

/// Text ⇄ opaque payload
pub trait MessageCodec: Send + Sync {
    fn encode(&self, text: &str) -> Result<serde_json::Value, CodecError>;
    fn decode(&self, payload: &serde_json::Value) -> Result<DecodedMessage, CodecError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuantumState {
    pub character: char,
    pub alpha: f64,
    pub beta: f64,
    pub phase: f64,
    pub topology_hex: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodingMetadata {
    pub total_characters: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BimoPacket {
    pub packet_id: String,
    pub protocol: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub quantum_states: Vec<QuantumState>,
    pub encoding_metadata: EncodingMetadata,
}

enum NoiseSource {
    Thread,
    Seeded(Mutex<ChaCha8Rng>),
}

/// Default codec
pub struct BimoCodec {
    noise_level: f64,
    noise: NoiseSource,
}

impl BimoCodec {
    /// Noise-free codec: decode(encode(m)) == m.to_uppercase()
    pub fn new() -> Self {
        Self::with_noise(0.0)
    }

    pub fn with_noise(noise_level: f64) -> Self {
        Self {
            noise_level: noise_level.max(0.0),
            noise: NoiseSource::Thread,
        }
    }

    /// Reproducible noise
    pub fn seeded(noise_level: f64, seed: u64) -> Self {
        Self {
            noise_level: noise_level.max(0.0),
            noise: NoiseSource::Seeded(Mutex::new(ChaCha8Rng::seed_from_u64(seed))),
        }
    }

    pub fn noise_level(&self) -> f64 {
        self.noise_level
    }

    /// `message` keeps the caller's text; the states encode its uppercase form
    pub fn encode_packet(&self, text: &str) -> BimoPacket {
        let message = text.to_string();
        let quantum_states: Vec<QuantumState> = text.to_uppercase().chars().map(quantum_state).collect();
        let timestamp = Utc::now();

        BimoPacket {
            packet_id: format!(
                "TERNARY-BIMO-{}-{:04}",
                timestamp.timestamp(),
                message_tag(&message) % 10_000
            ),
            protocol: PROTOCOL_NAME.to_string(),
            timestamp,
            message,
            encoding_metadata: EncodingMetadata {
                total_characters: quantum_states.len(),
            },
            quantum_states,
        }
    }

    pub fn decode_packet(&self, packet: &BimoPacket) -> DecodedMessage {
        let sigma = self.noise_level * 0.1;
        let mut text = String::with_capacity(packet.quantum_states.len());
        let mut character_fidelities = Vec::with_capacity(packet.quantum_states.len());

        for qs in &packet.quantum_states {
            let (alpha, beta) = if sigma > 0.0 {
                (qs.alpha + self.gaussian(sigma), qs.beta + self.gaussian(sigma))
            } else {
                (qs.alpha, qs.beta)
            };

            let fidelity = phase_fidelity(alpha, beta, qs.phase);
            if fidelity > FIDELITY_THRESHOLD {
                text.push(qs.character);
                character_fidelities.push(fidelity);
            } else {
                text.push(REJECTED_CHAR);
                character_fidelities.push(0.0);
            }
        }

        let fidelity = if character_fidelities.is_empty() {
            0.0
        } else {
            character_fidelities.iter().sum::<f64>() / character_fidelities.len() as f64
        };

        DecodedMessage { text, fidelity, character_fidelities }
    }

    fn gaussian(&self, sigma: f64) -> f64 {
        match &self.noise {
            NoiseSource::Thread => box_muller(&mut rand::thread_rng(), sigma),
            NoiseSource::Seeded(rng) => match rng.lock() {
                Ok(mut rng) => box_muller(&mut *rng, sigma),
                Err(poisoned) => box_muller(&mut *poisoned.into_inner(), sigma),
            },
        }
    }
}

impl Default for BimoCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageCodec for BimoCodec {
    fn encode(&self, text: &str) -> Result<serde_json::Value, CodecError> {
        Ok(serde_json::to_value(self.encode_packet(text))?)
    }

    fn decode(&self, payload: &serde_json::Value) -> Result<DecodedMessage, CodecError> {
        let packet: BimoPacket = serde_json::from_value(payload.clone())?;
        if packet.encoding_metadata.total_characters != packet.quantum_states.len() {
            return Err(CodecError::Malformed(format!(
                "expected {} states, found {}",
                packet.encoding_metadata.total_characters,
                packet.quantum_states.len()
            )));
        }
        Ok(self.decode_packet(&packet))
    }
}

/// Phase in [0, 2π) from the low byte of the character code
pub fn char_phase(c: char) -> f64 {
    2.0 * PI * f64::from(u32::from(c) % 256) / 256.0
}

fn quantum_state(c: char) -> QuantumState {
    let phase = char_phase(c);
    QuantumState {
        character: c,
        alpha: (phase / 2.0).cos(),
        beta: (phase / 2.0).sin(),
        phase,
        topology_hex: format!("{:04X}", u32::from(c)),
    }
}

fn phase_fidelity(alpha: f64, beta: f64, phase: f64) -> f64 {
    let norm = (alpha * alpha + beta * beta).sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return 0.0;
    }
    let reconstructed = 2.0 * (beta / norm).atan2(alpha / norm);
    ((reconstructed - phase) / 2.0).cos().powi(2)
}

fn box_muller<R: Rng + ?Sized>(rng: &mut R, sigma: f64) -> f64 {
    // gen::<f64>() is in [0, 1); shift to (0, 1] so ln() stays finite
    let u1: f64 = 1.0 - rng.r#gen::<f64>();
    let u2: f64 = rng.r#gen::<f64>();
    sigma * (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

fn message_tag(message: &str) -> u64 {
    let mut hasher = SipHasher13::new();
    hasher.write(message.as_bytes());
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noise_free_round_trip() {
        let codec = BimoCodec::new();
        let payload = codec.encode("secure_signal").unwrap();
        let decoded = codec.decode(&payload).unwrap();

        assert_eq!(decoded.text, "SECURE_SIGNAL");
        assert!(decoded.fidelity > 0.999_999);
        assert_eq!(decoded.character_fidelities.len(), 13);
    }

    #[test]
    fn test_packet_fields() {
        let packet = BimoCodec::new().encode_packet("Hi");
        assert_eq!(packet.protocol, PROTOCOL_NAME);
        assert_eq!(packet.message, "Hi");
        assert_eq!(packet.encoding_metadata.total_characters, 2);
        assert!(packet.packet_id.starts_with("TERNARY-BIMO-"));
        assert_eq!(packet.quantum_states[0].topology_hex, "0048");
    }

    #[test]
    fn test_amplitudes_are_normalized() {
        for qs in BimoCodec::new().encode_packet("AZ09_!").quantum_states {
            let norm = qs.alpha * qs.alpha + qs.beta * qs.beta;
            assert!((norm - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_empty_message_has_zero_fidelity() {
        let codec = BimoCodec::new();
        let decoded = codec.decode(&codec.encode("").unwrap()).unwrap();
        assert_eq!(decoded.text, "");
        assert_eq!(decoded.fidelity, 0.0);
    }

    #[test]
    fn test_heavy_noise_rejects_characters() {
        let codec = BimoCodec::seeded(40.0, 7);
        let payload = codec.encode(&"A".repeat(64)).unwrap();
        let decoded = codec.decode(&payload).unwrap();

        assert_eq!(decoded.text.chars().count(), 64);
        assert!(decoded.text.contains(REJECTED_CHAR));
        assert!(decoded.fidelity < 1.0);
    }

    #[test]
    fn test_seeded_noise_is_reproducible() {
        let payload = BimoCodec::new().encode("REPRODUCIBLE").unwrap();
        let a = BimoCodec::seeded(0.5, 99).decode(&payload).unwrap();
        let b = BimoCodec::seeded(0.5, 99).decode(&payload).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_rejects_foreign_payload() {
        let codec = BimoCodec::new();
        let err = codec.decode(&serde_json::json!({"test": "data"})).unwrap_err();
        assert!(matches!(err, CodecError::Json(_)));
    }

    #[test]
    fn test_rejects_inconsistent_state_count() {
        let codec = BimoCodec::new();
        let mut payload = codec.encode("AB").unwrap();
        payload["encoding_metadata"]["total_characters"] = serde_json::json!(5);
        assert!(matches!(codec.decode(&payload), Err(CodecError::Malformed(_))));
    }

    #[test]
    fn test_noise_level_is_clamped() {
        assert_eq!(BimoCodec::with_noise(-1.0).noise_level(), 0.0);
        assert_eq!(BimoCodec::seeded(0.3, 1).noise_level(), 0.3);
    }
}
