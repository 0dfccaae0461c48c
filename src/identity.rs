//! Node identity: hardware fingerprint modulated by the session term
//!
//! ```text
//! O_n = cos(π n) · cos(π φ n)
//! fingerprint = SHA3-256("<host>-<os>-<arch>-<cpus>-On:<O_n>-S:<n>")
//! ```

use crate::types::Fingerprint;
use sha3::{Digest, Sha3_256};
use std::f64::consts::PI;

/// Golden ratio used by the session modulation
pub const PHI: f64 = 1.618_033_988_749_895;

/// Source of the local node's fingerprint
pub trait IdentityProvider: Send + Sync {
    fn fingerprint(&self) -> Fingerprint;
}

/// Static hardware identifiers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwareMetrics {
    pub host: String,
    pub os: String,
    pub arch: String,
    pub cpu_count: usize,
}

impl HardwareMetrics {
    pub fn detect() -> Self {
        Self {
            host: detect_host(),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            cpu_count: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(0),
        }
    }

    fn hash_input(&self) -> String {
        format!("{}-{}-{}-{}", self.host, self.os, self.arch, self.cpu_count)
    }
}

fn detect_host() -> String {
    if let Ok(name) = std::fs::read_to_string("/etc/hostname") {
        let name = name.trim();
        if !name.is_empty() {
            return name.to_string();
        }
    }
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "localhost".to_string())
}

/// Golden operator O_n
pub fn golden_operator(session: u64) -> f64 {
    let n = session as f64;
    (PI * n).cos() * (PI * PHI * n).cos()
}

/// Hardware identity for one session
#[derive(Debug, Clone)]
pub struct HardwareIdentity {
    metrics: HardwareMetrics,
    session: u64,
}

impl HardwareIdentity {
    /// Detects hardware and draws a random session number, so two nodes
    /// on the same machine get distinct fingerprints.
    pub fn new() -> Self {
        Self::with_session(rand::random())
    }

    pub fn with_session(session: u64) -> Self {
        Self::from_metrics(HardwareMetrics::detect(), session)
    }

    pub fn from_metrics(metrics: HardwareMetrics, session: u64) -> Self {
        Self { metrics, session }
    }
}

impl Default for HardwareIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityProvider for HardwareIdentity {
    fn fingerprint(&self) -> Fingerprint {
        let input = format!(
            "{}-On:{:.10}-S:{}",
            self.metrics.hash_input(),
            golden_operator(self.session),
            self.session
        );
        let digest = Sha3_256::digest(input.as_bytes());
        Fingerprint::new(hex::encode(digest))
    }
}

/// Fixed fingerprint
#[derive(Debug, Clone)]
pub struct StaticIdentity(pub Fingerprint);

impl IdentityProvider for StaticIdentity {
    fn fingerprint(&self) -> Fingerprint {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics() -> HardwareMetrics {
        HardwareMetrics {
            host: "node-a".into(),
            os: "linux".into(),
            arch: "x86_64".into(),
            cpu_count: 8,
        }
    }

    #[test]
    fn test_fingerprint_is_stable_per_session() {
        let a = HardwareIdentity::from_metrics(metrics(), 42);
        let b = HardwareIdentity::from_metrics(metrics(), 42);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().as_str().len(), 64);
    }

    #[test]
    fn test_sessions_produce_distinct_fingerprints() {
        let a = HardwareIdentity::from_metrics(metrics(), 1);
        let b = HardwareIdentity::from_metrics(metrics(), 2);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_golden_operator_at_zero() {
        assert!((golden_operator(0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_static_identity() {
        let id = StaticIdentity(Fingerprint::new("fixed"));
        assert_eq!(id.fingerprint().as_str(), "fixed");
    }
}
