use serde::{Deserialize, Serialize};
use std::fmt;

/// Characters of a fingerprint shown in log lines
pub const FINGERPRINT_DISPLAY_LEN: usize = 8;

/// Node identity string. The only key used for authorization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prefix used in logs
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(FINGERPRINT_DISPLAY_LEN) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Fingerprint {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Fingerprint {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Dialable network location
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerAddress {
    pub host: String,
    pub port: u16,
}

impl PeerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_fingerprint() {
        let fp = Fingerprint::new("0123456789abcdef");
        assert_eq!(fp.short(), "01234567");

        let tiny = Fingerprint::new("abc");
        assert_eq!(tiny.short(), "abc");
    }

    #[test]
    fn test_fingerprint_serializes_as_plain_string() {
        let fp = Fingerprint::new("deadbeef");
        assert_eq!(serde_json::to_string(&fp).unwrap(), "\"deadbeef\"");
    }

    #[test]
    fn test_peer_address_display() {
        assert_eq!(PeerAddress::new("127.0.0.1", 6000).to_string(), "127.0.0.1:6000");
    }
}
