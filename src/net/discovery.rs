//! Peer discovery: fingerprint → dialable address
//!
//! Best effort only. The file-backed book is shared between processes on
//! one machine without locking, so concurrent writers race and the last
//! write wins. Entries never expire.

use crate::types::{Fingerprint, PeerAddress};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

/// Default cache file name
pub const DEFAULT_CACHE_FILE: &str = "peer_cache.json";

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub trait PeerDiscovery: Send + Sync {
    /// Upsert; last write wins
    fn register(&self, fingerprint: &Fingerprint, host: &str, port: u16) -> Result<(), DiscoveryError>;

    fn resolve(&self, fingerprint: &Fingerprint) -> Option<PeerAddress>;
}

type AddressBook = BTreeMap<Fingerprint, PeerAddress>;

/// JSON file address book, reloaded on every call
#[derive(Debug, Clone)]
pub struct FileDiscovery {
    path: PathBuf,
}

impl FileDiscovery {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }

    /// Absent or unparsable file reads as an empty book
    fn load(&self) -> AddressBook {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return AddressBook::new(),
            Err(e) => {
                warn!("Failed to read peer cache {}: {}", self.path.display(), e);
                return AddressBook::new();
            }
        };

        serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!("Failed to parse peer cache {}: {}", self.path.display(), e);
            AddressBook::new()
        })
    }

    fn save(&self, book: &AddressBook) -> Result<(), DiscoveryError> {
        let json = serde_json::to_string_pretty(book)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

impl Default for FileDiscovery {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_FILE)
    }
}

impl PeerDiscovery for FileDiscovery {
    fn register(&self, fingerprint: &Fingerprint, host: &str, port: u16) -> Result<(), DiscoveryError> {
        let mut book = self.load();
        book.insert(fingerprint.clone(), PeerAddress::new(host, port));
        self.save(&book)?;
        debug!("Registered {} at {}:{}", fingerprint.short(), host, port);
        Ok(())
    }

    fn resolve(&self, fingerprint: &Fingerprint) -> Option<PeerAddress> {
        self.load().remove(fingerprint)
    }
}

/// In-process address book
#[derive(Debug, Default)]
pub struct MemoryDiscovery {
    book: Mutex<HashMap<Fingerprint, PeerAddress>>,
}

impl MemoryDiscovery {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PeerDiscovery for MemoryDiscovery {
    fn register(&self, fingerprint: &Fingerprint, host: &str, port: u16) -> Result<(), DiscoveryError> {
        let mut book = self.book.lock().unwrap_or_else(|p| p.into_inner());
        book.insert(fingerprint.clone(), PeerAddress::new(host, port));
        Ok(())
    }

    fn resolve(&self, fingerprint: &Fingerprint) -> Option<PeerAddress> {
        let book = self.book.lock().unwrap_or_else(|p| p.into_inner());
        book.get(fingerprint).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TempCache(PathBuf);

    impl TempCache {
        fn new(name: &str) -> Self {
            let path = std::env::temp_dir()
                .join(format!("bimotype_{}_{}.json", name, rand::random::<u64>()));
            Self(path)
        }
    }

    impl Drop for TempCache {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.0);
        }
    }

    #[test]
    fn test_file_round_trip() {
        let cache = TempCache::new("round_trip");
        let discovery = FileDiscovery::new(&cache.0);
        let fp = Fingerprint::new("test_fingerprint_123");

        discovery.register(&fp, "1.2.3.4", 9999).unwrap();
        assert_eq!(discovery.resolve(&fp), Some(PeerAddress::new("1.2.3.4", 9999)));
        assert_eq!(discovery.resolve(&Fingerprint::new("unknown")), None);
    }

    #[test]
    fn test_file_last_write_wins() {
        let cache = TempCache::new("last_write");
        let fp = Fingerprint::new("fp");

        FileDiscovery::new(&cache.0).register(&fp, "10.0.0.1", 1).unwrap();
        FileDiscovery::new(&cache.0).register(&fp, "10.0.0.2", 2).unwrap();
        FileDiscovery::new(&cache.0).register(&Fingerprint::new("other"), "10.0.0.3", 3).unwrap();

        let discovery = FileDiscovery::new(&cache.0);
        assert_eq!(discovery.resolve(&fp), Some(PeerAddress::new("10.0.0.2", 2)));
        assert_eq!(
            discovery.resolve(&Fingerprint::new("other")),
            Some(PeerAddress::new("10.0.0.3", 3))
        );
    }

    #[test]
    fn test_missing_file_is_empty() {
        let cache = TempCache::new("missing");
        let discovery = FileDiscovery::new(&cache.0);
        assert_eq!(discovery.resolve(&Fingerprint::new("fp")), None);
    }

    #[test]
    fn test_corrupt_file_is_empty_and_recoverable() {
        let cache = TempCache::new("corrupt");
        std::fs::write(&cache.0, "{ not json").unwrap();

        let discovery = FileDiscovery::new(&cache.0);
        let fp = Fingerprint::new("fp");
        assert_eq!(discovery.resolve(&fp), None);

        discovery.register(&fp, "127.0.0.1", 6000).unwrap();
        assert_eq!(discovery.resolve(&fp), Some(PeerAddress::new("127.0.0.1", 6000)));
    }

    #[test]
    fn test_cache_file_format() {
        let cache = TempCache::new("format");
        FileDiscovery::new(&cache.0)
            .register(&Fingerprint::new("abc"), "127.0.0.1", 5005)
            .unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&cache.0).unwrap()).unwrap();
        assert_eq!(raw, serde_json::json!({"abc": {"host": "127.0.0.1", "port": 5005}}));
    }

    #[test]
    fn test_memory_round_trip() {
        let discovery = MemoryDiscovery::new();
        let fp = Fingerprint::new("fp");
        assert_eq!(discovery.resolve(&fp), None);

        discovery.register(&fp, "host", 1).unwrap();
        discovery.register(&fp, "host", 2).unwrap();
        assert_eq!(discovery.resolve(&fp), Some(PeerAddress::new("host", 2)));
    }
}
