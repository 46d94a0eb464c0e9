use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

/// Remembers recent mask/unmask results. Only consulted in deterministic mode.
pub trait Cache: Send + Sync {
    /// Stores a freshly masked token in both directions.
    fn cache(&self, id: &[u8], encoded: &str);

    /// Stores an unmasked token in the token-to-id direction only.
    ///
    /// The token is the caller's spelling, which may differ from what `mask`
    /// produces (letter case, separators, an older key), so it must never be
    /// handed back out by `get_encoded`.
    fn cache_decoded(&self, encoded: &str, id: &[u8]);

    fn get_encoded(&self, id: &[u8]) -> Option<String>;

    fn get_bytes(&self, encoded: &str) -> Option<Vec<u8>>;

    fn clear(&self);
}

pub const DEFAULT_CACHE_SIZE: usize = 256;

/// Two in-memory LRU maps, one per direction.
///
/// Raw ids are keyed by their SHA-256 digest so the plaintext value is not
/// kept around as a map key.
pub struct MemoryCache {
    encoded: Mutex<LruCache<[u8; 32], String>>,
    decoded: Mutex<LruCache<String, Vec<u8>>>,
}

impl MemoryCache {
    pub fn new(size: NonZeroUsize) -> Self {
        MemoryCache {
            encoded: Mutex::new(LruCache::new(size)),
            decoded: Mutex::new(LruCache::new(size)),
        }
    }

    fn digest(id: &[u8]) -> [u8; 32] {
        Sha256::digest(id).into()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(NonZeroUsize::new(DEFAULT_CACHE_SIZE).expect("Default size should be positive"))
    }
}

impl Cache for MemoryCache {
    fn cache(&self, id: &[u8], encoded: &str) {
        self.encoded
            .lock()
            .put(Self::digest(id), encoded.to_string());
        self.decoded.lock().put(encoded.to_string(), id.to_vec());
    }

    fn cache_decoded(&self, encoded: &str, id: &[u8]) {
        self.decoded.lock().put(encoded.to_string(), id.to_vec());
    }

    fn get_encoded(&self, id: &[u8]) -> Option<String> {
        let hit = self.encoded.lock().get(&Self::digest(id)).cloned();
        if hit.is_some() {
            tracing::trace!("mask cache hit");
        }
        hit
    }

    fn get_bytes(&self, encoded: &str) -> Option<Vec<u8>> {
        let hit = self.decoded.lock().get(encoded).cloned();
        if hit.is_some() {
            tracing::trace!("unmask cache hit");
        }
        hit
    }

    fn clear(&self) {
        self.encoded.lock().clear();
        self.decoded.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_both_directions() {
        let cache = MemoryCache::default();
        assert_eq!(cache.get_encoded(b"id-1"), None);
        cache.cache(b"id-1", "token-1");
        assert_eq!(cache.get_encoded(b"id-1").as_deref(), Some("token-1"));
        assert_eq!(cache.get_bytes("token-1").as_deref(), Some(&b"id-1"[..]));
        assert_eq!(cache.get_bytes("token-2"), None);
    }

    #[test]
    fn test_decoded_tokens_stay_one_way() {
        let cache = MemoryCache::default();
        cache.cache_decoded("TOKEN-1", b"id-1");
        assert_eq!(cache.get_bytes("TOKEN-1").as_deref(), Some(&b"id-1"[..]));
        assert_eq!(cache.get_encoded(b"id-1"), None);
    }

    #[test]
    fn test_eviction() {
        let cache = MemoryCache::new(NonZeroUsize::new(2).unwrap());
        cache.cache(b"a", "A");
        cache.cache(b"b", "B");
        assert!(cache.get_encoded(b"a").is_some());
        cache.cache(b"c", "C");
        // "b" was least recently used on the encode side.
        assert!(cache.get_encoded(b"b").is_none());
        assert!(cache.get_encoded(b"a").is_some());
        assert!(cache.get_bytes("A").is_none());
        assert!(cache.get_bytes("C").is_some());
    }

    #[test]
    fn test_clear() {
        let cache = MemoryCache::default();
        cache.cache(b"x", "X");
        cache.clear();
        assert!(cache.get_encoded(b"x").is_none());
        assert!(cache.get_bytes("X").is_none());
    }
}
