use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rand::rngs::OsRng;
use rand::RngCore;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{ConfigError, Error};

pub const MIN_KEY_LENGTH: usize = 8;
pub const MAX_KEY_LENGTH: usize = 64;
pub const MAX_KEY_ID: u8 = 0x0f;

const RANDOM_KEY_LENGTH: usize = 16;

// Shannon entropy in bits per byte. Rejects small counters and repeated patterns.
const MIN_KEY_ENTROPY: f64 = 2.5;

/// A secret key and the 4-bit id it is published under in every envelope.
///
/// The key bytes are zeroized on drop. `Debug` never prints them, and equality
/// is checked in constant time. Clone is not implemented, so there is exactly
/// one copy of the bytes per record.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecretKey {
    #[zeroize(skip)]
    key_id: u8,
    bytes: Vec<u8>,
}

impl SecretKey {
    /// Creates a key record after validating both the id and the key material.
    ///
    /// # Errors
    ///
    /// * `KeyIdOutOfRange` if `key_id` does not fit in 4 bits.
    /// * `InvalidKeyLength` unless the key is 8 to 64 bytes long.
    /// * `ZeroKey` if every byte is zero.
    /// * `LowEntropyKey` if the bytes look like a counter or a repeated pattern.
    pub fn new(key_id: u8, bytes: &[u8]) -> Result<Self, ConfigError> {
        if key_id > MAX_KEY_ID {
            return Err(ConfigError::KeyIdOutOfRange(key_id));
        }
        if !(MIN_KEY_LENGTH..=MAX_KEY_LENGTH).contains(&bytes.len()) {
            return Err(ConfigError::InvalidKeyLength(bytes.len()));
        }
        if bytes.iter().all(|&b| b == 0) {
            return Err(ConfigError::ZeroKey);
        }
        if byte_entropy(bytes) < MIN_KEY_ENTROPY {
            return Err(ConfigError::LowEntropyKey);
        }
        Ok(SecretKey {
            key_id,
            bytes: bytes.to_vec(),
        })
    }

    /// Creates a key record with key id 0.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        Self::new(0, bytes)
    }

    /// Generates a fresh 16 byte key from the operating system RNG.
    pub fn random(key_id: u8) -> Result<Self, ConfigError> {
        let mut bytes = [0u8; RANDOM_KEY_LENGTH];
        loop {
            OsRng.fill_bytes(&mut bytes);
            match Self::new(key_id, &bytes) {
                Err(ConfigError::LowEntropyKey) | Err(ConfigError::ZeroKey) => continue,
                result => {
                    bytes.zeroize();
                    return result;
                }
            }
        }
    }

    pub fn key_id(&self) -> u8 {
        self.key_id
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Overwrites the key bytes with random data.
    pub fn clear(&mut self) {
        OsRng.fill_bytes(&mut self.bytes);
    }
}

impl PartialEq for SecretKey {
    fn eq(&self, other: &Self) -> bool {
        self.key_id == other.key_id && bool::from(self.bytes.as_slice().ct_eq(&other.bytes))
    }
}

impl Eq for SecretKey {}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SecretKey")
            .field("key_id", &self.key_id)
            .field("len", &self.bytes.len())
            .finish_non_exhaustive()
    }
}

fn byte_entropy(bytes: &[u8]) -> f64 {
    let mut counts = [0usize; 256];
    for &b in bytes {
        counts[b as usize] += 1;
    }
    let total = bytes.len() as f64;
    counts
        .iter()
        .filter(|&&count| count > 0)
        .map(|&count| {
            let p = count as f64 / total;
            -p * p.log2()
        })
        .sum()
}

/// Holds the active key plus any legacy keys, indexed by key id.
///
/// The map is fixed at construction. `clear()` is the only mutation and is
/// meant for shutdown: it must not race with in-flight mask/unmask calls.
pub struct KeyManager {
    active_key_id: u8,
    keys: RwLock<HashMap<u8, Arc<SecretKey>>>,
}

impl KeyManager {
    /// Creates a manager holding a single key, which becomes the active key.
    pub fn new(active: SecretKey) -> Self {
        let active_key_id = active.key_id();
        let mut keys = HashMap::new();
        keys.insert(active_key_id, Arc::new(active));
        tracing::debug!(active_key_id, key_count = 1, "key manager created");
        KeyManager {
            active_key_id,
            keys: RwLock::new(keys),
        }
    }

    /// Creates a manager with an active key and older keys that are still
    /// accepted when unmasking.
    ///
    /// # Errors
    ///
    /// `DuplicateKeyId` if two keys share an id.
    pub fn with_legacy<I>(active: SecretKey, legacy: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = SecretKey>,
    {
        let active_key_id = active.key_id();
        let mut keys = HashMap::new();
        keys.insert(active_key_id, Arc::new(active));
        for key in legacy {
            let key_id = key.key_id();
            if keys.insert(key_id, Arc::new(key)).is_some() {
                return Err(ConfigError::DuplicateKeyId(key_id));
            }
        }
        tracing::debug!(active_key_id, key_count = keys.len(), "key manager created");
        Ok(KeyManager {
            active_key_id,
            keys: RwLock::new(keys),
        })
    }

    /// Shorthand for a manager with one key of id 0.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        Ok(Self::new(SecretKey::from_bytes(bytes)?))
    }

    /// A manager with a single random key of id 0. Tokens do not survive a restart.
    pub fn with_random_key() -> Result<Self, ConfigError> {
        Ok(Self::new(SecretKey::random(0)?))
    }

    pub fn get_by_id(&self, key_id: u8) -> Option<Arc<SecretKey>> {
        self.keys.read().get(&key_id).cloned()
    }

    pub fn contains(&self, key_id: u8) -> bool {
        self.keys.read().contains_key(&key_id)
    }

    /// The active key, or `None` once the manager has been cleared.
    pub fn active_key(&self) -> Option<Arc<SecretKey>> {
        self.get_by_id(self.active_key_id)
    }

    pub fn active_key_id(&self) -> u8 {
        self.active_key_id
    }

    pub fn size(&self) -> usize {
        self.keys.read().len()
    }

    /// Wipes and drops every key. Later lookups return `None`.
    ///
    /// Keys still borrowed by a running call are zeroized when that call
    /// releases them.
    pub fn clear(&self) {
        let drained: Vec<_> = self.keys.write().drain().map(|(_, key)| key).collect();
        for mut key in drained {
            if let Some(key) = Arc::get_mut(&mut key) {
                key.clear();
            }
        }
        tracing::debug!(active_key_id = self.active_key_id, "key manager cleared");
    }
}

impl fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut ids: Vec<u8> = self.keys.read().keys().copied().collect();
        ids.sort_unstable();
        f.debug_struct("KeyManager")
            .field("active_key_id", &self.active_key_id)
            .field("key_ids", &ids)
            .finish()
    }
}

/// Memoizes a value derived from each key, such as an expanded HKDF key or a
/// keyed cipher. Entries are computed on first use and dropped together with
/// the key they came from.
pub(crate) struct DerivedKeyCache<D> {
    keys: Arc<KeyManager>,
    derived: RwLock<HashMap<u8, Arc<D>>>,
    derive: fn(&SecretKey) -> D,
}

impl<D> DerivedKeyCache<D> {
    pub(crate) fn new(keys: Arc<KeyManager>, derive: fn(&SecretKey) -> D) -> Self {
        DerivedKeyCache {
            keys,
            derived: RwLock::new(HashMap::new()),
            derive,
        }
    }

    /// Resolves `key_id` to its derived value.
    pub(crate) fn get(&self, key_id: u8) -> Option<Arc<D>> {
        let Some(key) = self.keys.get_by_id(key_id) else {
            // Unknown ids come from untrusted envelopes. Take the write lock only to purge.
            if self.derived.read().contains_key(&key_id) {
                self.derived.write().remove(&key_id);
            }
            return None;
        };
        if let Some(derived) = self.derived.read().get(&key_id) {
            return Some(derived.clone());
        }
        let derived = Arc::new((self.derive)(&key));
        Some(self.derived.write().entry(key_id).or_insert(derived).clone())
    }

    /// The active key id and its derived value.
    pub(crate) fn active(&self) -> Result<(u8, Arc<D>), Error> {
        let key_id = self.keys.active_key_id();
        self.get(key_id)
            .map(|derived| (key_id, derived))
            .ok_or(Error::NoActiveKey)
    }

    /// Drops every derived value and clears the underlying key manager.
    pub(crate) fn clear(&self) {
        self.derived.write().clear();
        self.keys.clear();
    }
}
