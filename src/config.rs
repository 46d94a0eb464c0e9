use std::fmt;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::cache::DEFAULT_CACHE_SIZE;
use crate::encoding::{Base64Url, TextCodec};
use crate::error::ConfigError;
use crate::keys::KeyManager;

static GLOBAL_CONFIG: Lazy<Mutex<Option<Config>>> = Lazy::new(|| Mutex::new(None));
// Bumped by every `set_global`, so derived state can tell when to rebuild.
static GLOBAL_GENERATION: AtomicU64 = AtomicU64::new(0);

const OBFUSCATION_KEY_LENGTH: usize = 8;

/// Configuring the masked-id library.
#[derive(Clone)]
pub struct Config {
    pub(crate) keys: Arc<KeyManager>,
    pub(crate) codec: Arc<dyn TextCodec>,
    pub(crate) randomized: bool,
    pub(crate) high_security: bool,
    pub(crate) cache_size: Option<NonZeroUsize>,
    pub(crate) obfuscation_key: [u8; OBFUSCATION_KEY_LENGTH],
}

impl Config {
    /// Creates a new configuration with the given key manager and other settings in
    /// default values.
    /// - The text codec defaults to URL safe Base64 without padding.
    /// - `randomized` defaults to false: the same id always masks to the same token.
    /// - `high_security` defaults to false, giving 8 byte MACs on 16 byte values.
    /// - The result cache holds 256 entries per direction.
    /// - The SIV obfuscation key is 8 zero bytes.
    pub fn new(keys: KeyManager) -> Self {
        Self::with_shared_keys(Arc::new(keys))
    }

    /// Like `new`, for a key manager that is shared with other configurations.
    pub fn with_shared_keys(keys: Arc<KeyManager>) -> Self {
        Config {
            keys,
            codec: Arc::new(Base64Url),
            randomized: false,
            high_security: false,
            cache_size: NonZeroUsize::new(DEFAULT_CACHE_SIZE),
            obfuscation_key: [0u8; OBFUSCATION_KEY_LENGTH],
        }
    }

    /// Shorthand for a configuration with a single key of id 0.
    pub fn from_key(key: &[u8]) -> Result<Self, ConfigError> {
        Ok(Self::new(KeyManager::from_bytes(key)?))
    }

    /// Sets the codec that turns envelopes into text.
    pub fn codec(mut self, codec: impl TextCodec + 'static) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    /// Adds fresh random entropy to every token. The same id then masks to a
    /// different token each time, and tokens get longer. Disables the cache.
    pub fn randomized(mut self, randomized: bool) -> Self {
        self.randomized = randomized;
        self
    }

    /// Uses 16 byte instead of 8 byte MACs for 16 byte values.
    pub fn high_security(mut self, high_security: bool) -> Self {
        self.high_security = high_security;
        self
    }

    /// Sets the number of results cached per direction.
    /// The value must be at least 1; use `no_cache` to disable caching.
    pub fn cache_size(mut self, size: usize) -> Result<Self, ConfigError> {
        self.cache_size = Some(NonZeroUsize::new(size).ok_or(ConfigError::InvalidCacheSize)?);
        Ok(self)
    }

    pub fn no_cache(mut self) -> Self {
        self.cache_size = None;
        self
    }

    /// Sets the key for the cosmetic XOR applied to SIV envelopes.
    /// The key must be exactly 8 bytes. It is not a secret.
    pub fn obfuscation_key(mut self, key: &[u8]) -> Result<Self, ConfigError> {
        self.obfuscation_key = key
            .try_into()
            .map_err(|_| ConfigError::InvalidObfuscationKey(key.len()))?;
        Ok(self)
    }

    pub fn keys(&self) -> &Arc<KeyManager> {
        &self.keys
    }

    /// Sets the global configuration. This should be called before the `Field` type methods
    /// are called.
    pub fn set_global(config: Config) {
        let mut global = GLOBAL_CONFIG.lock();
        *global = Some(config);
        GLOBAL_GENERATION.fetch_add(1, Ordering::Release);
    }

    /// Accesses the global configuration, if set.
    pub fn global() -> Option<Config> {
        GLOBAL_CONFIG.lock().clone()
    }

    /// Number of `set_global` calls so far.
    pub(crate) fn global_generation() -> u64 {
        GLOBAL_GENERATION.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Config")
            .field("keys", &self.keys)
            .field("randomized", &self.randomized)
            .field("high_security", &self.high_security)
            .field("cache_size", &self.cache_size)
            .finish_non_exhaustive()
    }
}
