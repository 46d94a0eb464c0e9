use std::sync::Arc;

use uuid::Uuid;

use crate::cache::{Cache, MemoryCache};
use crate::convert::{
    BigIntegerConverter, ByteArrayConverter, CompactIntConverter, IntConverter, LongConverter,
    LongTuple, LongTupleConverter, TypeConverter, U128Converter, UnsignedLongConverter,
    UuidConverter,
};
use crate::encoding::TextCodec;
use crate::engine::{Engine, IdEncConfig, MaskEngine};
use crate::error::{ConfigError, Error};
use crate::keys::KeyManager;
use crate::Config;

/// Longest token `unmask` will look at. Longer input is rejected before decoding.
pub const MAX_MASKED_ID_ENCODED_LENGTH: usize = 256;

/// Masks ids of type `T` into printable tokens and back.
///
/// An `IdMask` bundles an engine, a converter for `T`, a text codec and an
/// optional result cache. It can be shared between threads.
pub struct IdMask<T> {
    engine: Engine,
    converter: Box<dyn TypeConverter<T>>,
    codec: Arc<dyn TextCodec>,
    cache: Option<Arc<dyn Cache>>,
    keys: Arc<KeyManager>,
}

impl<T> IdMask<T> {
    /// Combines any engine with any converter.
    ///
    /// # Errors
    ///
    /// `LengthMismatch` if the converter's byte length differs from the
    /// value length the engine takes.
    ///
    /// # Examples
    ///
    /// ```
    /// use masked_id::{Config, Engine, IdEncConfig, IdMask, LongConverter};
    ///
    /// let config = Config::from_key(&[
    ///     0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77,
    ///     0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff,
    /// ]).unwrap();
    /// let mask = IdMask::custom(&config, Engine::siv(&config, IdEncConfig::Int8), LongConverter)
    ///     .unwrap();
    /// let token = mask.mask(&42).unwrap();
    /// assert_eq!(mask.unmask(&token).unwrap(), 42);
    /// ```
    pub fn custom(
        config: &Config,
        engine: Engine,
        converter: impl TypeConverter<T> + 'static,
    ) -> Result<Self, ConfigError> {
        if engine.value_len() != converter.byte_len() {
            return Err(ConfigError::LengthMismatch {
                engine: engine.value_len(),
                converter: converter.byte_len(),
            });
        }
        Ok(Self::build(config, engine, converter))
    }

    fn build(config: &Config, engine: Engine, converter: impl TypeConverter<T> + 'static) -> Self {
        let cache = config
            .cache_size
            .map(|size| Arc::new(MemoryCache::new(size)) as Arc<dyn Cache>);
        IdMask {
            engine,
            converter: Box::new(converter),
            codec: config.codec.clone(),
            cache,
            keys: config.keys.clone(),
        }
    }

    /// Replaces the result cache, e.g. with one shared across processes.
    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    // Randomized tokens differ per call, so caching them would only pin one.
    // A cleared key manager may be shared with other masks whose caches are
    // still full, so the cache only answers while the active key exists.
    fn active_cache(&self) -> Option<&dyn Cache> {
        if self.engine.is_randomized() || !self.keys.contains(self.keys.active_key_id()) {
            None
        } else {
            self.cache.as_deref()
        }
    }

    /// Masks `id` into a printable token.
    pub fn mask(&self, id: &T) -> Result<String, Error> {
        let bytes = self.converter.to_bytes(id)?;
        let cache = self.active_cache();
        if let Some(encoded) = cache.and_then(|cache| cache.get_encoded(&bytes)) {
            return Ok(encoded);
        }
        let envelope = self.engine.mask(&bytes)?;
        let encoded = self.codec.encode(&envelope);
        if let Some(cache) = cache {
            cache.cache(&bytes, &encoded);
        }
        Ok(encoded)
    }

    /// Recovers the id from a token produced by `mask`.
    ///
    /// # Errors
    ///
    /// * `InputLength` if the token or its decoded envelope has the wrong length.
    /// * `DecodingFailed` if the token is not valid for the text codec.
    /// * `Authentication` if the token was forged, corrupted or made with an
    ///   unknown key or another engine.
    /// * `InvalidId` if the recovered bytes are not a valid `T`.
    pub fn unmask(&self, token: &str) -> Result<T, Error> {
        let length = token.chars().count();
        if length > MAX_MASKED_ID_ENCODED_LENGTH {
            return Err(Error::InputLength {
                expected: MAX_MASKED_ID_ENCODED_LENGTH,
                actual: length,
            });
        }
        let cache = self.active_cache();
        if let Some(bytes) = cache.and_then(|cache| cache.get_bytes(token)) {
            return self.converter.from_bytes(&bytes);
        }
        let envelope = self.codec.decode(token)?;
        let bytes = self.engine.unmask(&envelope)?;
        let id = self.converter.from_bytes(&bytes)?;
        if let Some(cache) = cache {
            cache.cache_decoded(token, &bytes);
        }
        Ok(id)
    }

    /// Wipes the keys and derived keys behind this mask and empties its cache.
    /// Every mask sharing the same key manager stops working, and their caches
    /// are no longer consulted.
    pub fn clear(&self) {
        self.engine.clear();
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }
}

impl IdMask<i64> {
    /// 64-bit integers with the 8 byte engine.
    pub fn for_long_ids(config: &Config) -> Self {
        Self::build(config, Engine::eight_byte(config), LongConverter)
    }

    /// 64-bit integers with the 8 byte SIV engine.
    pub fn for_long_ids_siv(config: &Config) -> Self {
        Self::build(config, Engine::siv(config, IdEncConfig::Int8), LongConverter)
    }
}

impl IdMask<u64> {
    /// Unsigned 64-bit integers with the 8 byte engine.
    pub fn for_unsigned_long_ids(config: &Config) -> Self {
        Self::build(config, Engine::eight_byte(config), UnsignedLongConverter)
    }
}

impl IdMask<i32> {
    /// 32-bit integers with the 8 byte engine. Tokens look like 64-bit ones.
    pub fn for_int_ids(config: &Config) -> Self {
        Self::build(config, Engine::eight_byte(config), IntConverter)
    }

    /// 32-bit integers with the 4 byte SIV engine.
    pub fn for_int_ids_siv(config: &Config) -> Self {
        Self::build(config, Engine::siv(config, IdEncConfig::Int4), CompactIntConverter)
    }
}

impl IdMask<LongTuple> {
    pub fn for_long_tuples(config: &Config) -> Self {
        Self::build(config, Engine::sixteen_byte(config), LongTupleConverter)
    }
}

impl IdMask<Uuid> {
    pub fn for_uuids(config: &Config) -> Self {
        Self::build(config, Engine::sixteen_byte(config), UuidConverter)
    }

    pub fn for_uuids_siv(config: &Config) -> Self {
        Self::build(config, Engine::siv(config, IdEncConfig::Int16), UuidConverter)
    }
}

impl IdMask<u128> {
    pub fn for_u128_ids(config: &Config) -> Self {
        Self::build(config, Engine::sixteen_byte(config), U128Converter)
    }
}

impl IdMask<i128> {
    /// Signed integers of up to 15 bytes in two's complement.
    pub fn for_big_integers(config: &Config) -> Self {
        Self::build(config, Engine::sixteen_byte(config), BigIntegerConverter)
    }
}

impl IdMask<[u8; 16]> {
    pub fn for_byte_arrays(config: &Config) -> Self {
        Self::build(config, Engine::sixteen_byte(config), ByteArrayConverter::<16>)
    }
}

impl IdMask<[u8; 32]> {
    /// 256-bit values with the 32 byte SIV engine.
    pub fn for_256_bit_ids(config: &Config) -> Self {
        Self::build(config, Engine::siv(config, IdEncConfig::Int32), ByteArrayConverter::<32>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::{Base16, CleanBase32, Formatted};
    use crate::error::AuthFailure;
    use crate::keys::SecretKey;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const KEY: [u8; 16] = [
        0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd, 0xee,
        0xff,
    ];

    fn config() -> Config {
        Config::from_key(&KEY).unwrap()
    }

    #[test]
    fn test_long_ids() {
        let mask = IdMask::for_long_ids(&config().codec(Base16));
        assert_eq!(mask.mask(&0).unwrap(), "2a2a6dba410f67be98535c3d9b57c36d38");
        assert_eq!(
            mask.unmask("2a2a6dba410f67be98535c3d9b57c36d38").unwrap(),
            0
        );
        assert_eq!(
            mask.unmask("2A2A6DBA410F67BE98535C3D9B57C36D38").unwrap(),
            0
        );
    }

    #[test]
    fn test_every_type_roundtrips() {
        for config in [config(), config().randomized(true), config().high_security(true)] {
            let longs = IdMask::for_long_ids(&config);
            assert_eq!(longs.unmask(&longs.mask(&-77).unwrap()).unwrap(), -77);

            let unsigned = IdMask::for_unsigned_long_ids(&config);
            let token = unsigned.mask(&u64::MAX).unwrap();
            assert_eq!(unsigned.unmask(&token).unwrap(), u64::MAX);

            let ints = IdMask::for_int_ids(&config);
            assert_eq!(ints.unmask(&ints.mask(&i32::MIN).unwrap()).unwrap(), i32::MIN);

            let siv_ints = IdMask::for_int_ids_siv(&config);
            assert_eq!(siv_ints.unmask(&siv_ints.mask(&12).unwrap()).unwrap(), 12);

            let siv_longs = IdMask::for_long_ids_siv(&config);
            assert_eq!(siv_longs.unmask(&siv_longs.mask(&12).unwrap()).unwrap(), 12);

            let tuples = IdMask::for_long_tuples(&config);
            let tuple = LongTuple(41, 19283183891);
            assert_eq!(tuples.unmask(&tuples.mask(&tuple).unwrap()).unwrap(), tuple);

            let uuid = Uuid::parse_str("eb1c6999-5fc1-4d5f-b98a-792949c38c45").unwrap();
            let uuids = IdMask::for_uuids(&config);
            assert_eq!(uuids.unmask(&uuids.mask(&uuid).unwrap()).unwrap(), uuid);
            let siv_uuids = IdMask::for_uuids_siv(&config);
            assert_eq!(siv_uuids.unmask(&siv_uuids.mask(&uuid).unwrap()).unwrap(), uuid);

            let wide = IdMask::for_u128_ids(&config);
            assert_eq!(wide.unmask(&wide.mask(&u128::MAX).unwrap()).unwrap(), u128::MAX);

            let big = IdMask::for_big_integers(&config);
            let value = -102156455271390838530260344i128;
            assert_eq!(big.unmask(&big.mask(&value).unwrap()).unwrap(), value);

            let arrays = IdMask::for_byte_arrays(&config);
            assert_eq!(arrays.unmask(&arrays.mask(&[7u8; 16]).unwrap()).unwrap(), [7u8; 16]);

            let arrays32 = IdMask::for_256_bit_ids(&config);
            assert_eq!(arrays32.unmask(&arrays32.mask(&[9u8; 32]).unwrap()).unwrap(), [9u8; 32]);
        }
    }

    #[test]
    fn test_determinism() {
        let deterministic = IdMask::for_uuids(&config());
        let randomized = IdMask::for_uuids(&config().randomized(true));
        let uuid = Uuid::from_u128(0x1234);
        assert_eq!(
            deterministic.mask(&uuid).unwrap(),
            deterministic.mask(&uuid).unwrap()
        );
        let a = randomized.mask(&uuid).unwrap();
        let b = randomized.mask(&uuid).unwrap();
        assert_ne!(a, b);
        assert_eq!(randomized.unmask(&a).unwrap(), uuid);
        assert_eq!(randomized.unmask(&b).unwrap(), uuid);
    }

    #[test]
    fn test_high_security_is_longer() {
        let uuid = Uuid::from_u128(99);
        let normal = IdMask::for_uuids(&config()).mask(&uuid).unwrap();
        let high = IdMask::for_uuids(&config().high_security(true))
            .mask(&uuid)
            .unwrap();
        assert!(high.len() > normal.len());
    }

    #[test]
    fn test_length_limits() {
        let mask = IdMask::for_long_ids(&config());
        let long = "A".repeat(MAX_MASKED_ID_ENCODED_LENGTH + 1);
        assert_eq!(
            mask.unmask(&long).unwrap_err(),
            Error::InputLength {
                expected: 256,
                actual: 257
            }
        );
        assert_eq!(
            mask.unmask("AAAA").unwrap_err(),
            Error::InputLength {
                expected: 17,
                actual: 3
            }
        );
        assert_eq!(mask.unmask("A").unwrap_err(), Error::DecodingFailed);
    }

    #[test]
    fn test_cross_engine_tokens() {
        let config = config();
        let token = IdMask::for_long_ids_siv(&config).mask(&5).unwrap();
        // 25 byte SIV envelope vs 17 byte expected.
        assert!(matches!(
            IdMask::for_long_ids(&config).unmask(&token),
            Err(Error::InputLength { .. })
        ));
        // Same length as a randomized 8 byte envelope, but it never authenticates.
        let randomized = config.clone().randomized(true);
        assert!(matches!(
            IdMask::for_long_ids(&randomized).unmask(&token),
            Err(Error::Authentication(_))
        ));
    }

    #[test]
    fn test_custom_length_mismatch() {
        let config = config();
        let result = IdMask::custom(&config, Engine::eight_byte(&config), UuidConverter);
        assert_eq!(
            result.err(),
            Some(ConfigError::LengthMismatch {
                engine: 8,
                converter: 16
            })
        );
        let custom = IdMask::custom(
            &config,
            Engine::siv(&config, IdEncConfig::Int4),
            CompactIntConverter,
        )
        .unwrap();
        assert_eq!(custom.unmask(&custom.mask(&-5).unwrap()).unwrap(), -5);
    }

    struct CountingCache {
        inner: MemoryCache,
        hits: AtomicUsize,
        stores: AtomicUsize,
    }

    impl Cache for CountingCache {
        fn cache(&self, id: &[u8], encoded: &str) {
            self.stores.fetch_add(1, Ordering::SeqCst);
            self.inner.cache(id, encoded);
        }

        fn cache_decoded(&self, encoded: &str, id: &[u8]) {
            self.stores.fetch_add(1, Ordering::SeqCst);
            self.inner.cache_decoded(encoded, id);
        }

        fn get_encoded(&self, id: &[u8]) -> Option<String> {
            let hit = self.inner.get_encoded(id);
            if hit.is_some() {
                self.hits.fetch_add(1, Ordering::SeqCst);
            }
            hit
        }

        fn get_bytes(&self, encoded: &str) -> Option<Vec<u8>> {
            let hit = self.inner.get_bytes(encoded);
            if hit.is_some() {
                self.hits.fetch_add(1, Ordering::SeqCst);
            }
            hit
        }

        fn clear(&self) {
            self.inner.clear();
        }
    }

    fn counting_cache() -> Arc<CountingCache> {
        Arc::new(CountingCache {
            inner: MemoryCache::default(),
            hits: AtomicUsize::new(0),
            stores: AtomicUsize::new(0),
        })
    }

    #[test]
    fn test_cache_is_used_when_deterministic() {
        let cache = counting_cache();
        let mask = IdMask::for_long_ids(&config()).with_cache(cache.clone());
        let token = mask.mask(&10).unwrap();
        assert_eq!(mask.mask(&10).unwrap(), token);
        assert_eq!(mask.unmask(&token).unwrap(), 10);
        assert_eq!(cache.hits.load(Ordering::SeqCst), 2);
        assert_eq!(cache.stores.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unmasked_spelling_does_not_replace_masked_token() {
        let mask = IdMask::for_long_ids(&config().codec(Base16));
        assert_eq!(mask.unmask("2A2A6DBA410F67BE98535C3D9B57C36D38").unwrap(), 0);
        assert_eq!(mask.mask(&0).unwrap(), "2a2a6dba410f67be98535c3d9b57c36d38");
        assert_eq!(mask.unmask("2A2A6DBA410F67BE98535C3D9B57C36D38").unwrap(), 0);

        let formatted = || config().codec(Formatted::new(CleanBase32).unwrap());
        let canonical = IdMask::for_long_ids(&formatted().no_cache()).mask(&5).unwrap();
        let respaced = canonical
            .replace('-', "")
            .chars()
            .map(String::from)
            .collect::<Vec<_>>()
            .join("-");
        assert_ne!(respaced, canonical);
        let mask = IdMask::for_long_ids(&formatted());
        assert_eq!(mask.unmask(&respaced).unwrap(), 5);
        assert_eq!(mask.mask(&5).unwrap(), canonical);
    }

    #[test]
    fn test_legacy_token_does_not_replace_masked_token() {
        let legacy_token = IdMask::for_long_ids(&config()).mask(&7).unwrap();
        let rotated = Config::new(
            KeyManager::with_legacy(
                SecretKey::new(1, &[0x5d, 0x13, 0xa8, 0x42, 0xe7, 0x90, 0x3c, 0x6f]).unwrap(),
                [SecretKey::new(0, &KEY).unwrap()],
            )
            .unwrap(),
        );
        let expected = IdMask::for_long_ids(&rotated.clone().no_cache()).mask(&7).unwrap();
        let mask = IdMask::for_long_ids(&rotated);
        assert_eq!(mask.unmask(&legacy_token).unwrap(), 7);
        assert_eq!(mask.mask(&7).unwrap(), expected);
        assert_ne!(expected, legacy_token);
    }

    #[test]
    fn test_cleared_keys_disable_sibling_caches() {
        let config = config();
        let sibling = IdMask::for_long_ids(&config);
        let token = sibling.mask(&1).unwrap();
        assert_eq!(sibling.unmask(&token).unwrap(), 1);

        IdMask::for_uuids(&config).clear();
        assert_eq!(sibling.mask(&1).unwrap_err(), Error::NoActiveKey);
        assert_eq!(
            sibling.unmask(&token).unwrap_err(),
            Error::Authentication(AuthFailure::UnknownKey)
        );
    }

    #[test]
    fn test_cache_skips_failures_and_randomized() {
        let cache = counting_cache();
        let mask = IdMask::for_long_ids(&config()).with_cache(cache.clone());
        let mut token = mask.mask(&10).unwrap().into_bytes();
        token[5] = if token[5] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(token).unwrap();
        assert!(mask.unmask(&tampered).is_err());
        assert_eq!(cache.stores.load(Ordering::SeqCst), 1);

        let cache = counting_cache();
        let randomized = IdMask::for_long_ids(&config().randomized(true)).with_cache(cache.clone());
        let token = randomized.mask(&10).unwrap();
        assert_eq!(randomized.unmask(&token).unwrap(), 10);
        assert_eq!(cache.stores.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_clear() {
        let config = config();
        let mask = IdMask::for_long_ids(&config);
        let token = mask.mask(&1).unwrap();
        mask.clear();
        assert_eq!(mask.mask(&1).unwrap_err(), Error::NoActiveKey);
        assert_eq!(
            mask.unmask(&token).unwrap_err(),
            Error::Authentication(AuthFailure::UnknownKey)
        );
        assert_eq!(config.keys().size(), 0);
    }
}
