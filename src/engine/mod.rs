//! Masking engines: authenticated constructions that turn a fixed-length value
//! into a self-describing binary envelope and back.

mod eight_byte;
mod siv;
mod sixteen_byte;

pub use eight_byte::EightByteEngine;
pub use siv::{IdEncConfig, SivEngine};
pub use sixteen_byte::SixteenByteEngine;

use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha512;
use zeroize::Zeroizing;

use crate::error::{AuthFailure, Error};
use crate::keys::{DerivedKeyCache, SecretKey};
use crate::version;
use crate::Config;

/// Common interface of all engines.
///
/// Every call is independent, so one engine can be shared by any number of
/// threads. `clear` is a shutdown operation.
pub trait MaskEngine {
    /// The id written to the low nibble of the version byte.
    fn engine_id(&self) -> u8;

    /// Length of the plaintext values this engine accepts.
    fn value_len(&self) -> usize;

    /// Exact length of every envelope this engine produces and accepts.
    fn envelope_len(&self) -> usize;

    fn is_randomized(&self) -> bool;

    /// Encrypts `value` under the active key.
    fn mask(&self, value: &[u8]) -> Result<Vec<u8>, Error>;

    /// Authenticates and decrypts an envelope produced by `mask`.
    fn unmask(&self, envelope: &[u8]) -> Result<Vec<u8>, Error>;

    /// Wipes the key manager and every derived key held by this engine.
    fn clear(&self);
}

/// The available engines, dispatched by configuration.
pub enum Engine {
    EightByte(EightByteEngine),
    SixteenByte(SixteenByteEngine),
    Siv(SivEngine),
}

impl Engine {
    /// An AES-ECB engine for 8 byte values.
    pub fn eight_byte(config: &Config) -> Self {
        Engine::EightByte(EightByteEngine::new(config.keys.clone(), config.randomized))
    }

    /// An AES-CBC + HMAC engine for 16 byte values.
    pub fn sixteen_byte(config: &Config) -> Self {
        Engine::SixteenByte(SixteenByteEngine::new(
            config.keys.clone(),
            config.randomized,
            config.high_security,
        ))
    }

    /// An AES-SIV engine for 4, 8, 16 or 32 byte values.
    pub fn siv(config: &Config, id_config: IdEncConfig) -> Self {
        Engine::Siv(SivEngine::new(
            config.keys.clone(),
            id_config,
            config.randomized,
            config.obfuscation_key,
        ))
    }

    fn inner(&self) -> &dyn MaskEngine {
        match self {
            Engine::EightByte(engine) => engine,
            Engine::SixteenByte(engine) => engine,
            Engine::Siv(engine) => engine,
        }
    }
}

impl MaskEngine for Engine {
    fn engine_id(&self) -> u8 {
        self.inner().engine_id()
    }

    fn value_len(&self) -> usize {
        self.inner().value_len()
    }

    fn envelope_len(&self) -> usize {
        self.inner().envelope_len()
    }

    fn is_randomized(&self) -> bool {
        self.inner().is_randomized()
    }

    fn mask(&self, value: &[u8]) -> Result<Vec<u8>, Error> {
        self.inner().mask(value)
    }

    fn unmask(&self, envelope: &[u8]) -> Result<Vec<u8>, Error> {
        self.inner().unmask(envelope)
    }

    fn clear(&self) {
        self.inner().clear()
    }
}

impl From<EightByteEngine> for Engine {
    fn from(engine: EightByteEngine) -> Self {
        Engine::EightByte(engine)
    }
}

impl From<SixteenByteEngine> for Engine {
    fn from(engine: SixteenByteEngine) -> Self {
        Engine::SixteenByte(engine)
    }
}

impl From<SivEngine> for Engine {
    fn from(engine: SivEngine) -> Self {
        Engine::Siv(engine)
    }
}

/// HKDF-SHA512 extract over the raw key, with no salt. Every engine starts here.
pub(crate) fn root_key(key: &SecretKey) -> Zeroizing<[u8; 64]> {
    let (prk, _) = Hkdf::<Sha512>::extract(None, key.as_bytes());
    let mut out = Zeroizing::new([0u8; 64]);
    out.copy_from_slice(&prk);
    out
}

pub(crate) fn random_bytes(out: &mut [u8]) {
    OsRng.fill_bytes(out);
}

pub(crate) fn check_length(actual: usize, expected: usize) -> Result<(), Error> {
    if actual != expected {
        return Err(Error::InputLength { expected, actual });
    }
    Ok(())
}

pub(crate) fn reject(reason: AuthFailure) -> Error {
    tracing::debug!(reason = reason.code(), "envelope rejected");
    Error::Authentication(reason)
}

/// Reads the version byte, checks it names `engine_id`, and resolves the key it names.
///
/// The engine is checked first, so tokens from another engine are reported as
/// such even when their key id happens to be unknown.
pub(crate) fn resolve_key<D>(
    keys: &DerivedKeyCache<D>,
    engine_id: u8,
    version_byte: u8,
    first_ciphertext_byte: u8,
) -> Result<(u8, std::sync::Arc<D>), Error> {
    if version::decode_engine_id(version_byte, first_ciphertext_byte) != engine_id {
        return Err(reject(AuthFailure::UnknownEngine));
    }
    let key_id = version::decode_key_id(version_byte, first_ciphertext_byte);
    keys.get(key_id)
        .map(|derived| (key_id, derived))
        .ok_or_else(|| reject(AuthFailure::UnknownKey))
}
