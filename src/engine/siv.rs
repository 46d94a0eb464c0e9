use std::sync::Arc;

use aes_siv::siv::{Aes128Siv, Aes256Siv};
use aes_siv::KeyInit;
use hkdf::Hkdf;
use sha2::{Sha256, Sha512};
use zeroize::Zeroizing;

use super::{check_length, random_bytes, reject, resolve_key, root_key, MaskEngine};
use crate::error::{AuthFailure, Error};
use crate::keys::{DerivedKeyCache, KeyManager, SecretKey};
use crate::version;

const SIV_KEY_INFO: &[u8] = b"siv-key";
const OBFUSCATION_INFO: &[u8] = b"envelope-obfuscation";
const MAX_SIV_KEY_LENGTH: usize = 64;

/// Value sizes supported by the SIV engine. Each size is a separate engine id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdEncConfig {
    Int4,
    Int8,
    Int16,
    Int32,
}

struct SivParams {
    engine_id: u8,
    value_len: usize,
    entropy_len: usize,
    tag_len: usize,
    key_len: usize,
}

impl IdEncConfig {
    const fn params(self) -> SivParams {
        match self {
            IdEncConfig::Int4 => SivParams {
                engine_id: 2,
                value_len: 4,
                entropy_len: 8,
                tag_len: 16,
                key_len: 32,
            },
            IdEncConfig::Int8 => SivParams {
                engine_id: 3,
                value_len: 8,
                entropy_len: 8,
                tag_len: 16,
                key_len: 32,
            },
            IdEncConfig::Int16 => SivParams {
                engine_id: 4,
                value_len: 16,
                entropy_len: 12,
                tag_len: 16,
                key_len: 64,
            },
            IdEncConfig::Int32 => SivParams {
                engine_id: 5,
                value_len: 32,
                entropy_len: 16,
                tag_len: 16,
                key_len: 64,
            },
        }
    }

    /// The config for values of `len` bytes, if there is one.
    pub fn for_value_len(len: usize) -> Option<Self> {
        [
            IdEncConfig::Int4,
            IdEncConfig::Int8,
            IdEncConfig::Int16,
            IdEncConfig::Int32,
        ]
        .into_iter()
        .find(|config| config.value_len() == len)
    }

    pub fn engine_id(self) -> u8 {
        self.params().engine_id
    }

    pub fn value_len(self) -> usize {
        self.params().value_len
    }

    /// Random bytes added per envelope in randomized mode.
    pub fn entropy_len(self) -> usize {
        self.params().entropy_len
    }

    pub fn tag_len(self) -> usize {
        self.params().tag_len
    }

    /// Combined length of the MAC and encryption keys passed to AES-SIV.
    pub fn key_len(self) -> usize {
        self.params().key_len
    }
}

// Expands to the longest key any config needs; shorter configs use a prefix,
// which is exactly what HKDF would produce for that shorter length.
fn derive_siv_key(key: &SecretKey) -> Zeroizing<[u8; MAX_SIV_KEY_LENGTH]> {
    let prk = root_key(key);
    let mut okm = Zeroizing::new([0u8; MAX_SIV_KEY_LENGTH]);
    Hkdf::<Sha512>::from_prk(&prk[..])
        .expect("PRK length 64 should be valid")
        .expand(SIV_KEY_INFO, &mut okm[..])
        .expect("Length 64 should be valid");
    okm
}

/// Masks 4, 8, 16 or 32 byte values with AES-SIV (RFC 5297).
///
/// The single associated data item is `key_id || engine_id || entropy`, so a
/// token cannot be replayed under another key or engine id. The finished
/// envelope `version || [entropy] || tag || ciphertext` is XORed with a fixed
/// keystream derived from the obfuscation key. That keystream only hides the
/// structure of the envelope; all authentication comes from the SIV tag.
pub struct SivEngine {
    keys: DerivedKeyCache<Zeroizing<[u8; MAX_SIV_KEY_LENGTH]>>,
    config: IdEncConfig,
    randomized: bool,
    keystream: Zeroizing<Vec<u8>>,
}

impl SivEngine {
    pub fn new(
        keys: Arc<KeyManager>,
        config: IdEncConfig,
        randomized: bool,
        obfuscation_key: [u8; 8],
    ) -> Self {
        let mut engine = SivEngine {
            keys: DerivedKeyCache::new(keys, derive_siv_key),
            config,
            randomized,
            keystream: Zeroizing::new(Vec::new()),
        };
        let mut keystream = Zeroizing::new(vec![0u8; engine.envelope_len()]);
        Hkdf::<Sha256>::new(None, &obfuscation_key)
            .expand(OBFUSCATION_INFO, &mut keystream)
            .expect("Envelope length should be a valid HKDF length");
        engine.keystream = keystream;
        engine
    }

    pub fn config(&self) -> IdEncConfig {
        self.config
    }

    fn entropy_len(&self) -> usize {
        if self.randomized {
            self.config.entropy_len()
        } else {
            0
        }
    }

    fn associated_data(&self, key_id: u8, entropy: &[u8]) -> Vec<u8> {
        let mut ad = Vec::with_capacity(2 + entropy.len());
        ad.push(key_id);
        ad.push(self.config.engine_id());
        ad.extend_from_slice(entropy);
        ad
    }

    fn obfuscate(&self, envelope: &mut [u8]) {
        for (b, k) in envelope.iter_mut().zip(self.keystream.iter()) {
            *b ^= k;
        }
    }

    fn seal(&self, key: &[u8], ad: &[u8], value: &[u8]) -> Vec<u8> {
        let key = &key[..self.config.key_len()];
        if key.len() == 32 {
            Aes128Siv::new_from_slice(key)
                .expect("Key length 32 should be valid")
                .encrypt([ad], value)
                .expect("One associated data item should be accepted")
        } else {
            Aes256Siv::new_from_slice(key)
                .expect("Key length 64 should be valid")
                .encrypt([ad], value)
                .expect("One associated data item should be accepted")
        }
    }

    fn open(&self, key: &[u8], ad: &[u8], sealed: &[u8]) -> Result<Vec<u8>, Error> {
        let key = &key[..self.config.key_len()];
        let opened = if key.len() == 32 {
            Aes128Siv::new_from_slice(key)
                .expect("Key length 32 should be valid")
                .decrypt([ad], sealed)
        } else {
            Aes256Siv::new_from_slice(key)
                .expect("Key length 64 should be valid")
                .decrypt([ad], sealed)
        };
        opened.map_err(|_| reject(AuthFailure::Mismatch))
    }
}

impl MaskEngine for SivEngine {
    fn engine_id(&self) -> u8 {
        self.config.engine_id()
    }

    fn value_len(&self) -> usize {
        self.config.value_len()
    }

    fn envelope_len(&self) -> usize {
        1 + self.entropy_len() + self.config.tag_len() + self.config.value_len()
    }

    fn is_randomized(&self) -> bool {
        self.randomized
    }

    fn mask(&self, value: &[u8]) -> Result<Vec<u8>, Error> {
        check_length(value.len(), self.config.value_len())?;
        let (key_id, key) = self.keys.active()?;

        let mut entropy = vec![0u8; self.entropy_len()];
        random_bytes(&mut entropy);

        let sealed = self.seal(&key[..], &self.associated_data(key_id, &entropy), value);

        let mut envelope = Vec::with_capacity(self.envelope_len());
        envelope.push(version::encode(key_id, self.engine_id(), sealed[0])?);
        envelope.extend_from_slice(&entropy);
        envelope.extend_from_slice(&sealed);
        self.obfuscate(&mut envelope);
        Ok(envelope)
    }

    fn unmask(&self, envelope: &[u8]) -> Result<Vec<u8>, Error> {
        check_length(envelope.len(), self.envelope_len())?;

        let mut envelope = envelope.to_vec();
        self.obfuscate(&mut envelope);
        let (entropy, sealed) = envelope[1..].split_at(self.entropy_len());

        let (key_id, key) = resolve_key(&self.keys, self.engine_id(), envelope[0], sealed[0])?;
        self.open(&key[..], &self.associated_data(key_id, entropy), sealed)
    }

    fn clear(&self) {
        self.keys.clear();
    }
}
