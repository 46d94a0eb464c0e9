use std::sync::Arc;

use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128, Block};
use subtle::ConstantTimeEq;

use super::{check_length, random_bytes, reject, resolve_key, root_key, MaskEngine};
use crate::error::{AuthFailure, Error};
use crate::keys::{DerivedKeyCache, KeyManager, SecretKey};
use crate::version;

const ENGINE_ID: u8 = 0;
const VALUE_LENGTH: usize = 8;
const REFERENCE_LENGTH: usize = 8;

/// Masks 8 byte values with a single AES-128 block.
///
/// The block is `reference || value`, where the reference is zero in
/// deterministic mode and random (and sent along) in randomized mode. After
/// decryption the reference must come back unchanged, which is the only
/// integrity check this engine has. It is weaker than a MAC: it catches
/// corruption and wrong keys, and it keeps envelopes at 17 bytes.
///
/// The key id is not bound to the ciphertext. Swapping the key id in the
/// version byte only selects another key, which then fails the reference check.
pub struct EightByteEngine {
    keys: DerivedKeyCache<Aes128>,
    randomized: bool,
}

fn derive_cipher(key: &SecretKey) -> Aes128 {
    let prk = root_key(key);
    Aes128::new_from_slice(&prk[..16]).expect("Key length 16 should be valid")
}

impl EightByteEngine {
    pub fn new(keys: Arc<KeyManager>, randomized: bool) -> Self {
        EightByteEngine {
            keys: DerivedKeyCache::new(keys, derive_cipher),
            randomized,
        }
    }
}

impl MaskEngine for EightByteEngine {
    fn engine_id(&self) -> u8 {
        ENGINE_ID
    }

    fn value_len(&self) -> usize {
        VALUE_LENGTH
    }

    fn envelope_len(&self) -> usize {
        if self.randomized {
            1 + REFERENCE_LENGTH + 16
        } else {
            1 + 16
        }
    }

    fn is_randomized(&self) -> bool {
        self.randomized
    }

    fn mask(&self, value: &[u8]) -> Result<Vec<u8>, Error> {
        check_length(value.len(), VALUE_LENGTH)?;
        let (key_id, cipher) = self.keys.active()?;

        let mut reference = [0u8; REFERENCE_LENGTH];
        if self.randomized {
            random_bytes(&mut reference);
        }

        let mut block = Block::default();
        block[..REFERENCE_LENGTH].copy_from_slice(&reference);
        block[REFERENCE_LENGTH..].copy_from_slice(value);
        cipher.encrypt_block(&mut block);

        let mut envelope = Vec::with_capacity(self.envelope_len());
        envelope.push(version::encode(key_id, ENGINE_ID, block[0])?);
        if self.randomized {
            envelope.extend_from_slice(&reference);
        }
        envelope.extend_from_slice(&block);
        Ok(envelope)
    }

    fn unmask(&self, envelope: &[u8]) -> Result<Vec<u8>, Error> {
        check_length(envelope.len(), self.envelope_len())?;

        let zero = [0u8; REFERENCE_LENGTH];
        let (reference, ciphertext) = if self.randomized {
            envelope[1..].split_at(REFERENCE_LENGTH)
        } else {
            (&zero[..], &envelope[1..])
        };
        let (_, cipher) = resolve_key(&self.keys, ENGINE_ID, envelope[0], ciphertext[0])?;

        let mut block = Block::clone_from_slice(ciphertext);
        cipher.decrypt_block(&mut block);

        if !bool::from(block[..REFERENCE_LENGTH].ct_eq(reference)) {
            return Err(reject(AuthFailure::Mismatch));
        }
        Ok(block[REFERENCE_LENGTH..].to_vec())
    }

    fn clear(&self) {
        self.keys.clear();
    }
}
