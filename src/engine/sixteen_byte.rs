use std::sync::Arc;

use aes::Aes128;
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::{check_length, random_bytes, reject, resolve_key, root_key, MaskEngine};
use crate::error::{AuthFailure, Error};
use crate::keys::{DerivedKeyCache, KeyManager};
use crate::version;

type HmacSha256 = Hmac<Sha256>;
type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

const ENGINE_ID: u8 = 1;
const BLOCK_LENGTH: usize = 16;
const ENTROPY_LENGTH: usize = 16;
const MAC_LENGTH: usize = 8;
const HIGH_SECURITY_MAC_LENGTH: usize = 16;

/// Per-message keys, expanded from the root key with the entropy as HKDF info.
#[derive(Zeroize, ZeroizeOnDrop)]
struct MessageKeys {
    cipher_key: [u8; 16],
    iv: [u8; 16],
    mac_key: [u8; 32],
}

impl MessageKeys {
    fn derive(prk: &[u8; 64], entropy: &[u8; ENTROPY_LENGTH]) -> Self {
        let mut okm = Zeroizing::new([0u8; 64]);
        Hkdf::<Sha512>::from_prk(prk)
            .expect("PRK length 64 should be valid")
            .expand(entropy, &mut okm[..])
            .expect("Length 64 should be valid");

        let mut keys = MessageKeys {
            cipher_key: [0u8; 16],
            iv: [0u8; 16],
            mac_key: [0u8; 32],
        };
        keys.cipher_key.copy_from_slice(&okm[..16]);
        keys.iv.copy_from_slice(&okm[16..32]);
        Hkdf::<Sha256>::from_prk(&okm[32..])
            .expect("PRK length 32 should be valid")
            .expand(b"macKey", &mut keys.mac_key)
            .expect("Length 32 should be valid");
        keys
    }

    fn mac(&self, ciphertext: &[u8], version_byte: u8) -> [u8; 32] {
        let mut mac =
            HmacSha256::new_from_slice(&self.mac_key).expect("Key length 32 should be valid");
        mac.update(&self.iv);
        mac.update(ciphertext);
        mac.update(&[version_byte]);
        mac.finalize().into_bytes().into()
    }
}

/// Masks 16 byte values (UUIDs, pairs of 64-bit integers, 128-bit numbers).
///
/// Cipher key, IV and MAC key are expanded from the root key with the entropy
/// as HKDF info. The value is XORed with the entropy, encrypted with AES-128-CBC,
/// and authenticated with a truncated HMAC-SHA256 over `iv || ciphertext || version`.
/// The MAC is verified before anything is decrypted.
///
/// Envelope: `version || [entropy] || ciphertext || mac`.
pub struct SixteenByteEngine {
    keys: DerivedKeyCache<Zeroizing<[u8; 64]>>,
    randomized: bool,
    mac_length: usize,
}

impl SixteenByteEngine {
    /// `high_security` doubles the MAC to 16 bytes.
    pub fn new(keys: Arc<KeyManager>, randomized: bool, high_security: bool) -> Self {
        SixteenByteEngine {
            keys: DerivedKeyCache::new(keys, root_key),
            randomized,
            mac_length: if high_security {
                HIGH_SECURITY_MAC_LENGTH
            } else {
                MAC_LENGTH
            },
        }
    }

    pub fn mac_len(&self) -> usize {
        self.mac_length
    }

    fn entropy_len(&self) -> usize {
        if self.randomized {
            ENTROPY_LENGTH
        } else {
            0
        }
    }
}

impl MaskEngine for SixteenByteEngine {
    fn engine_id(&self) -> u8 {
        ENGINE_ID
    }

    fn value_len(&self) -> usize {
        BLOCK_LENGTH
    }

    fn envelope_len(&self) -> usize {
        1 + self.entropy_len() + BLOCK_LENGTH + self.mac_length
    }

    fn is_randomized(&self) -> bool {
        self.randomized
    }

    fn mask(&self, value: &[u8]) -> Result<Vec<u8>, Error> {
        check_length(value.len(), BLOCK_LENGTH)?;
        let (key_id, prk) = self.keys.active()?;

        let mut entropy = [0u8; ENTROPY_LENGTH];
        if self.randomized {
            random_bytes(&mut entropy);
        }
        let keys = MessageKeys::derive(&prk, &entropy);

        let mut block = [0u8; BLOCK_LENGTH];
        for (out, (v, e)) in block.iter_mut().zip(value.iter().zip(&entropy)) {
            *out = v ^ e;
        }
        Aes128CbcEnc::new_from_slices(&keys.cipher_key, &keys.iv)
            .expect("Key and IV length 16 should be valid")
            .encrypt_padded_mut::<NoPadding>(&mut block, BLOCK_LENGTH)
            .expect("One full block should fit");

        let version_byte = version::encode(key_id, ENGINE_ID, block[0])?;
        let mac = keys.mac(&block, version_byte);

        let mut envelope = Vec::with_capacity(self.envelope_len());
        envelope.push(version_byte);
        if self.randomized {
            envelope.extend_from_slice(&entropy);
        }
        envelope.extend_from_slice(&block);
        envelope.extend_from_slice(&mac[..self.mac_length]);
        Ok(envelope)
    }

    fn unmask(&self, envelope: &[u8]) -> Result<Vec<u8>, Error> {
        check_length(envelope.len(), self.envelope_len())?;

        let version_byte = envelope[0];
        let mut entropy = [0u8; ENTROPY_LENGTH];
        let rest = if self.randomized {
            entropy.copy_from_slice(&envelope[1..1 + ENTROPY_LENGTH]);
            &envelope[1 + ENTROPY_LENGTH..]
        } else {
            &envelope[1..]
        };
        let (ciphertext, received_mac) = rest.split_at(BLOCK_LENGTH);

        let (_, prk) = resolve_key(&self.keys, ENGINE_ID, version_byte, ciphertext[0])?;
        let keys = MessageKeys::derive(&prk, &entropy);

        let mac = keys.mac(ciphertext, version_byte);
        if !bool::from(mac[..self.mac_length].ct_eq(received_mac)) {
            return Err(reject(AuthFailure::Mismatch));
        }

        let mut block = [0u8; BLOCK_LENGTH];
        block.copy_from_slice(ciphertext);
        Aes128CbcDec::new_from_slices(&keys.cipher_key, &keys.iv)
            .expect("Key and IV length 16 should be valid")
            .decrypt_padded_mut::<NoPadding>(&mut block)
            .expect("One full block should decrypt");
        for (b, e) in block.iter_mut().zip(&entropy) {
            *b ^= e;
        }
        Ok(block.to_vec())
    }

    fn clear(&self) {
        self.keys.clear();
    }
}
