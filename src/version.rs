//! The version byte that makes every envelope self-describing.
//!
//! The high nibble carries the key id, the low nibble the engine id. The packed
//! byte is XORed with the first ciphertext byte so envelopes don't all start
//! with the same recognizable value. This is obfuscation only.

use crate::error::ConfigError;
use crate::keys::MAX_KEY_ID;

const MAX_ENGINE_ID: u8 = 0x0f;

/// Packs `key_id` and `engine_id` and obfuscates them with `first_ciphertext_byte`.
pub fn encode(key_id: u8, engine_id: u8, first_ciphertext_byte: u8) -> Result<u8, ConfigError> {
    if key_id > MAX_KEY_ID {
        return Err(ConfigError::KeyIdOutOfRange(key_id));
    }
    if engine_id > MAX_ENGINE_ID {
        return Err(ConfigError::EngineIdOutOfRange(engine_id));
    }
    Ok(((key_id << 4) | engine_id) ^ first_ciphertext_byte)
}

pub fn decode_key_id(version_byte: u8, first_ciphertext_byte: u8) -> u8 {
    ((version_byte ^ first_ciphertext_byte) >> 4) & 0x0f
}

pub fn decode_engine_id(version_byte: u8, first_ciphertext_byte: u8) -> u8 {
    (version_byte ^ first_ciphertext_byte) & 0x0f
}
