use std::fmt;

use thiserror::Error;

/// Construction-time failures. Never raised by `mask` or `unmask` on a valid setup.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("key id {0} does not fit in 4 bits")]
    KeyIdOutOfRange(u8),
    #[error("engine id {0} does not fit in 4 bits")]
    EngineIdOutOfRange(u8),
    #[error("key length {0} is outside 8..=64 bytes")]
    InvalidKeyLength(usize),
    #[error("key must not be all zeros")]
    ZeroKey,
    #[error("key entropy is too low")]
    LowEntropyKey,
    #[error("key id {0} is used more than once")]
    DuplicateKeyId(u8),
    #[error("obfuscation key must be exactly 8 bytes, got {0}")]
    InvalidObfuscationKey(usize),
    #[error("cache size must be positive")]
    InvalidCacheSize,
    #[error("invalid alphabet: {0}")]
    InvalidAlphabet(String),
    #[error("invalid separator {0:?}")]
    InvalidSeparator(String),
    #[error("group length must be at least 2, got {0}")]
    InvalidGroupLength(usize),
    #[error("engine takes {engine} byte values, converter produces {converter}")]
    LengthMismatch { engine: usize, converter: usize },
    #[error("global configuration is not set")]
    MissingGlobalConfig,
}

/// Reason an envelope was rejected. Only the machine-readable code is exposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// MAC, SIV tag or reference value did not verify.
    Mismatch,
    /// The version byte names an engine other than the one decoding.
    UnknownEngine,
    /// The version byte names a key the key manager does not hold.
    UnknownKey,
}

impl AuthFailure {
    pub fn code(&self) -> &'static str {
        match self {
            AuthFailure::Mismatch => "AUTH_MISMATCH",
            AuthFailure::UnknownEngine => "UNKNOWN_ENGINE",
            AuthFailure::UnknownKey => "UNKNOWN_KEY",
        }
    }
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Error returned for mask/unmask errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid input length: expected {expected}, got {actual}")]
    InputLength { expected: usize, actual: usize },
    #[error("decoding string failed")]
    DecodingFailed,
    #[error("authentication failed: {0}")]
    Authentication(AuthFailure),
    #[error("invalid id: {0}")]
    InvalidId(&'static str),
    #[error("prefix was {received}, expected {expected}")]
    InvalidPrefix { received: String, expected: String },
    #[error("no active key available")]
    NoActiveKey,
}

impl Error {
    /// The authentication reason code, if this is an authentication failure.
    pub fn auth_code(&self) -> Option<&'static str> {
        match self {
            Error::Authentication(reason) => Some(reason.code()),
            _ => None,
        }
    }
}
