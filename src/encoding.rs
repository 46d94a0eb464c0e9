//! Text codecs that turn binary envelopes into printable tokens.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use data_encoding::{Encoding, Specification, BASE32_NOPAD};
use once_cell::sync::Lazy;

use crate::error::{ConfigError, Error};

/// Converts between bytes and text. Decoding must exactly invert encoding.
pub trait TextCodec: Send + Sync {
    fn encode(&self, bytes: &[u8]) -> String;

    fn decode(&self, text: &str) -> Result<Vec<u8>, Error>;

    /// Whether `c` can appear in the output of `encode`.
    fn is_symbol(&self, c: char) -> bool;
}

/// URL safe Base64 without padding (RFC 4648 section 5). The default codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct Base64Url;

impl TextCodec for Base64Url {
    fn encode(&self, bytes: &[u8]) -> String {
        URL_SAFE_NO_PAD.encode(bytes)
    }

    fn decode(&self, text: &str) -> Result<Vec<u8>, Error> {
        URL_SAFE_NO_PAD
            .decode(text)
            .map_err(|_| Error::DecodingFailed)
    }

    fn is_symbol(&self, c: char) -> bool {
        c.is_ascii_alphanumeric() || c == '-' || c == '_'
    }
}

/// Base32 without padding (RFC 4648 section 6).
#[derive(Debug, Clone, Copy, Default)]
pub struct Base32;

impl TextCodec for Base32 {
    fn encode(&self, bytes: &[u8]) -> String {
        BASE32_NOPAD.encode(bytes)
    }

    fn decode(&self, text: &str) -> Result<Vec<u8>, Error> {
        BASE32_NOPAD
            .decode(text.as_bytes())
            .map_err(|_| Error::DecodingFailed)
    }

    fn is_symbol(&self, c: char) -> bool {
        c.is_ascii_uppercase() || ('2'..='7').contains(&c)
    }
}

/// Lowercase hex. Decoding accepts either case.
#[derive(Debug, Clone, Copy, Default)]
pub struct Base16;

impl TextCodec for Base16 {
    fn encode(&self, bytes: &[u8]) -> String {
        hex::encode(bytes)
    }

    fn decode(&self, text: &str) -> Result<Vec<u8>, Error> {
        hex::decode(text).map_err(|_| Error::DecodingFailed)
    }

    fn is_symbol(&self, c: char) -> bool {
        c.is_ascii_hexdigit()
    }
}

static CLEAN_BASE32: Lazy<Encoding> = Lazy::new(|| {
    let mut spec = Specification::new();
    spec.symbols.push_str("0123456789ABCDEFGHJKMNPQRSTVWXYZ");
    spec.encoding()
        .expect("Crockford alphabet should be a valid specification")
});

/// Base32 over the Crockford alphabet, which leaves out `I`, `L`, `O` and `U`
/// so tokens are easy to read aloud and never spell common words.
#[derive(Debug, Clone, Copy, Default)]
pub struct CleanBase32;

impl TextCodec for CleanBase32 {
    fn encode(&self, bytes: &[u8]) -> String {
        CLEAN_BASE32.encode(bytes)
    }

    fn decode(&self, text: &str) -> Result<Vec<u8>, Error> {
        CLEAN_BASE32
            .decode(text.as_bytes())
            .map_err(|_| Error::DecodingFailed)
    }

    fn is_symbol(&self, c: char) -> bool {
        c.is_ascii() && CLEAN_BASE32.specification().symbols.contains(c)
    }
}

/// A codec over a caller-chosen alphabet.
///
/// The alphabet must have 2, 4, 8, 16, 32 or 64 distinct ASCII symbols.
#[derive(Debug, Clone)]
pub struct CustomAlphabet {
    encoding: Encoding,
    symbols: String,
}

impl CustomAlphabet {
    pub fn new(alphabet: &str) -> Result<Self, ConfigError> {
        let mut spec = Specification::new();
        spec.symbols.push_str(alphabet);
        let encoding = spec
            .encoding()
            .map_err(|err| ConfigError::InvalidAlphabet(err.to_string()))?;
        Ok(CustomAlphabet {
            encoding,
            symbols: alphabet.to_string(),
        })
    }
}

impl TextCodec for CustomAlphabet {
    fn encode(&self, bytes: &[u8]) -> String {
        self.encoding.encode(bytes)
    }

    fn decode(&self, text: &str) -> Result<Vec<u8>, Error> {
        self.encoding
            .decode(text.as_bytes())
            .map_err(|_| Error::DecodingFailed)
    }

    fn is_symbol(&self, c: char) -> bool {
        self.symbols.contains(c)
    }
}

pub const DEFAULT_GROUP_LENGTH: usize = 4;
pub const DEFAULT_SEPARATOR: &str = "-";
const MAX_SEPARATOR_LENGTH: usize = 6;

/// Splits the output of another codec into groups, e.g. `ABCD-EFGH-IJ`.
pub struct Formatted {
    inner: Box<dyn TextCodec>,
    group_length: usize,
    separator: String,
}

impl Formatted {
    /// Groups of 4 separated by `-`.
    pub fn new(inner: impl TextCodec + 'static) -> Result<Self, ConfigError> {
        Self::with_format(inner, DEFAULT_GROUP_LENGTH, DEFAULT_SEPARATOR)
    }

    /// # Errors
    ///
    /// * `InvalidGroupLength` if `group_length` is below 2.
    /// * `InvalidSeparator` if the separator is empty, longer than 6 characters,
    ///   or contains a symbol the inner codec can produce.
    pub fn with_format(
        inner: impl TextCodec + 'static,
        group_length: usize,
        separator: &str,
    ) -> Result<Self, ConfigError> {
        if group_length < 2 {
            return Err(ConfigError::InvalidGroupLength(group_length));
        }
        let separator_length = separator.chars().count();
        if separator_length == 0
            || separator_length > MAX_SEPARATOR_LENGTH
            || separator.chars().any(|c| inner.is_symbol(c))
        {
            return Err(ConfigError::InvalidSeparator(separator.to_string()));
        }
        Ok(Formatted {
            inner: Box::new(inner),
            group_length,
            separator: separator.to_string(),
        })
    }
}

impl TextCodec for Formatted {
    fn encode(&self, bytes: &[u8]) -> String {
        let encoded: Vec<char> = self.inner.encode(bytes).chars().collect();
        encoded
            .chunks(self.group_length)
            .map(|group| group.iter().collect::<String>())
            .collect::<Vec<_>>()
            .join(&self.separator)
    }

    fn decode(&self, text: &str) -> Result<Vec<u8>, Error> {
        self.inner.decode(&text.replace(&self.separator, ""))
    }

    fn is_symbol(&self, c: char) -> bool {
        self.inner.is_symbol(c) || self.separator.contains(c)
    }
}
