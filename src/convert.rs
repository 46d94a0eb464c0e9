//! Fixed-length byte layouts for the id types the masks support.
//! All multi-byte integers are big-endian.

use uuid::Uuid;

use crate::engine::check_length;
use crate::error::Error;

/// Maps a typed id to and from the fixed-length bytes an engine takes.
pub trait TypeConverter<T>: Send + Sync {
    /// The exact number of bytes `to_bytes` produces and `from_bytes` accepts.
    fn byte_len(&self) -> usize;

    fn to_bytes(&self, value: &T) -> Result<Vec<u8>, Error>;

    fn from_bytes(&self, bytes: &[u8]) -> Result<T, Error>;
}

fn fixed<const N: usize>(bytes: &[u8]) -> Result<[u8; N], Error> {
    check_length(bytes.len(), N)?;
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    Ok(out)
}

/// A pair of 64-bit integers, e.g. a composite key. Laid out as `first || second`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LongTuple(pub i64, pub i64);

#[derive(Debug, Clone, Copy, Default)]
pub struct LongConverter;

impl TypeConverter<i64> for LongConverter {
    fn byte_len(&self) -> usize {
        8
    }

    fn to_bytes(&self, value: &i64) -> Result<Vec<u8>, Error> {
        Ok(value.to_be_bytes().to_vec())
    }

    fn from_bytes(&self, bytes: &[u8]) -> Result<i64, Error> {
        Ok(i64::from_be_bytes(fixed(bytes)?))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UnsignedLongConverter;

impl TypeConverter<u64> for UnsignedLongConverter {
    fn byte_len(&self) -> usize {
        8
    }

    fn to_bytes(&self, value: &u64) -> Result<Vec<u8>, Error> {
        Ok(value.to_be_bytes().to_vec())
    }

    fn from_bytes(&self, bytes: &[u8]) -> Result<u64, Error> {
        Ok(u64::from_be_bytes(fixed(bytes)?))
    }
}

/// 32-bit integers, sign-extended to 8 bytes so they share the layout of `i64`.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntConverter;

impl TypeConverter<i32> for IntConverter {
    fn byte_len(&self) -> usize {
        8
    }

    fn to_bytes(&self, value: &i32) -> Result<Vec<u8>, Error> {
        Ok(i64::from(*value).to_be_bytes().to_vec())
    }

    fn from_bytes(&self, bytes: &[u8]) -> Result<i32, Error> {
        let wide = i64::from_be_bytes(fixed(bytes)?);
        i32::try_from(wide).map_err(|_| Error::InvalidId("value does not fit in 32 bits"))
    }
}

/// 32-bit integers as 4 bytes, for the 4 byte SIV engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompactIntConverter;

impl TypeConverter<i32> for CompactIntConverter {
    fn byte_len(&self) -> usize {
        4
    }

    fn to_bytes(&self, value: &i32) -> Result<Vec<u8>, Error> {
        Ok(value.to_be_bytes().to_vec())
    }

    fn from_bytes(&self, bytes: &[u8]) -> Result<i32, Error> {
        Ok(i32::from_be_bytes(fixed(bytes)?))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LongTupleConverter;

impl TypeConverter<LongTuple> for LongTupleConverter {
    fn byte_len(&self) -> usize {
        16
    }

    fn to_bytes(&self, value: &LongTuple) -> Result<Vec<u8>, Error> {
        let mut bytes = Vec::with_capacity(16);
        bytes.extend_from_slice(&value.0.to_be_bytes());
        bytes.extend_from_slice(&value.1.to_be_bytes());
        Ok(bytes)
    }

    fn from_bytes(&self, bytes: &[u8]) -> Result<LongTuple, Error> {
        let bytes: [u8; 16] = fixed(bytes)?;
        let (first, second) = bytes.split_at(8);
        Ok(LongTuple(
            i64::from_be_bytes(fixed(first)?),
            i64::from_be_bytes(fixed(second)?),
        ))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UuidConverter;

impl TypeConverter<Uuid> for UuidConverter {
    fn byte_len(&self) -> usize {
        16
    }

    fn to_bytes(&self, value: &Uuid) -> Result<Vec<u8>, Error> {
        Ok(value.as_bytes().to_vec())
    }

    fn from_bytes(&self, bytes: &[u8]) -> Result<Uuid, Error> {
        Ok(Uuid::from_bytes(fixed(bytes)?))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct U128Converter;

impl TypeConverter<u128> for U128Converter {
    fn byte_len(&self) -> usize {
        16
    }

    fn to_bytes(&self, value: &u128) -> Result<Vec<u8>, Error> {
        Ok(value.to_be_bytes().to_vec())
    }

    fn from_bytes(&self, bytes: &[u8]) -> Result<u128, Error> {
        Ok(u128::from_be_bytes(fixed(bytes)?))
    }
}

/// Raw byte arrays of length `N`, passed through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteArrayConverter<const N: usize>;

impl<const N: usize> TypeConverter<[u8; N]> for ByteArrayConverter<N> {
    fn byte_len(&self) -> usize {
        N
    }

    fn to_bytes(&self, value: &[u8; N]) -> Result<Vec<u8>, Error> {
        Ok(value.to_vec())
    }

    fn from_bytes(&self, bytes: &[u8]) -> Result<[u8; N], Error> {
        fixed(bytes)
    }
}

const BIG_INTEGER_FIELD: usize = 15;

/// Signed integers whose minimal two's-complement form fits in 15 bytes.
///
/// Layout: one length byte, then the minimal two's-complement bytes
/// right-aligned in a zero-padded 15 byte field.
#[derive(Debug, Clone, Copy, Default)]
pub struct BigIntegerConverter;

fn minimal_twos_complement(value: i128) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let sign = if value < 0 { 0xff } else { 0x00 };
    let mut start = 0;
    // Drop redundant sign bytes, keeping one byte whose top bit carries the sign.
    while start < bytes.len() - 1
        && bytes[start] == sign
        && (bytes[start + 1] & 0x80) == (sign & 0x80)
    {
        start += 1;
    }
    bytes[start..].to_vec()
}

impl TypeConverter<i128> for BigIntegerConverter {
    fn byte_len(&self) -> usize {
        1 + BIG_INTEGER_FIELD
    }

    fn to_bytes(&self, value: &i128) -> Result<Vec<u8>, Error> {
        let minimal = minimal_twos_complement(*value);
        if minimal.len() > BIG_INTEGER_FIELD {
            return Err(Error::InvalidId("big integer does not fit in 15 bytes"));
        }
        let mut bytes = vec![0u8; 1 + BIG_INTEGER_FIELD];
        bytes[0] = minimal.len() as u8;
        bytes[1 + BIG_INTEGER_FIELD - minimal.len()..].copy_from_slice(&minimal);
        Ok(bytes)
    }

    fn from_bytes(&self, bytes: &[u8]) -> Result<i128, Error> {
        let bytes: [u8; 16] = fixed(bytes)?;
        let len = bytes[0] as usize;
        if len == 0 || len > BIG_INTEGER_FIELD {
            return Err(Error::InvalidId("invalid big integer length"));
        }
        let digits = &bytes[1 + BIG_INTEGER_FIELD - len..];
        let fill = if digits[0] & 0x80 != 0 { 0xff } else { 0x00 };
        let mut wide = [fill; 16];
        wide[16 - len..].copy_from_slice(digits);
        Ok(i128::from_be_bytes(wide))
    }
}
