//! `masked-id` reversibly masks database ids (64-bit integers, UUIDs, pairs of
//! integers, big integers and 4 to 32 byte values) into opaque, URL safe tokens.
//!
//! This library is primarily designed to keep sequential or guessable ids out of
//! your public API. A token cannot be inverted or forged without the secret key,
//! while holders of the key recover the exact original value.  You can still
//! enjoy the performance benefits of using monotonically increasing integers as
//! your database keys.
//!
//! Every token is an authenticated envelope:
//!
//! * 8 byte values use a single AES-128 block with a reference value check.
//! * 16 byte values use AES-128-CBC with a truncated HMAC-SHA256.
//! * 4, 8, 16 and 32 byte values can also use AES-SIV.
//!
//! The first byte of each envelope names the engine and the key that produced
//! it, so keys can be rotated: keep the old keys as legacy keys and existing
//! tokens keep working.
//!
//! Please note that leaking the key means you lose all the security benefits.
//! Anyone can then unmask and forge your ids.
//!
//! # Usage
//!
//! ##  Generic `Field` API
//!
//! Use the generic `Field` type do define a type for each type of object you're exposing
//! in your public APIs.  The `Field` type supports automatic masking and unmasking with Diesel
//! and Serde.
//!
//! ```
//! use masked_id;
//! use serde::{Serialize, Deserialize};
//! use serde_json;
//!
//! // Define the ExampleId field type.  The type marker defines the string prefix.
//! #[derive(Debug)]
//! pub struct ExampleIdMarker;
//! impl masked_id::TypeMarker for ExampleIdMarker {
//!     fn name() -> &'static str { "example" }
//! }
//!
//! type ExampleId = masked_id::Field<ExampleIdMarker>;
//!
//! // The field can then be used in structs, and works automatically with Serde and Diesel.
//! #[derive(serde::Serialize)]
//! struct Example {
//!     pub id: ExampleId,
//! }
//!
//! let key = b"\x2a\x5a\x96\x7e\x46\x69\x51\x05\x60\xb7\x3c\xe5\xc0\x26\xd5\xf5";
//! masked_id::Config::set_global(masked_id::Config::from_key(key).unwrap());
//! let obj = Example {id: ExampleId::from(1)};
//! let obj_str = serde_json::to_string(&obj).unwrap();
//! assert_eq!(obj_str, "{\"id\":\"example_hobx6l6qsGn1TydWUOaCczs\"}");
//! ```
//!
//! ## `IdMask` API
//!
//! `IdMask` masks one id type with an explicit configuration.
//!
//! ```
//! use masked_id::{Base16, Config, IdMask, KeyManager, SecretKey};
//!
//! let key = SecretKey::new(0, &[
//!     0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77,
//!     0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff,
//! ]).unwrap();
//! let config = Config::new(KeyManager::new(key)).codec(Base16);
//! let mask = IdMask::for_long_ids(&config);
//!
//! let token = mask.mask(&0).unwrap();
//! assert_eq!(token, "2a2a6dba410f67be98535c3d9b57c36d38");
//! assert_eq!(mask.unmask(&token).unwrap(), 0);
//! ```

mod cache;
mod config;
mod convert;
mod encoding;
mod engine;
mod error;
mod field;
mod keys;
mod mask;
pub mod version;

pub use cache::{Cache, MemoryCache, DEFAULT_CACHE_SIZE};
pub use config::Config;
pub use convert::{
    BigIntegerConverter, ByteArrayConverter, CompactIntConverter, IntConverter, LongConverter,
    LongTuple, LongTupleConverter, TypeConverter, U128Converter, UnsignedLongConverter,
    UuidConverter,
};
pub use encoding::{
    Base16, Base32, Base64Url, CleanBase32, CustomAlphabet, Formatted, TextCodec,
    DEFAULT_GROUP_LENGTH, DEFAULT_SEPARATOR,
};
pub use engine::{
    EightByteEngine, Engine, IdEncConfig, MaskEngine, SivEngine, SixteenByteEngine,
};
pub use error::{AuthFailure, ConfigError, Error};
pub use field::{Field, TypeMarker};
pub use keys::{KeyManager, SecretKey, MAX_KEY_ID, MAX_KEY_LENGTH, MIN_KEY_LENGTH};
pub use mask::{IdMask, MAX_MASKED_ID_ENCODED_LENGTH};
