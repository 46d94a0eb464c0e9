use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use diesel::deserialize::{self, FromSql, Queryable};
use diesel::expression::AsExpression;
use diesel::pg::{Pg, PgValue};
use diesel::serialize::{self, Output, ToSql};
use diesel::sql_types::BigInt;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ConfigError, Error};
use crate::{Config, IdMask};

thread_local! {
    // The mask and the global config generation it was built from.
    static FIELD_MASK: RefCell<Option<(u64, Arc<IdMask<u64>>)>> = const { RefCell::new(None) };
}

fn get_or_create_mask() -> Result<Arc<IdMask<u64>>, Error> {
    FIELD_MASK.with(|cached| {
        let mut cached = cached.borrow_mut();
        let generation = Config::global_generation();
        if let Some((built_from, mask)) = cached.as_ref() {
            if *built_from == generation {
                return Ok(mask.clone());
            }
        }
        let config = Config::global().ok_or(ConfigError::MissingGlobalConfig)?;
        let mask = Arc::new(IdMask::for_unsigned_long_ids(&config));
        *cached = Some((generation, mask.clone()));
        Ok(mask)
    })
}

// Postgres has no unsigned BIGINT. Ids above i64::MAX are stored as negative
// values with the same bits.
fn to_column(id: u64) -> i64 {
    id as i64
}

fn from_column(value: i64) -> u64 {
    value as u64
}

pub trait TypeMarker: std::fmt::Debug {
    fn name() -> &'static str;
}

/// An generic type-safe object ID field (a wrapped u64).
///
/// When serialized with Serde, the number is masked with the global
/// configuration into a URL safe token.  Deserialization unmasks the token
/// back to an integer.  The string has an object type specific prefix defined
/// in the type marker's `fn name()`, so ids of different object types cannot be
/// mixed up.
///
/// Traits are also provided for Diesel compatibility with Postgres BigInt fields.
///
/// # Examples
///
/// ```
/// use masked_id;
/// use serde::{Serialize, Deserialize};
/// use serde_json;
///
/// #[derive(Clone, Copy, Debug)]
/// pub struct ExampleIdMarker;
/// impl masked_id::TypeMarker for ExampleIdMarker {
///     fn name() -> &'static str { "example" }
/// }
///
/// type ExampleId = masked_id::Field<ExampleIdMarker>;
///
/// #[derive(serde::Serialize, serde::Deserialize)]
/// struct Example {
///     pub id: ExampleId,
/// }
///
/// let key = b"\x2a\x5a\x96\x7e\x46\x69\x51\x05\x60\xb7\x3c\xe5\xc0\x26\xd5\xf5";
/// masked_id::Config::set_global(masked_id::Config::from_key(key).unwrap());
/// let obj = Example {id: ExampleId::from(12345)};
/// let obj_str = serde_json::to_string(&obj).unwrap();
/// assert!(obj_str.starts_with("{\"id\":\"example_"));
/// let back: Example = serde_json::from_str(&obj_str).unwrap();
/// assert_eq!(u64::from(back.id), 12345);
/// ```
#[derive(AsExpression, Debug, Clone, Copy)]
#[diesel(sql_type = BigInt)]
pub struct Field<T: TypeMarker> {
    id: u64,
    _marker: std::marker::PhantomData<T>,
}

impl<T: TypeMarker> From<Field<T>> for u64 {
    /// Returns the raw `u64` value.
    fn from(field: Field<T>) -> Self {
        field.id
    }
}

impl<T: TypeMarker> fmt::Display for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Field {{ id: {}, marker: {} }}", self.id, T::name())
    }
}

impl<T: TypeMarker> PartialEq for Field<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T: TypeMarker> Eq for Field<T> {}

impl<T: TypeMarker> Field<T> {
    /// Creates a `Field<T>` value from a `u64`.
    ///
    /// This method converts a `u64` into a `Field<T>`, effectively changing its type.
    pub fn from(id: u64) -> Self {
        Field {
            id,
            _marker: std::marker::PhantomData,
        }
    }

    fn prefix() -> String {
        format!("{}_", T::name())
    }

    /// Masks the ID into its public form, `<name>_<token>`.
    pub fn encode(&self) -> Result<String, Error> {
        let mask = get_or_create_mask()?;
        Ok(format!("{}{}", Self::prefix(), mask.mask(&self.id)?))
    }

    /// Parses the public form produced by `encode`.
    pub fn decode(encoded: &str) -> Result<Self, Error> {
        let expected = Self::prefix();
        let Some(token) = encoded.strip_prefix(&expected) else {
            let received = match encoded.find('_') {
                None => "".to_string(),
                Some(i) => encoded[..i + 1].to_string(),
            };
            return Err(Error::InvalidPrefix { received, expected });
        };
        let mask = get_or_create_mask()?;
        Ok(Field::from(mask.unmask(token)?))
    }
}

impl<T: TypeMarker> Serialize for Field<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let encoded = self.encode().map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&encoded)
    }
}

impl<'de, T: TypeMarker> Deserialize<'de> for Field<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        Field::decode(&encoded).map_err(serde::de::Error::custom)
    }
}

impl<T: TypeMarker> ToSql<BigInt, Pg> for Field<T> {
    fn to_sql(&self, out: &mut Output<'_, '_, Pg>) -> serialize::Result {
        <i64 as ToSql<BigInt, Pg>>::to_sql(&to_column(self.id), &mut out.reborrow())
    }
}

impl<T: TypeMarker> FromSql<BigInt, Pg> for Field<T> {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        let value = <i64 as FromSql<BigInt, Pg>>::from_sql(bytes)?;
        Ok(Field::from(from_column(value)))
    }
}

impl<T> Queryable<BigInt, Pg> for Field<T>
where
    T: TypeMarker,
{
    type Row = <i64 as Queryable<BigInt, Pg>>::Row;

    fn build(row: Self::Row) -> deserialize::Result<Self> {
        let value = i64::build(row)?;
        Ok(Field::from(from_column(value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Every test here installs the same global configuration, so they can run in parallel.
    const KEY: &[u8] = b"\x2a\x5a\x96\x7e\x46\x69\x51\x05\x60\xb7\x3c\xe5\xc0\x26\xd5\xf5";

    #[derive(Debug, Clone, Copy)]
    struct UserMarker;
    impl TypeMarker for UserMarker {
        fn name() -> &'static str {
            "user"
        }
    }

    #[derive(Debug, Clone, Copy)]
    struct OrderMarker;
    impl TypeMarker for OrderMarker {
        fn name() -> &'static str {
            "order"
        }
    }

    type UserId = Field<UserMarker>;
    type OrderId = Field<OrderMarker>;

    fn install() {
        Config::set_global(Config::from_key(KEY).unwrap());
    }

    #[test]
    fn test_known_value() {
        install();
        // Same envelope as IdMask::for_long_ids for 1, behind the prefix.
        assert_eq!(
            UserId::from(1).encode().unwrap(),
            "user_hobx6l6qsGn1TydWUOaCczs"
        );
        assert_eq!(
            UserId::decode("user_hobx6l6qsGn1TydWUOaCczs").unwrap(),
            UserId::from(1)
        );
    }

    #[test]
    fn test_serde_roundtrip() {
        install();
        for id in [0u64, 1, 12345, u64::MAX] {
            let json = serde_json::to_string(&UserId::from(id)).unwrap();
            assert!(json.starts_with("\"user_"), "{}", json);
            let back: UserId = serde_json::from_str(&json).unwrap();
            assert_eq!(u64::from(back), id);
        }
    }

    #[test]
    fn test_prefix_errors() {
        install();
        let encoded = UserId::from(7).encode().unwrap();
        let token = encoded.strip_prefix("user_").unwrap();

        assert_eq!(
            OrderId::decode(&encoded),
            Err(Error::InvalidPrefix {
                received: "user_".to_string(),
                expected: "order_".to_string(),
            })
        );
        assert_eq!(
            UserId::decode("hobx6l6qsGn1TydWUOaCczs"),
            Err(Error::InvalidPrefix {
                received: "".to_string(),
                expected: "user_".to_string(),
            })
        );
        assert_eq!(OrderId::decode(&format!("order_{}", token)).unwrap(), OrderId::from(7));
        assert!(serde_json::from_str::<OrderId>(&format!("\"{}\"", encoded)).is_err());
    }

    #[test]
    fn test_mask_follows_global_config() {
        install();
        let before = get_or_create_mask().unwrap();
        install();
        let after = get_or_create_mask().unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(
            UserId::from(1).encode().unwrap(),
            "user_hobx6l6qsGn1TydWUOaCczs"
        );
    }

    #[test]
    fn test_column_values_keep_all_bits() {
        let cases = [
            (0u64, 0i64),
            (1, 1),
            (i64::MAX as u64, i64::MAX),
            (i64::MAX as u64 + 1, i64::MIN),
            (u64::MAX, -1),
        ];
        for (id, column) in cases {
            assert_eq!(to_column(id), column);
            assert_eq!(from_column(column), id);
        }
    }

    #[test]
    fn test_queryable_reads_negative_columns() {
        let field = <UserId as Queryable<BigInt, Pg>>::build(-1).unwrap();
        assert_eq!(u64::from(field), u64::MAX);
        let field = <UserId as Queryable<BigInt, Pg>>::build(i64::MIN).unwrap();
        assert_eq!(u64::from(field), 1u64 << 63);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            UserId::from(3).to_string(),
            "Field { id: 3, marker: user }"
        );
    }
}
