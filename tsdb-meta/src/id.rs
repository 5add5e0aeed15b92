//! Organization and bucket identifiers.
//!
//! An ID is a non-zero 64-bit value, always rendered as 16 lowercase hex
//! characters on the wire, in manifests and in the metadata store.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::MetaError;

const ID_LENGTH: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id(u64);

impl Id {
    pub fn new(value: u64) -> Option<Self> {
        (value != 0).then_some(Self(value))
    }

    /// Generate a fresh random ID.
    pub fn generate() -> Self {
        loop {
            let (high, _) = uuid::Uuid::new_v4().as_u64_pair();
            if high != 0 {
                return Self(high);
            }
        }
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for Id {
    type Err = MetaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != ID_LENGTH || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(MetaError::InvalidId(format!(
                "{s:?}: expected {ID_LENGTH} hex characters"
            )));
        }
        let value = u64::from_str_radix(s, 16)
            .map_err(|e| MetaError::InvalidId(format!("{s:?}: {e}")))?;
        Id::new(value).ok_or_else(|| MetaError::InvalidId(format!("{s:?}: ID cannot be zero")))
    }
}

impl Serialize for Id {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl ToSql for Id {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for Id {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        s.parse().map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}
