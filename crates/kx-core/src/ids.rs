//! Strongly-typed identifiers. Newtypes around `Uuid` keep a notebook id
//! from accidentally being passed where an entry id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn nil() -> Self {
                Self(Uuid::nil())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $name {
            fn from(u: Uuid) -> Self {
                Self(u)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

uuid_id!(NotebookId);
uuid_id!(EntryId);
uuid_id!(JobId);
uuid_id!(SubscriptionId);

/// An author's identity: 32-byte hash of a signing public key. Immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthorId(#[serde(with = "hex_bytes32")] pub [u8; 32]);

impl AuthorId {
    pub fn from_public_key(public_key: &[u8]) -> Self {
        Self(*blake3::hash(public_key).as_bytes())
    }

    pub fn to_hex(&self) -> String {
        hex_encode(&self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, HexIdError> {
        let bytes = hex_decode(s)?;
        let arr: [u8; 32] = bytes.try_into().map_err(|_| HexIdError::WrongLength)?;
        Ok(Self(arr))
    }
}

impl fmt::Display for AuthorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HexIdError {
    #[error("invalid hex encoding: {0}")]
    Invalid(String),
    #[error("author id must decode to exactly 32 bytes")]
    WrongLength,
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}

fn hex_decode(s: &str) -> Result<Vec<u8>, HexIdError> {
    if s.len() % 2 != 0 {
        return Err(HexIdError::Invalid(s.to_string()));
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|e| HexIdError::Invalid(e.to_string())))
        .collect()
}

mod hex_bytes32 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::hex_encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(d)?;
        let bytes = super::hex_decode(&s).map_err(serde::de::Error::custom)?;
        bytes.try_into().map_err(|_| serde::de::Error::custom("expected 32 bytes"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn author_id_roundtrips_through_hex() {
        let a = AuthorId::from_public_key(b"some-public-key-bytes");
        let hex = a.to_hex();
        let b = AuthorId::from_hex(&hex).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn author_id_rejects_odd_length_hex() {
        assert!(AuthorId::from_hex("abc").is_err());
    }

    #[test]
    fn typed_ids_are_distinct_types() {
        let n = NotebookId::new();
        let e = EntryId::new();
        assert_ne!(n.0, Uuid::nil());
        assert_ne!(e.0, Uuid::nil());
    }
}
