//! Self-describing tagged strings: `ALGORITHM:base85-payload`.
//!
//! Every key, hash, and signature in the protocol travels as a CryptoString
//! so that algorithm agility never depends on context. The prefix is an
//! uppercase identifier (`[A-Z0-9-]`, no leading/trailing dash); the payload
//! is RFC 1924 base85.

use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CryptoError;

/// A tagged algorithm-plus-payload value.
///
/// Construction always validates, so an instance in hand is well-formed:
/// nonempty prefix, nonempty payload that decodes as base85.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CryptoString {
    prefix: String,
    data: String,
    bytes: Vec<u8>,
}

impl CryptoString {
    /// Build from an algorithm prefix and raw bytes.
    pub fn from_bytes(prefix: &str, bytes: &[u8]) -> Result<Self, CryptoError> {
        if !valid_prefix(prefix) {
            return Err(CryptoError::BadFormat(format!("bad prefix '{prefix}'")));
        }
        if bytes.is_empty() {
            return Err(CryptoError::BadFormat("empty payload".into()));
        }
        Ok(Self {
            prefix: prefix.to_string(),
            data: base85::encode(bytes),
            bytes: bytes.to_vec(),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The base85 payload text, without the prefix.
    pub fn payload(&self) -> &str {
        &self.data
    }

    /// The decoded payload bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Payload bytes as a fixed-size array, for key material of known length.
    pub fn to_array<const N: usize>(&self) -> Result<[u8; N], CryptoError> {
        self.bytes
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidKey(format!(
                "{} payload must be {} bytes, got {}",
                self.prefix,
                N,
                self.bytes.len()
            )))
    }
}

impl fmt::Display for CryptoString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.prefix, self.data)
    }
}

impl FromStr for CryptoString {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix, data) = s
            .split_once(':')
            .ok_or_else(|| CryptoError::BadFormat("missing ':' separator".into()))?;
        if !valid_prefix(prefix) {
            return Err(CryptoError::BadFormat(format!("bad prefix '{prefix}'")));
        }
        if data.is_empty() {
            return Err(CryptoError::BadFormat("empty payload".into()));
        }
        let bytes = base85::decode(data)
            .map_err(|_| CryptoError::BadFormat("payload is not valid base85".into()))?;
        Ok(Self {
            prefix: prefix.to_string(),
            data: data.to_string(),
            bytes,
        })
    }
}

impl Serialize for CryptoString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for CryptoString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

fn valid_prefix(prefix: &str) -> bool {
    !prefix.is_empty()
        && !prefix.starts_with('-')
        && !prefix.ends_with('-')
        && prefix
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_parse_format() {
        let cs = CryptoString::from_bytes("ED25519", b"some key material").unwrap();
        let text = cs.to_string();
        let parsed: CryptoString = text.parse().unwrap();
        assert_eq!(parsed, cs);
        assert_eq!(parsed.to_string(), text);
        assert_eq!(parsed.as_bytes(), b"some key material");
    }

    #[test]
    fn rejects_bad_prefixes() {
        assert!("ed25519:abc".parse::<CryptoString>().is_err());
        assert!("-ED25519:abc".parse::<CryptoString>().is_err());
        assert!("ED25519-:abc".parse::<CryptoString>().is_err());
        assert!(":abc".parse::<CryptoString>().is_err());
        assert!("ED25519".parse::<CryptoString>().is_err());
        assert!("ED25519:".parse::<CryptoString>().is_err());
    }

    #[test]
    fn serde_as_string() {
        let cs = CryptoString::from_bytes("BLAKE3-256", &[1, 2, 3, 4]).unwrap();
        let json = serde_json::to_string(&cs).unwrap();
        assert_eq!(json, format!("\"{cs}\""));
        let back: CryptoString = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cs);
    }
}
