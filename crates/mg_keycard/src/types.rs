//! Address primitives: workspace IDs, user IDs, domains, and the composite
//! workspace/Mensago addresses built from them.
//!
//! A workspace ID (WID) is a random UUID-shaped identifier, fully decoupled
//! from any human-readable name. A user ID is the optional friendly name
//! that resolves to a WID.

use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::error::KeycardError;

macro_rules! string_newtype {
    ($name:ident) => {
        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
                s.serialize_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
                String::deserialize(d)?.parse().map_err(de::Error::custom)
            }
        }

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }
    };
}

// ── RandomID / workspace ID ──────────────────────────────────────────────────

/// A random account identifier in lowercase UUID form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RandomID(String);
string_newtype!(RandomID);

impl RandomID {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl FromStr for RandomID {
    type Err = KeycardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_lowercase();
        Uuid::parse_str(&lowered)
            .map_err(|_| KeycardError::Parse(format!("bad workspace ID '{s}'")))?;
        // Only the dashed canonical form is accepted on the wire
        if lowered.len() != 36 {
            return Err(KeycardError::Parse(format!("bad workspace ID '{s}'")));
        }
        Ok(Self(lowered))
    }
}

// ── UserID ───────────────────────────────────────────────────────────────────

/// Human-friendly account name: 1-64 chars of `[a-z0-9._-]`, case-folded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserID(String);
string_newtype!(UserID);

impl FromStr for UserID {
    type Err = KeycardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_lowercase();
        if lowered.is_empty() || lowered.len() > 64 {
            return Err(KeycardError::Parse(format!("bad user ID '{s}'")));
        }
        if !lowered
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "._-".contains(c))
        {
            return Err(KeycardError::Parse(format!("bad user ID '{s}'")));
        }
        Ok(Self(lowered))
    }
}

// ── Domain ───────────────────────────────────────────────────────────────────

/// A dotted DNS domain, case-folded, each label `[a-z0-9-]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Domain(String);
string_newtype!(Domain);

impl FromStr for Domain {
    type Err = KeycardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_lowercase();
        let ok = !lowered.is_empty()
            && lowered.split('.').all(|label| {
                !label.is_empty()
                    && !label.starts_with('-')
                    && !label.ends_with('-')
                    && label
                        .chars()
                        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
            });
        if !ok {
            return Err(KeycardError::Parse(format!("bad domain '{s}'")));
        }
        Ok(Self(lowered))
    }
}

// ── Workspace address ────────────────────────────────────────────────────────

/// `wid/domain` — the canonical routing address for a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WAddress {
    pub wid: RandomID,
    pub domain: Domain,
}

impl WAddress {
    pub fn new(wid: RandomID, domain: Domain) -> Self {
        Self { wid, domain }
    }
}

impl fmt::Display for WAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.wid, self.domain)
    }
}

impl FromStr for WAddress {
    type Err = KeycardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (wid, domain) = s
            .split_once('/')
            .ok_or_else(|| KeycardError::Parse(format!("bad workspace address '{s}'")))?;
        Ok(Self {
            wid: wid.parse()?,
            domain: domain.parse()?,
        })
    }
}

impl Serialize for WAddress {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for WAddress {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        String::deserialize(d)?.parse().map_err(de::Error::custom)
    }
}

/// `user_id/domain` or `wid/domain` — what a person types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MAddress {
    Workspace(WAddress),
    User { uid: UserID, domain: Domain },
}

impl MAddress {
    pub fn domain(&self) -> &Domain {
        match self {
            MAddress::Workspace(w) => &w.domain,
            MAddress::User { domain, .. } => domain,
        }
    }
}

impl fmt::Display for MAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MAddress::Workspace(w) => w.fmt(f),
            MAddress::User { uid, domain } => write!(f, "{uid}/{domain}"),
        }
    }
}

impl FromStr for MAddress {
    type Err = KeycardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(w) = s.parse::<WAddress>() {
            return Ok(MAddress::Workspace(w));
        }
        let (uid, domain) = s
            .split_once('/')
            .ok_or_else(|| KeycardError::Parse(format!("bad address '{s}'")))?;
        Ok(MAddress::User {
            uid: uid.parse()?,
            domain: domain.parse()?,
        })
    }
}

impl Serialize for MAddress {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for MAddress {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        String::deserialize(d)?.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_id_roundtrip() {
        let wid = RandomID::generate();
        let parsed: RandomID = wid.as_str().parse().unwrap();
        assert_eq!(parsed, wid);
        assert!("not-a-uuid".parse::<RandomID>().is_err());
    }

    #[test]
    fn user_id_validation() {
        assert!("csimons".parse::<UserID>().is_ok());
        assert_eq!("CSimons".parse::<UserID>().unwrap().as_str(), "csimons");
        assert!("bad space".parse::<UserID>().is_err());
        assert!("".parse::<UserID>().is_err());
    }

    #[test]
    fn domain_validation() {
        assert!("example.com".parse::<Domain>().is_ok());
        assert_eq!("Example.COM".parse::<Domain>().unwrap().as_str(), "example.com");
        assert!("-bad.com".parse::<Domain>().is_err());
        assert!("double..dot".parse::<Domain>().is_err());
    }

    #[test]
    fn waddress_roundtrip() {
        let addr = WAddress::new(RandomID::generate(), "example.com".parse().unwrap());
        let parsed: WAddress = addr.to_string().parse().unwrap();
        assert_eq!(parsed, addr);
    }

    #[test]
    fn maddress_disambiguates() {
        let wid = RandomID::generate();
        let as_wid: MAddress = format!("{wid}/example.com").parse().unwrap();
        assert!(matches!(as_wid, MAddress::Workspace(_)));
        let as_uid: MAddress = "csimons/example.com".parse().unwrap();
        assert!(matches!(as_uid, MAddress::User { .. }));
    }
}
