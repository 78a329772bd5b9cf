//! One link in a keycard chain.
//!
//! An entry is an ordered field map. Canonical serialization is
//! `Name:Value\r\n` lines in a fixed per-type field order, and every hash or
//! signature is computed over the canonical serialization of the fields that
//! precede it. The auth fields close over the entry in this order:
//!
//!   Organization : Previous-Hash → Hash → Organization-Signature
//!   User         : Organization-Signature → Previous-Hash → Hash → User-Signature
//!
//! The user ordering is what makes the two-round-trip ADDENTRY exchange
//! possible: the organization signs the bare data fields, then the client
//! links, hashes, and countersigns on top of that signature.
//!
//! Expiration is a distinct failure mode from malformed data: an expired but
//! well-formed entry reports `Expired`, never a schema violation.

use std::collections::HashMap;

use chrono::{Duration, NaiveDate, NaiveDateTime, Utc};

use mg_crypto::{hash as cshash, CryptoString, SigningPair, VerificationKey};

use crate::error::KeycardError;

pub const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";
pub const DATE_FORMAT: &str = "%Y%m%d";

/// Longest permitted validity period, in days.
pub const MAX_VALIDITY_DAYS: i64 = 1095;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    Organization,
    User,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Organization => "Organization",
            EntryType::User => "User",
        }
    }

    /// The complete canonical field order for this entry type.
    pub fn field_order(&self) -> &'static [&'static str] {
        match self {
            EntryType::Organization => &[
                "Type",
                "Index",
                "Name",
                "Domain",
                "Contact-Admin",
                "Contact-Support",
                "Contact-Abuse",
                "Language",
                "Primary-Verification-Key",
                "Secondary-Verification-Key",
                "Encryption-Key",
                "Time-To-Live",
                "Expires",
                "Timestamp",
                "Previous-Hash",
                "Hash",
                "Organization-Signature",
            ],
            EntryType::User => &[
                "Type",
                "Index",
                "Workspace-ID",
                "User-ID",
                "Domain",
                "Verification-Key",
                "Encryption-Key",
                "Time-To-Live",
                "Expires",
                "Timestamp",
                "Organization-Signature",
                "Previous-Hash",
                "Hash",
                "User-Signature",
            ],
        }
    }

    /// Fields that must be present for the data portion to be compliant.
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            EntryType::Organization => &[
                "Type",
                "Index",
                "Name",
                "Domain",
                "Contact-Admin",
                "Primary-Verification-Key",
                "Encryption-Key",
                "Time-To-Live",
                "Expires",
                "Timestamp",
            ],
            EntryType::User => &[
                "Type",
                "Index",
                "Workspace-ID",
                "Domain",
                "Verification-Key",
                "Encryption-Key",
                "Time-To-Live",
                "Expires",
                "Timestamp",
            ],
        }
    }

    /// Auth fields (hashes and signatures), in application order.
    pub fn auth_fields(&self) -> &'static [&'static str] {
        match self {
            EntryType::Organization => &["Previous-Hash", "Hash", "Organization-Signature"],
            EntryType::User => &[
                "Organization-Signature",
                "Previous-Hash",
                "Hash",
                "User-Signature",
            ],
        }
    }
}

/// A versioned, field-based identity record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    etype: EntryType,
    fields: HashMap<String, String>,
}

impl Entry {
    /// Create a new entry with Type, Index 1, a fresh timestamp, and default
    /// lifetime fields. Keys and identity fields are set by the caller.
    pub fn new(etype: EntryType) -> Self {
        let now = Utc::now();
        let default_validity = match etype {
            EntryType::Organization => 365,
            EntryType::User => 90,
        };
        let mut fields = HashMap::new();
        fields.insert("Type".to_string(), etype.as_str().to_string());
        fields.insert("Index".to_string(), "1".to_string());
        fields.insert("Time-To-Live".to_string(), "14".to_string());
        fields.insert(
            "Timestamp".to_string(),
            now.format(TIMESTAMP_FORMAT).to_string(),
        );
        fields.insert(
            "Expires".to_string(),
            (now + Duration::days(default_validity))
                .format(DATE_FORMAT)
                .to_string(),
        );
        Self { etype, fields }
    }

    pub fn entry_type(&self) -> EntryType {
        self.etype
    }

    pub fn get_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|s| s.as_str())
    }

    /// Set a field after validating that it is permitted for this entry type
    /// and that the value matches the field's grammar. Setting a data field
    /// does not clear auth fields; stale hashes and signatures simply fail
    /// verification.
    pub fn set_field(&mut self, name: &str, value: &str) -> Result<(), KeycardError> {
        if !self.etype.field_order().contains(&name) {
            return Err(KeycardError::UnknownField(name.to_string()));
        }
        validate_field(self.etype, name, value)?;
        self.fields.insert(name.to_string(), value.to_string());
        Ok(())
    }

    pub fn set_fields(&mut self, pairs: &[(&str, &str)]) -> Result<(), KeycardError> {
        for (name, value) in pairs {
            self.set_field(name, value)?;
        }
        Ok(())
    }

    pub fn index(&self) -> Result<u32, KeycardError> {
        let raw = self
            .get_field("Index")
            .ok_or_else(|| KeycardError::MissingField("Index".into()))?;
        raw.parse()
            .map_err(|_| bad_value("Index", "not an integer"))
    }

    /// Whether this is the first entry in a chain.
    pub fn is_root(&self) -> bool {
        matches!(self.index(), Ok(1))
    }

    // ── Compliance ───────────────────────────────────────────────────────────

    /// Validate presence and format of all required data fields, ignoring
    /// auth fields entirely.
    pub fn is_data_compliant(&self) -> Result<(), KeycardError> {
        for name in self.etype.required_fields() {
            let value = self
                .fields
                .get(*name)
                .ok_or_else(|| KeycardError::MissingField(name.to_string()))?;
            validate_field(self.etype, name, value)?;
        }
        Ok(())
    }

    /// Full compliance: data fields, all required auth fields, and
    /// non-expiration. Signature correctness is checked separately because
    /// it needs key material.
    pub fn is_compliant(&self) -> Result<(), KeycardError> {
        self.is_data_compliant()?;
        for name in self.etype.auth_fields() {
            if *name == "Previous-Hash" && self.etype == EntryType::Organization && self.is_root()
            {
                // Root org entries have no predecessor to link
                continue;
            }
            if !self.fields.contains_key(*name) {
                return Err(KeycardError::NotCompliant(format!("missing {name}")));
            }
        }
        if self.is_expired()? {
            return Err(KeycardError::Expired);
        }
        Ok(())
    }

    /// Whether the entry's validity window has lapsed. Works on expired but
    /// otherwise well-formed entries; independent of `is_data_compliant`.
    pub fn is_expired(&self) -> Result<bool, KeycardError> {
        let raw = self
            .get_field("Expires")
            .ok_or_else(|| KeycardError::MissingField("Expires".into()))?;
        let expires = NaiveDate::parse_from_str(raw, DATE_FORMAT)
            .map_err(|_| bad_value("Expires", "bad date format"))?;
        Ok(Utc::now().date_naive() > expires)
    }

    // ── Canonical serialization ──────────────────────────────────────────────

    /// All present fields in canonical order, `Name:Value\r\n` each.
    pub fn serialize(&self) -> String {
        self.serialize_until(None)
    }

    /// Only the data fields — what a client submits as `Base-Entry`.
    pub fn serialize_data(&self) -> String {
        self.serialize_until(Some(self.first_auth_field()))
    }

    fn first_auth_field(&self) -> &'static str {
        self.etype.auth_fields()[0]
    }

    /// Canonical text of every present field that precedes `stop` in field
    /// order, or of all present fields when `stop` is None.
    fn serialize_until(&self, stop: Option<&str>) -> String {
        let mut out = String::new();
        for name in self.etype.field_order() {
            if Some(*name) == stop {
                break;
            }
            if let Some(value) = self.fields.get(*name) {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
                out.push_str("\r\n");
            }
        }
        out
    }

    /// Parse an entry from canonical text. The Type field decides the
    /// variant and must appear before any type-specific field.
    pub fn from_text(text: &str) -> Result<Self, KeycardError> {
        let type_line = text
            .lines()
            .find_map(|line| line.strip_prefix("Type:"))
            .ok_or_else(|| KeycardError::Parse("missing Type field".into()))?;
        let etype = match type_line.trim() {
            "Organization" => EntryType::Organization,
            "User" => EntryType::User,
            other => return Err(KeycardError::Parse(format!("unknown entry type '{other}'"))),
        };

        let mut entry = Self {
            etype,
            fields: HashMap::new(),
        };
        for line in text.lines() {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| KeycardError::Parse(format!("bad field line '{line}'")))?;
            entry.set_field(name, value)?;
        }
        entry.is_data_compliant()?;
        Ok(entry)
    }

    // ── Hashing and signing ──────────────────────────────────────────────────

    /// Compute and store the Hash field: a digest over the canonical
    /// serialization of every field preceding it. Non-root entries must be
    /// linked (Previous-Hash present) first.
    pub fn hash(&mut self, algorithm: &str) -> Result<(), KeycardError> {
        if !self.fields.contains_key("Previous-Hash") && !self.is_root() {
            return Err(KeycardError::MissingField("Previous-Hash".into()));
        }
        let data = self.serialize_until(Some("Hash"));
        let digest = cshash::hash_with(algorithm, data.as_bytes())?;
        self.fields.insert("Hash".to_string(), digest.to_string());
        Ok(())
    }

    /// Recompute the hash with the stored digest's own algorithm and
    /// compare. Returns false on mismatch — tampering is a result, not a
    /// panic.
    pub fn verify_hash(&self) -> Result<bool, KeycardError> {
        let stored: CryptoString = self
            .get_field("Hash")
            .ok_or_else(|| KeycardError::MissingField("Hash".into()))?
            .parse()?;
        let data = self.serialize_until(Some("Hash"));
        Ok(cshash::check_hash(data.as_bytes(), &stored)?)
    }

    /// Sign everything preceding `field_name` in canonical order and store
    /// the signature under that name.
    pub fn sign(&mut self, field_name: &str, pair: &SigningPair) -> Result<(), KeycardError> {
        if !self.etype.auth_fields().contains(&field_name) {
            return Err(KeycardError::UnknownField(field_name.to_string()));
        }
        let data = self.serialize_until(Some(field_name));
        let sig = pair.sign(data.as_bytes())?;
        self.fields.insert(field_name.to_string(), sig.to_string());
        Ok(())
    }

    /// Verify a named signature field against `key`. Returns false on
    /// mismatch.
    pub fn verify_signature(
        &self,
        field_name: &str,
        key: &VerificationKey,
    ) -> Result<bool, KeycardError> {
        let sig: CryptoString = self
            .get_field(field_name)
            .ok_or_else(|| KeycardError::MissingField(field_name.to_string()))?
            .parse()?;
        let data = self.serialize_until(Some(field_name));
        Ok(key.verify(data.as_bytes(), &sig)?)
    }

    /// The verification key a successor entry's signature is checked
    /// against: the primary key for org entries, the user key otherwise.
    pub fn verification_key(&self) -> Result<VerificationKey, KeycardError> {
        let field = match self.etype {
            EntryType::Organization => "Primary-Verification-Key",
            EntryType::User => "Verification-Key",
        };
        let cs: CryptoString = self
            .get_field(field)
            .ok_or_else(|| KeycardError::MissingField(field.into()))?
            .parse()?;
        Ok(VerificationKey::from_cryptostring(cs)?)
    }
}

fn bad_value(field: &str, reason: &str) -> KeycardError {
    KeycardError::BadFieldValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn validate_field(etype: EntryType, name: &str, value: &str) -> Result<(), KeycardError> {
    match name {
        "Type" => {
            if value != etype.as_str() {
                return Err(bad_value("Type", "does not match entry type"));
            }
        }
        "Index" => {
            let idx: u32 = value.parse().map_err(|_| bad_value(name, "not an integer"))?;
            if idx < 1 {
                return Err(bad_value(name, "must be 1 or greater"));
            }
        }
        "Name" => {
            let trimmed = value.trim();
            if trimmed.is_empty() || trimmed.len() > 64 {
                return Err(bad_value(name, "must be 1-64 characters"));
            }
        }
        "Domain" => {
            value
                .parse::<crate::types::Domain>()
                .map_err(|_| bad_value(name, "bad domain"))?;
        }
        "Workspace-ID" => {
            value
                .parse::<crate::types::RandomID>()
                .map_err(|_| bad_value(name, "bad workspace ID"))?;
        }
        "User-ID" => {
            value
                .parse::<crate::types::UserID>()
                .map_err(|_| bad_value(name, "bad user ID"))?;
        }
        "Contact-Admin" | "Contact-Support" | "Contact-Abuse" => {
            value
                .parse::<crate::types::WAddress>()
                .map_err(|_| bad_value(name, "bad workspace address"))?;
        }
        "Language" => {
            let ok = !value.is_empty()
                && value
                    .split(',')
                    .all(|l| (2..=3).contains(&l.len()) && l.chars().all(|c| c.is_ascii_lowercase()));
            if !ok {
                return Err(bad_value(name, "bad language list"));
            }
        }
        "Primary-Verification-Key" | "Secondary-Verification-Key" | "Verification-Key" => {
            let cs: CryptoString = value.parse().map_err(|_| bad_value(name, "bad CryptoString"))?;
            if cs.prefix() != "ED25519" {
                return Err(bad_value(name, "must be an ED25519 key"));
            }
        }
        "Encryption-Key" => {
            let cs: CryptoString = value.parse().map_err(|_| bad_value(name, "bad CryptoString"))?;
            if cs.prefix() != "CURVE25519" {
                return Err(bad_value(name, "must be a CURVE25519 key"));
            }
        }
        "Time-To-Live" => {
            let ttl: u16 = value.parse().map_err(|_| bad_value(name, "not an integer"))?;
            if !(1..=30).contains(&ttl) {
                return Err(bad_value(name, "must be 1-30 days"));
            }
        }
        "Expires" => {
            let date = NaiveDate::parse_from_str(value, DATE_FORMAT)
                .map_err(|_| bad_value(name, "bad date, expected YYYYMMDD"))?;
            if date > Utc::now().date_naive() + Duration::days(MAX_VALIDITY_DAYS) {
                return Err(bad_value(name, "more than 1095 days out"));
            }
        }
        "Timestamp" => {
            NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
                .map_err(|_| bad_value(name, "bad timestamp, expected YYYYMMDDTHHMMSSZ"))?;
        }
        "Previous-Hash" | "Hash" => {
            let cs: CryptoString = value.parse().map_err(|_| bad_value(name, "bad CryptoString"))?;
            if cs.prefix() != cshash::BLAKE3_PREFIX && cs.prefix() != cshash::SHA256_PREFIX {
                return Err(bad_value(name, "unsupported hash algorithm"));
            }
        }
        "Organization-Signature" | "User-Signature" => {
            let cs: CryptoString = value.parse().map_err(|_| bad_value(name, "bad CryptoString"))?;
            if cs.prefix() != "ED25519" {
                return Err(bad_value(name, "must be an ED25519 signature"));
            }
        }
        _ => return Err(KeycardError::UnknownField(name.to_string())),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mg_crypto::EncryptionPair;

    fn org_entry(spair: &SigningPair, epair: &EncryptionPair) -> Entry {
        let mut e = Entry::new(EntryType::Organization);
        let admin = format!("{}/example.com", crate::types::RandomID::generate());
        e.set_fields(&[
            ("Name", "Example, Inc."),
            ("Domain", "example.com"),
            ("Contact-Admin", &admin),
            ("Primary-Verification-Key", &spair.public_key().to_string()),
            ("Encryption-Key", &epair.public_key().to_string()),
        ])
        .unwrap();
        e
    }

    #[test]
    fn data_compliance() {
        let spair = SigningPair::generate().unwrap();
        let epair = EncryptionPair::generate().unwrap();
        let e = org_entry(&spair, &epair);
        e.is_data_compliant().unwrap();

        let mut incomplete = Entry::new(EntryType::Organization);
        incomplete.set_field("Domain", "example.com").unwrap();
        assert!(matches!(
            incomplete.is_data_compliant(),
            Err(KeycardError::MissingField(_))
        ));
    }

    #[test]
    fn field_validation_rejects_garbage() {
        let mut e = Entry::new(EntryType::User);
        assert!(e.set_field("Workspace-ID", "not-a-wid").is_err());
        assert!(e.set_field("Index", "zero").is_err());
        assert!(e.set_field("Time-To-Live", "45").is_err());
        assert!(e.set_field("Name", "x").is_err()); // org-only field
        assert!(e.set_field("Timestamp", "20260229").is_err());
    }

    #[test]
    fn expires_is_capped_at_max_validity() {
        let mut e = Entry::new(EntryType::User);
        assert!(e.set_field("Expires", "20990101").is_err());
        let in_range = (Utc::now().date_naive() + Duration::days(30))
            .format(DATE_FORMAT)
            .to_string();
        e.set_field("Expires", &in_range).unwrap();
    }

    #[test]
    fn root_hash_sign_verify() {
        let spair = SigningPair::generate().unwrap();
        let epair = EncryptionPair::generate().unwrap();
        let mut e = org_entry(&spair, &epair);

        e.hash(cshash::BLAKE3_PREFIX).unwrap();
        assert!(e.verify_hash().unwrap());

        e.sign("Organization-Signature", &spair).unwrap();
        let vk = spair.verification_key().unwrap();
        assert!(e.verify_signature("Organization-Signature", &vk).unwrap());
    }

    #[test]
    fn tampering_flips_verification_not_errors() {
        let spair = SigningPair::generate().unwrap();
        let epair = EncryptionPair::generate().unwrap();
        let mut e = org_entry(&spair, &epair);
        e.hash(cshash::BLAKE3_PREFIX).unwrap();
        e.sign("Organization-Signature", &spair).unwrap();

        e.set_field("Name", "Evil, Inc.").unwrap();
        assert!(!e.verify_hash().unwrap());
        let vk = spair.verification_key().unwrap();
        assert!(!e.verify_signature("Organization-Signature", &vk).unwrap());
    }

    #[test]
    fn non_root_hash_requires_link() {
        let spair = SigningPair::generate().unwrap();
        let epair = EncryptionPair::generate().unwrap();
        let mut e = org_entry(&spair, &epair);
        e.set_field("Index", "2").unwrap();
        assert!(matches!(
            e.hash(cshash::BLAKE3_PREFIX),
            Err(KeycardError::MissingField(_))
        ));
    }

    #[test]
    fn expiry_is_independent_of_compliance() {
        let mut e = Entry::new(EntryType::User);
        // Well-formed but ancient
        e.set_field("Expires", "20200101").unwrap();
        assert!(e.is_expired().unwrap());
        assert!(e.is_expired().unwrap()); // stable
        // Still reports the schema problem separately
        assert!(matches!(
            e.is_data_compliant(),
            Err(KeycardError::MissingField(_))
        ));
    }

    #[test]
    fn text_roundtrip() {
        let spair = SigningPair::generate().unwrap();
        let epair = EncryptionPair::generate().unwrap();
        let mut e = org_entry(&spair, &epair);
        e.hash(cshash::BLAKE3_PREFIX).unwrap();
        e.sign("Organization-Signature", &spair).unwrap();

        let text = e.serialize();
        let parsed = Entry::from_text(&text).unwrap();
        assert_eq!(parsed, e);
        assert_eq!(parsed.serialize(), text);
    }
}
