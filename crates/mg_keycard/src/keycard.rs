//! Keycard chains: verification and extension.
//!
//! `entries[i].Previous-Hash` must equal `entries[i-1].Hash`, indexes rise
//! by exactly one, and timestamps strictly increase. Org entries form a
//! custody chain — entry N's signature verifies against entry N-1's primary
//! key, with the root self-signed. User entries carry the organization's
//! countersignature obtained through the ADDENTRY exchange plus the user's
//! own signature.

use std::collections::HashMap;

use chrono::{Duration, NaiveDateTime, Utc};

use mg_crypto::{hash as cshash, CryptoString, EncryptionPair, SigningPair, VerificationKey};

use crate::entry::{Entry, EntryType, DATE_FORMAT, MAX_VALIDITY_DAYS, TIMESTAMP_FORMAT};
use crate::error::KeycardError;

const ENTRY_BEGIN: &str = "----- BEGIN ENTRY -----";
const ENTRY_END: &str = "----- END ENTRY -----";

/// An owned, ordered sequence of entries for one organization or user.
#[derive(Debug, Clone, Default)]
pub struct Keycard {
    pub entries: Vec<Entry>,
}

impl Keycard {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn from_entries(entries: Vec<Entry>) -> Self {
        Self { entries }
    }

    /// The chain tip.
    pub fn current(&self) -> Option<&Entry> {
        self.entries.last()
    }

    /// Verify hash links, index continuity, timestamp ordering, hashes, and
    /// the custody signatures of every entry.
    pub fn verify_chain(&self) -> Result<(), KeycardError> {
        for (i, entry) in self.entries.iter().enumerate() {
            entry.is_data_compliant().map_err(|e| KeycardError::BrokenChain {
                index: i,
                reason: e.to_string(),
            })?;

            if !entry.verify_hash().map_err(chain_err(i))? {
                return Err(KeycardError::BrokenChain {
                    index: i,
                    reason: "hash mismatch".into(),
                });
            }

            if i == 0 {
                let vk = entry.verification_key()?;
                match entry.entry_type() {
                    EntryType::Organization => {
                        if !entry
                            .verify_signature("Organization-Signature", &vk)
                            .map_err(chain_err(i))?
                        {
                            return Err(KeycardError::BrokenChain {
                                index: i,
                                reason: "root signature invalid".into(),
                            });
                        }
                    }
                    EntryType::User => {
                        // The org countersignature needs the org card's key,
                        // so it is checked through verify_org_signatures; the
                        // self-signature is checked here.
                        if !entry
                            .verify_signature("User-Signature", &vk)
                            .map_err(chain_err(i))?
                        {
                            return Err(KeycardError::BrokenChain {
                                index: i,
                                reason: "user signature invalid".into(),
                            });
                        }
                    }
                }
                continue;
            }

            let prev = &self.entries[i - 1];
            if entry.index().map_err(chain_err(i))? != prev.index().map_err(chain_err(i))? + 1 {
                return Err(KeycardError::BrokenChain {
                    index: i,
                    reason: "index not sequential".into(),
                });
            }
            if timestamp_of(entry)? <= timestamp_of(prev)? {
                return Err(KeycardError::BrokenChain {
                    index: i,
                    reason: "timestamp not increasing".into(),
                });
            }

            let prev_hash = prev.get_field("Hash").ok_or(KeycardError::BrokenChain {
                index: i - 1,
                reason: "predecessor has no hash".into(),
            })?;
            if entry.get_field("Previous-Hash") != Some(prev_hash) {
                return Err(KeycardError::BrokenChain {
                    index: i,
                    reason: "previous-hash link mismatch".into(),
                });
            }

            match entry.entry_type() {
                EntryType::Organization => {
                    // Custody: signed by the predecessor's primary key
                    let vk = prev.verification_key()?;
                    if !entry
                        .verify_signature("Organization-Signature", &vk)
                        .map_err(chain_err(i))?
                    {
                        return Err(KeycardError::BrokenChain {
                            index: i,
                            reason: "custody signature invalid".into(),
                        });
                    }
                }
                EntryType::User => {
                    // Self-signature over the whole sealed entry
                    let vk = entry.verification_key()?;
                    if !entry
                        .verify_signature("User-Signature", &vk)
                        .map_err(chain_err(i))?
                    {
                        return Err(KeycardError::BrokenChain {
                            index: i,
                            reason: "user signature invalid".into(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Verify the user entries' organization countersignatures against the
    /// org's verification key. Separate from `verify_chain` because the key
    /// comes from a different card.
    pub fn verify_org_signatures(&self, org_key: &VerificationKey) -> Result<(), KeycardError> {
        for (i, entry) in self.entries.iter().enumerate() {
            if !entry
                .verify_signature("Organization-Signature", org_key)
                .map_err(chain_err(i))?
            {
                return Err(KeycardError::BrokenChain {
                    index: i,
                    reason: "organization signature invalid".into(),
                });
            }
        }
        Ok(())
    }

    /// Extend an organization keycard: build the next entry with rotated
    /// keys, link it, hash it, and countersign it with `signing_pair` (the
    /// current tip's primary key). Returns the freshly generated key
    /// material for the caller to persist.
    ///
    /// User cards are extended through the two-phase ADDENTRY exchange
    /// instead; see `chain_next` for the entry/key preparation step.
    pub fn chain(
        &mut self,
        signing_pair: &SigningPair,
        validity_days: u16,
    ) -> Result<HashMap<String, CryptoString>, KeycardError> {
        let current = self
            .current()
            .ok_or_else(|| KeycardError::NotCompliant("cannot chain an empty keycard".into()))?;
        if current.entry_type() != EntryType::Organization {
            return Err(KeycardError::NotCompliant(
                "Keycard::chain applies to organization cards".into(),
            ));
        }

        let (mut next, keys) = chain_next(current, validity_days)?;

        let prev_hash = current
            .get_field("Hash")
            .ok_or_else(|| KeycardError::MissingField("Hash".into()))?
            .to_string();
        next.set_field("Previous-Hash", &prev_hash)?;
        next.hash(cshash::BLAKE3_PREFIX)?;
        next.sign("Organization-Signature", signing_pair)?;

        self.entries.push(next);
        Ok(keys)
    }

    // ── Text serialization ───────────────────────────────────────────────────

    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(ENTRY_BEGIN);
            out.push_str("\r\n");
            out.push_str(&entry.serialize());
            out.push_str(ENTRY_END);
            out.push_str("\r\n");
        }
        out
    }

    pub fn from_text(text: &str) -> Result<Self, KeycardError> {
        let mut entries = Vec::new();
        let mut block: Option<String> = None;
        for line in text.lines() {
            let line = line.trim_end_matches('\r');
            match line {
                ENTRY_BEGIN => {
                    if block.is_some() {
                        return Err(KeycardError::Parse("nested entry block".into()));
                    }
                    block = Some(String::new());
                }
                ENTRY_END => {
                    let body = block
                        .take()
                        .ok_or_else(|| KeycardError::Parse("unmatched entry end".into()))?;
                    entries.push(Entry::from_text(&body)?);
                }
                _ => {
                    if let Some(body) = block.as_mut() {
                        body.push_str(line);
                        body.push_str("\r\n");
                    }
                }
            }
        }
        if block.is_some() {
            return Err(KeycardError::Parse("unterminated entry block".into()));
        }
        Ok(Self { entries })
    }
}

/// Build the successor of `current`: data fields copied, index incremented,
/// fresh timestamp and expiration, and rotated key material. No auth fields
/// are applied. Returns the new entry plus the generated keys, under the
/// names `primary.public`, `primary.private`, `encryption.public`,
/// `encryption.private`.
///
/// For org entries the old primary verification key is republished as
/// `Secondary-Verification-Key` so holders of cached cards can still verify
/// the rotation. The encryption key is always rotated, never carried over.
pub fn chain_next(
    current: &Entry,
    validity_days: u16,
) -> Result<(Entry, HashMap<String, CryptoString>), KeycardError> {
    current.is_data_compliant()?;

    let mut next = current.clone();
    let index = current.index()? + 1;
    next.set_field("Index", &index.to_string())?;

    // Timestamps must strictly increase across the chain; bump by a second
    // when two entries land inside the same wall-clock second.
    let mut now = Utc::now().naive_utc();
    let prev_ts = timestamp_of(current)?;
    if now <= prev_ts {
        now = prev_ts + Duration::seconds(1);
    }
    next.set_field("Timestamp", &now.format(TIMESTAMP_FORMAT).to_string())?;
    let validity = (validity_days as i64).min(MAX_VALIDITY_DAYS);
    next.set_field(
        "Expires",
        &(now + Duration::days(validity)).format(DATE_FORMAT).to_string(),
    )?;

    // Chaining drops the predecessor's seals; the new entry gets its own.
    next = Entry::from_text(&next.serialize_data())?;

    let new_spair = SigningPair::generate()?;
    let new_epair = EncryptionPair::generate()?;

    match current.entry_type() {
        EntryType::Organization => {
            let old_primary = current
                .get_field("Primary-Verification-Key")
                .ok_or_else(|| KeycardError::MissingField("Primary-Verification-Key".into()))?
                .to_string();
            next.set_field("Primary-Verification-Key", &new_spair.public_key().to_string())?;
            next.set_field("Secondary-Verification-Key", &old_primary)?;
            next.set_field("Encryption-Key", &new_epair.public_key().to_string())?;
        }
        EntryType::User => {
            next.set_field("Verification-Key", &new_spair.public_key().to_string())?;
            next.set_field("Encryption-Key", &new_epair.public_key().to_string())?;
        }
    }

    let mut keys = HashMap::new();
    keys.insert("primary.public".to_string(), new_spair.public_key().clone());
    keys.insert("primary.private".to_string(), new_spair.private_key()?);
    keys.insert("encryption.public".to_string(), new_epair.public_key().clone());
    keys.insert("encryption.private".to_string(), new_epair.private_key()?);

    Ok((next, keys))
}

fn timestamp_of(entry: &Entry) -> Result<NaiveDateTime, KeycardError> {
    let raw = entry
        .get_field("Timestamp")
        .ok_or_else(|| KeycardError::MissingField("Timestamp".into()))?;
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT).map_err(|_| KeycardError::BadFieldValue {
        field: "Timestamp".into(),
        reason: "bad timestamp".into(),
    })
}

fn chain_err(index: usize) -> impl Fn(KeycardError) -> KeycardError {
    move |e| KeycardError::BrokenChain {
        index,
        reason: e.to_string(),
    }
}
