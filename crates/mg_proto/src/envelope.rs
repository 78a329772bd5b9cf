//! Message envelopes — what a Mensago server sees.
//!
//! The addressing header (delivery tag) is encrypted twice over, once for
//! each side of the route: the `Receiver` blob is sealed to the recipient
//! organization's key and names only {to, sender domain}; the `Sender` blob
//! is sealed to the sending organization's key and names only {from,
//! recipient domain}. Neither server alone can read the other's metadata,
//! and decrypting one side never exposes the other. The payload is
//! symmetrically encrypted with a per-message key wrapped for the
//! recipient.
//!
//! File format:
//!
//!   MENSAGO
//!   { ...sealed tag JSON... }
//!   ----------
//!   <raw encrypted payload bytes>

use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use mg_crypto::{CryptoString, EncryptionPair, PublicEncryptionKey, SecretKey};
use mg_keycard::{Domain, WAddress};

use crate::error::ProtoError;

const ENVELOPE_MARKER: &str = "MENSAGO";
const ENVELOPE_SEPARATOR: &str = "----------";
const ENVELOPE_VERSION: &str = "1.0";

pub const TYPE_SYSMESSAGE: &str = "sysmessage";
pub const TYPE_USERMESSAGE: &str = "usermessage";

/// Plaintext addressing for one message, before sealing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryTag {
    pub from: WAddress,
    pub to: WAddress,
    pub msg_type: String,
    pub sub_type: Option<String>,
}

/// What the recipient's server is entitled to learn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientInfo {
    #[serde(rename = "To")]
    pub to: WAddress,
    #[serde(rename = "SenderDomain")]
    pub sender_domain: Domain,
}

/// What the sender's server is entitled to learn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderInfo {
    #[serde(rename = "From")]
    pub from: WAddress,
    #[serde(rename = "RecipientDomain")]
    pub recipient_domain: Domain,
}

/// The sealed addressing header persisted in front of the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedDeliveryTag {
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "Type")]
    pub msg_type: String,
    #[serde(rename = "SubType", skip_serializing_if = "Option::is_none")]
    pub sub_type: Option<String>,
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "Receiver")]
    pub receiver: CryptoString,
    #[serde(rename = "Sender")]
    pub sender: CryptoString,
    #[serde(rename = "PayloadKey")]
    pub payload_key: CryptoString,
    #[serde(rename = "KeyHash")]
    pub key_hash: CryptoString,
}

impl DeliveryTag {
    pub fn new(from: WAddress, to: WAddress, msg_type: &str, sub_type: Option<&str>) -> Self {
        Self {
            from,
            to,
            msg_type: msg_type.to_string(),
            sub_type: sub_type.map(|s| s.to_string()),
        }
    }

    /// Seal this tag: receiver metadata to the receiving org's key, sender
    /// metadata to the sending org's key, and the payload key wrapped for
    /// the recipient, with an integrity hash over the wrapped key.
    pub fn seal(
        &self,
        payload_key: &SecretKey,
        sender_key: &PublicEncryptionKey,
        receiver_key: &PublicEncryptionKey,
    ) -> Result<SealedDeliveryTag, ProtoError> {
        let receiver_info = RecipientInfo {
            to: self.to.clone(),
            sender_domain: self.from.domain.clone(),
        };
        let sender_info = SenderInfo {
            from: self.from.clone(),
            recipient_domain: self.to.domain.clone(),
        };

        let receiver = receiver_key.encrypt(&serde_json::to_vec(&receiver_info)?)?;
        let sender = sender_key.encrypt(&serde_json::to_vec(&sender_info)?)?;

        let wrapped_key =
            receiver_key.encrypt(payload_key.as_cryptostring()?.to_string().as_bytes())?;
        let key_hash = mg_crypto::hash::hash(wrapped_key.to_string().as_bytes());

        Ok(SealedDeliveryTag {
            version: ENVELOPE_VERSION.to_string(),
            msg_type: self.msg_type.clone(),
            sub_type: self.sub_type.clone(),
            date: Utc::now().format("%Y%m%dT%H%M%SZ").to_string(),
            receiver,
            sender,
            payload_key: wrapped_key,
            key_hash,
        })
    }
}

impl SealedDeliveryTag {
    /// Open only the receiver-side metadata. A wrong key surfaces as a
    /// decryption failure; garbage inside as a schema violation.
    pub fn decrypt_receiver(&self, pair: &EncryptionPair) -> Result<RecipientInfo, ProtoError> {
        let raw = pair.decrypt(&self.receiver)?;
        serde_json::from_slice(&raw)
            .map_err(|e| ProtoError::Schema(format!("bad receiver metadata: {e}")))
    }

    /// Open only the sender-side metadata.
    pub fn decrypt_sender(&self, pair: &EncryptionPair) -> Result<SenderInfo, ProtoError> {
        let raw = pair.decrypt(&self.sender)?;
        serde_json::from_slice(&raw)
            .map_err(|e| ProtoError::Schema(format!("bad sender metadata: {e}")))
    }

    /// Unwrap the payload key, verifying the wrapped key's integrity hash
    /// first.
    pub fn unwrap_payload_key(&self, pair: &EncryptionPair) -> Result<SecretKey, ProtoError> {
        if !mg_crypto::hash::check_hash(self.payload_key.to_string().as_bytes(), &self.key_hash)? {
            return Err(ProtoError::Schema("payload key hash mismatch".into()));
        }
        let raw = pair.decrypt(&self.payload_key)?;
        let text = String::from_utf8(raw)
            .map_err(|_| ProtoError::Schema("payload key is not text".into()))?;
        let cs: CryptoString = text
            .parse()
            .map_err(|_| ProtoError::Schema("payload key is not a CryptoString".into()))?;
        Ok(SecretKey::from_cryptostring(&cs)?)
    }
}

/// A sealed tag plus the encrypted payload it fronts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedEnvelope {
    pub tag: SealedDeliveryTag,
    pub payload: Vec<u8>,
}

impl SealedEnvelope {
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtoError> {
        let header = serde_json::to_string(&self.tag)?;
        let mut out = Vec::with_capacity(header.len() + self.payload.len() + 32);
        out.extend_from_slice(ENVELOPE_MARKER.as_bytes());
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(ENVELOPE_SEPARATOR.as_bytes());
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.payload);
        Ok(out)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtoError> {
        let marker = format!("{ENVELOPE_MARKER}\r\n");
        let rest = data
            .strip_prefix(marker.as_bytes())
            .ok_or_else(|| ProtoError::Schema("missing MENSAGO marker".into()))?;

        let separator = format!("\r\n{ENVELOPE_SEPARATOR}\r\n");
        let split = find_subsequence(rest, separator.as_bytes())
            .ok_or_else(|| ProtoError::Schema("missing envelope separator".into()))?;

        let tag: SealedDeliveryTag = serde_json::from_slice(&rest[..split])
            .map_err(|e| ProtoError::Schema(format!("bad envelope header: {e}")))?;
        let payload = rest[split + separator.len()..].to_vec();
        Ok(Self { tag, payload })
    }

    pub fn save(&self, path: &Path) -> Result<(), ProtoError> {
        std::fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ProtoError> {
        Self::from_bytes(&std::fs::read(path)?)
    }
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

// ── Message content ──────────────────────────────────────────────────────────

/// The JSON message body that lives inside the encrypted payload. Also used
/// for server-authored system messages (bounces).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "From")]
    pub from: WAddress,
    #[serde(rename = "To")]
    pub to: WAddress,
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "Subject")]
    pub subject: String,
    #[serde(rename = "Body")]
    pub body: String,
}

impl Message {
    pub fn new(from: WAddress, to: WAddress, subject: &str, body: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            from,
            to,
            date: Utc::now().format("%Y%m%dT%H%M%SZ").to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mg_keycard::RandomID;

    fn waddr(domain: &str) -> WAddress {
        WAddress::new(RandomID::generate(), domain.parse().unwrap())
    }

    fn sealed_fixture() -> (SealedDeliveryTag, DeliveryTag, EncryptionPair, EncryptionPair, SecretKey)
    {
        let sender_pair = EncryptionPair::generate().unwrap();
        let receiver_pair = EncryptionPair::generate().unwrap();
        let payload_key = SecretKey::generate();

        let tag = DeliveryTag::new(
            waddr("sender.example.com"),
            waddr("receiver.example.com"),
            TYPE_USERMESSAGE,
            Some("deliveryreport"),
        );
        let sealed = tag
            .seal(
                &payload_key,
                &sender_pair.encryption_key().unwrap(),
                &receiver_pair.encryption_key().unwrap(),
            )
            .unwrap();
        (sealed, tag, sender_pair, receiver_pair, payload_key)
    }

    #[test]
    fn seal_and_open_both_sides() {
        let (sealed, tag, sender_pair, receiver_pair, _key) = sealed_fixture();

        let rinfo = sealed.decrypt_receiver(&receiver_pair).unwrap();
        assert_eq!(rinfo.to, tag.to);
        assert_eq!(rinfo.sender_domain, tag.from.domain);

        let sinfo = sealed.decrypt_sender(&sender_pair).unwrap();
        assert_eq!(sinfo.from, tag.from);
        assert_eq!(sinfo.recipient_domain, tag.to.domain);
    }

    #[test]
    fn wrong_key_fails_distinctly() {
        let (sealed, _tag, sender_pair, _receiver_pair, _key) = sealed_fixture();

        // Sender's key cannot open the receiver blob
        assert!(matches!(
            sealed.decrypt_receiver(&sender_pair),
            Err(ProtoError::Crypto(mg_crypto::CryptoError::DecryptionFailure))
        ));
    }

    #[test]
    fn payload_key_unwraps_for_recipient_only() {
        let (sealed, _tag, sender_pair, receiver_pair, key) = sealed_fixture();

        let unwrapped = sealed.unwrap_payload_key(&receiver_pair).unwrap();
        let ct = key.encrypt(b"body").unwrap();
        assert_eq!(unwrapped.decrypt(&ct).unwrap(), b"body");

        assert!(sealed.unwrap_payload_key(&sender_pair).is_err());
    }

    #[test]
    fn envelope_file_roundtrip_bitwise() {
        let (sealed, _tag, _s, _r, key) = sealed_fixture();
        let payload = key.encrypt_bytes(b"message body bytes").unwrap();
        let envelope = SealedEnvelope {
            tag: sealed,
            payload,
        };

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("msg.menv");
        envelope.save(&path).unwrap();
        let loaded = SealedEnvelope::load(&path).unwrap();

        assert_eq!(loaded.tag.version, envelope.tag.version);
        assert_eq!(loaded.tag.msg_type, envelope.tag.msg_type);
        assert_eq!(loaded.tag.sub_type, envelope.tag.sub_type);
        assert_eq!(loaded.tag.date, envelope.tag.date);
        assert_eq!(loaded.tag.receiver, envelope.tag.receiver);
        assert_eq!(loaded.tag.sender, envelope.tag.sender);
        assert_eq!(loaded.tag.payload_key, envelope.tag.payload_key);
        assert_eq!(loaded.tag.key_hash, envelope.tag.key_hash);
        assert_eq!(loaded.payload, envelope.payload);
    }

    #[test]
    fn malformed_envelope_is_schema_error() {
        assert!(matches!(
            SealedEnvelope::from_bytes(b"NOT-MENSAGO\r\n{}"),
            Err(ProtoError::Schema(_))
        ));
        assert!(matches!(
            SealedEnvelope::from_bytes(b"MENSAGO\r\n{\"broken\": true}"),
            Err(ProtoError::Schema(_))
        ));
    }
}
