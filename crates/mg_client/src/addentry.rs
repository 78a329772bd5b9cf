//! Client side of the two-phase ADDENTRY exchange.
//!
//! The server is the authority for chain continuity; the client is the
//! authority for detecting tampering. Phase one uploads the unsealed entry
//! and receives the org countersignature plus the chain-tip hash. Phase two
//! verifies the countersignature against a key the caller already trusts,
//! links and hashes the entry, signs it, and uploads the final seals. Any
//! verification failure aborts the whole exchange; nothing commits until
//! the server's final 200.

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use mg_crypto::keys::{SigningPair, VerificationKey};
use mg_crypto::hash::BLAKE3_PREFIX;
use mg_keycard::Entry;
use mg_proto::message::status;
use mg_proto::Request;

use crate::conn::{expect_code, ServerConnection};
use crate::error::ClientError;

impl<S: AsyncRead + AsyncWrite + Unpin> ServerConnection<S> {
    /// Chains `entry` onto the caller's keycard on the server.
    ///
    /// `org_verify_key` must come from a previously verified org keycard or
    /// another pinned source, never from this exchange. `user_pair` is the
    /// signing pair whose public half the entry carries.
    ///
    /// Returns the fully sealed entry the server committed.
    pub async fn add_entry(
        &mut self,
        entry: &Entry,
        org_verify_key: &VerificationKey,
        user_pair: &SigningPair,
    ) -> Result<Entry, ClientError> {
        entry.is_data_compliant()?;

        // Phase one: upload the bare entry, receive the countersignature
        // and the current chain tip hash.
        let req = Request::new("ADDENTRY").with("Base-Entry", &entry.serialize_data());
        let resp = self.transact(&req).await?;
        expect_code(&resp, status::CONTINUE)?;

        let org_sig = resp.field("Organization-Signature")?.to_string();
        let prev_hash = resp.field("Previous-Hash")?.to_string();

        // Phase two: verify before trusting anything the server sent.
        let mut sealed = entry.clone();
        sealed.set_field("Organization-Signature", &org_sig)?;
        if !sealed.verify_signature("Organization-Signature", org_verify_key)? {
            return Err(ClientError::Verification(
                "organization signature is not from the trusted org key".into(),
            ));
        }

        sealed.set_field("Previous-Hash", &prev_hash)?;
        sealed.hash(BLAKE3_PREFIX)?;
        if !sealed.verify_hash()? {
            return Err(ClientError::Verification("entry hash failed self-check".into()));
        }
        sealed.sign("User-Signature", user_pair)?;

        let hash = sealed
            .get_field("Hash")
            .ok_or_else(|| ClientError::MissingField("Hash".into()))?
            .to_string();
        let user_sig = sealed
            .get_field("User-Signature")
            .ok_or_else(|| ClientError::MissingField("User-Signature".into()))?
            .to_string();

        debug!(index = ?sealed.index(), "uploading sealed entry");
        let commit = Request::new("ADDENTRY")
            .with("Previous-Hash", &prev_hash)
            .with("Hash", &hash)
            .with("User-Signature", &user_sig);
        let resp = self.transact(&commit).await?;
        expect_code(&resp, status::OK)?;

        Ok(sealed)
    }
}
