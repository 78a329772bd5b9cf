//! Non-delivery report synthesis.
//!
//! A bounce is a server-authored sysmessage sealed back to the original
//! sender. The sender's identity comes from the envelope's sender-side
//! metadata, which for locally submitted mail decrypts under our own org
//! key. If even that is unreadable, the bounce is logged and dropped; there
//! is nobody left to tell.

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use mg_crypto::SecretKey;
use mg_keycard::{RandomID, WAddress};
use mg_proto::envelope::{DeliveryTag, Message, SealedDeliveryTag, SealedEnvelope, TYPE_SYSMESSAGE};
use mg_store::models::{UpdateType, SERVER_DEVICE_ID};

use crate::state::ServerState;

/// Why a message could not be delivered. The numeric codes ride inside the
/// bounce body for operator troubleshooting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BounceReason {
    InternalError,
    UnreadableAddress,
    ExternalDeliveryUnavailable,
}

impl BounceReason {
    pub fn code(self) -> u16 {
        match self {
            BounceReason::InternalError => 300,
            BounceReason::UnreadableAddress => 504,
            BounceReason::ExternalDeliveryUnavailable => 301,
        }
    }

    fn subject(self) -> &'static str {
        match self {
            BounceReason::InternalError => "Delivery failed: server error",
            BounceReason::UnreadableAddress => "Delivery failed: unreadable recipient address",
            BounceReason::ExternalDeliveryUnavailable => {
                "Delivery failed: external delivery unavailable"
            }
        }
    }

    fn body(self) -> &'static str {
        match self {
            BounceReason::InternalError => {
                "The server encountered an internal error while delivering your message. \
                 It was not delivered."
            }
            BounceReason::UnreadableAddress => {
                "The recipient address on your message could not be read by this server. \
                 It was not delivered."
            }
            BounceReason::ExternalDeliveryUnavailable => {
                "This server does not deliver to other domains yet. Your message was not \
                 delivered."
            }
        }
    }
}

fn server_address(state: &ServerState) -> WAddress {
    // The server signs bounces with the device-less all-zero identity.
    let wid: RandomID = SERVER_DEVICE_ID
        .parse()
        .unwrap_or_else(|_| RandomID::generate());
    WAddress::new(wid, state.domain.clone())
}

/// Sends a non-delivery report for the message behind `tag`, addressed to
/// whoever the tag's sender metadata names.
pub async fn send_bounce(
    state: &ServerState,
    tag: &SealedDeliveryTag,
    reason: BounceReason,
    diagnostic: &str,
) -> Result<()> {
    let org_pair = state.store.get_org_encryption_pair().await?;
    let sender_info = match tag.decrypt_sender(&org_pair) {
        Ok(info) => info,
        Err(e) => {
            warn!(code = reason.code(), error = %e, "bounce dropped, sender metadata unreadable");
            return Ok(());
        }
    };
    send_bounce_to(state, &sender_info.from, reason, diagnostic).await
}

/// Sends a non-delivery report to an already-known sender address, for
/// failures where the envelope itself is unreadable or gone.
pub async fn send_bounce_to(
    state: &ServerState,
    sender: &WAddress,
    reason: BounceReason,
    diagnostic: &str,
) -> Result<()> {
    if !state.is_local_domain(&sender.domain) {
        warn!(code = reason.code(), "bounce dropped, sender is not local");
        return Ok(());
    }
    let org_pair = state.store.get_org_encryption_pair().await?;

    let from = server_address(state);
    let body = format!(
        "{}\r\n\r\nDiagnostic code: {}\r\nTimestamp: {}\r\nDetail: {}\r\n",
        reason.body(),
        reason.code(),
        Utc::now().format("%Y%m%dT%H%M%SZ"),
        diagnostic,
    );
    let message = Message::new(from.clone(), sender.clone(), reason.subject(), &body);

    let payload_key = SecretKey::generate();
    let org_public = org_pair.encryption_key()?;
    let bounce_tag = DeliveryTag::new(
        from,
        sender.clone(),
        TYPE_SYSMESSAGE,
        Some("deliveryfailure"),
    );
    let sealed_tag = bounce_tag.seal(&payload_key, &org_public, &org_public)?;
    let payload = payload_key.encrypt_bytes(&serde_json::to_vec(&message)?)?;
    let envelope = SealedEnvelope {
        tag: sealed_tag,
        payload,
    };

    let inbox = mg_store::ServerPath::root()
        .push("wsp")?
        .push(sender.wid.as_str())?
        .push("new")?;
    state.blobs.mkdir(&inbox)?;
    let stored = state.blobs.write_new(&inbox, &envelope.to_bytes()?)?;
    state
        .store
        .add_update_record(&sender.wid, UpdateType::Create, &stored.to_string())
        .await?;
    info!(code = reason.code(), to = %sender, "bounce delivered");
    Ok(())
}
