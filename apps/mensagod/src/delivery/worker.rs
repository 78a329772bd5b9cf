//! Ephemeral delivery workers.
//!
//! `notify` is called whenever a message lands on the queue. If a worker
//! slot is free it spawns a task that drains the queue and exits; if all
//! slots are busy the message waits for a running worker to reach it. A
//! failure on one message is logged and possibly bounced, never fatal to
//! the worker or the process.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, error, info};

use mg_proto::envelope::SealedEnvelope;
use mg_store::models::UpdateType;
use mg_store::ServerPath;

use crate::delivery::bounce::{send_bounce, send_bounce_to, BounceReason};
use crate::delivery::queue::MessageInfo;
use crate::state::ServerState;

/// Spawns a drain worker if a slot is free.
pub fn notify(state: &Arc<ServerState>) {
    let Ok(permit) = state.delivery_slots.clone().try_acquire_owned() else {
        return;
    };
    let state = state.clone();
    tokio::spawn(async move {
        let _permit = permit;
        while let Some(msg) = state.queue.pop() {
            if let Err(e) = process(&state, &msg).await {
                error!(path = %msg.path, error = %e, "delivery failed");
            }
        }
        debug!("delivery worker drained the queue");
    });
}

/// Runs one message through the pipeline:
/// Queued -> Validating -> {LocalDelivery | BounceOnly} -> Done.
async fn process(state: &Arc<ServerState>, msg: &MessageInfo) -> Result<()> {
    // Validating: the blob has to be there before anything else matters.
    // When it is gone the queue entry still names the sender, so the loss
    // is reported instead of vanishing silently.
    if !state.blobs.exists(&msg.path) {
        error!(path = %msg.path, "queued blob is missing");
        send_bounce_to(
            state,
            &msg.sender,
            BounceReason::InternalError,
            "message data missing from storage",
        )
        .await?;
        return Ok(());
    }

    if !state.is_local_domain(&msg.receiver.domain) {
        // Remote delivery is not implemented; tell the sender so.
        let raw = state.blobs.read(&msg.path)?;
        if let Ok(envelope) = SealedEnvelope::from_bytes(&raw) {
            send_bounce(
                state,
                &envelope.tag,
                BounceReason::ExternalDeliveryUnavailable,
                &format!("destination domain {}", msg.receiver.domain),
            )
            .await?;
        }
        remove_blob(state, &msg.path).await?;
        return Ok(());
    }

    let raw = state.blobs.read(&msg.path)?;
    let envelope = match SealedEnvelope::from_bytes(&raw) {
        Ok(e) => e,
        Err(e) => {
            error!(path = %msg.path, error = %e, "queued blob is not a sealed envelope");
            remove_blob(state, &msg.path).await?;
            return Ok(());
        }
    };

    let org_pair = state.store.get_org_encryption_pair().await?;
    let recipient = match envelope.tag.decrypt_receiver(&org_pair) {
        Ok(info) => info,
        Err(e) => {
            // Wrong or rotated org key: the address block is opaque to us.
            send_bounce(
                state,
                &envelope.tag,
                BounceReason::UnreadableAddress,
                &e.to_string(),
            )
            .await?;
            remove_blob(state, &msg.path).await?;
            return Ok(());
        }
    };

    if !state.store.workspace_exists(&recipient.to.wid).await? {
        send_bounce(
            state,
            &envelope.tag,
            BounceReason::UnreadableAddress,
            "no such workspace",
        )
        .await?;
        remove_blob(state, &msg.path).await?;
        return Ok(());
    }

    // LocalDelivery: move the blob into the inbox and record the change.
    let inbox = ServerPath::root()
        .push("wsp")?
        .push(recipient.to.wid.as_str())?
        .push("new")?;
    state.blobs.mkdir(&inbox)?;
    let delivered = {
        let _guard = state.blobs.lock(&msg.path).await;
        state.blobs.move_to(&msg.path, &inbox)?
    };
    state
        .store
        .add_update_record(&recipient.to.wid, UpdateType::Create, &delivered.to_string())
        .await?;
    info!(to = %recipient.to, path = %delivered, "message delivered");
    Ok(())
}

async fn remove_blob(state: &ServerState, path: &ServerPath) -> Result<()> {
    let _guard = state.blobs.lock(path).await;
    state.blobs.delete(path)?;
    Ok(())
}
