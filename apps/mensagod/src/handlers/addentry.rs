//! Server side of the two-phase ADDENTRY exchange.
//!
//! Phase one: the logged-in client uploads a bare user entry. The server
//! validates it, derives Previous-Hash from the chain tip (the org card's
//! tip for a root entry), countersigns, and answers 100 CONTINUE without
//! committing anything. Phase two: the client returns the link fields and
//! its own signature; the server re-validates the whole entry end to end
//! and only then commits. Nothing partial ever lands in the database.

use anyhow::Result;

use mg_crypto::hash::BLAKE3_PREFIX;
use mg_keycard::{Entry, EntryType, RandomID};
use mg_proto::message::status;
use mg_proto::{Request, Response};
use mg_store::StoreError;

use crate::session::{LoginState, SessionCtx};

/// User IDs whose workspace binding may never change through ADDENTRY.
const SPECIAL_ACCOUNTS: &[&str] = &["admin", "support", "abuse"];

pub async fn addentry(ctx: &mut SessionCtx, req: &Request) -> Result<Response> {
    let wid = match &ctx.login {
        LoginState::LoggedIn(wid) => wid.clone(),
        _ => return Ok(Response::new(status::UNAUTHORIZED)),
    };

    if req.data.contains_key("Base-Entry") {
        phase_one(ctx, req, &wid).await
    } else if req.data.contains_key("User-Signature") {
        phase_two(ctx, req, &wid).await
    } else {
        Ok(Response::new(status::BAD_REQUEST).with_info("missing field"))
    }
}

async fn phase_one(ctx: &mut SessionCtx, req: &Request, wid: &RandomID) -> Result<Response> {
    let entry = match Entry::from_text(&req.data["Base-Entry"]) {
        Ok(e) => e,
        Err(e) => {
            return Ok(Response::new(status::BAD_REQUEST).with_info(&format!("bad entry: {e}")));
        }
    };
    if entry.entry_type() != EntryType::User {
        return Ok(Response::new(status::BAD_REQUEST).with_info("entry must be a user entry"));
    }
    if let Err(e) = entry.is_data_compliant() {
        return Ok(Response::new(status::BAD_REQUEST).with_info(&e.to_string()));
    }
    if entry.get_field("Workspace-ID") != Some(wid.as_str()) {
        return Ok(Response::new(status::FORBIDDEN).with_info("entry is for another workspace"));
    }
    if entry.get_field("Domain") != Some(ctx.state.domain.as_str()) {
        return Ok(Response::new(status::BAD_REQUEST).with_info("wrong domain"));
    }
    if let Some(resp) = check_special_accounts(ctx, &entry, wid).await? {
        return Ok(resp);
    }

    let owner = format!("{}/{}", wid, ctx.state.domain);
    let index = match entry.index() {
        Ok(i) => i,
        Err(e) => {
            return Ok(Response::new(status::BAD_REQUEST).with_info(&e.to_string()));
        }
    };

    // Previous-Hash comes from the user's own chain tip, or from the org
    // card's tip for the user's first entry.
    let prev_hash = match ctx.state.store.get_current_entry(&owner).await {
        Ok(tip) => {
            let tip_entry = Entry::from_text(&tip.entry)?;
            if index as i64 != tip.idx + 1 {
                return Ok(Response::new(status::BAD_REQUEST)
                    .with_info(&format!("expected index {}", tip.idx + 1)));
            }
            tip_entry
                .get_field("Hash")
                .map(|h| h.to_string())
                .ok_or_else(|| anyhow::anyhow!("stored chain tip has no hash"))?
        }
        Err(StoreError::NotFound) => {
            if index != 1 {
                return Ok(Response::new(status::BAD_REQUEST).with_info("first entry must have index 1"));
            }
            let org_tip = ctx
                .state
                .store
                .get_current_entry(ctx.state.domain.as_str())
                .await?;
            let org_entry = Entry::from_text(&org_tip.entry)?;
            org_entry
                .get_field("Hash")
                .map(|h| h.to_string())
                .ok_or_else(|| anyhow::anyhow!("org chain tip has no hash"))?
        }
        Err(e) => return Err(e.into()),
    };

    let org_pair = ctx.state.store.get_org_signing_pair().await?;
    let mut signed = entry;
    signed.sign("Organization-Signature", &org_pair)?;
    let org_sig = signed
        .get_field("Organization-Signature")
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow::anyhow!("signing left no signature"))?;

    ctx.pending_entry = Some(signed);
    Ok(Response::new(status::CONTINUE)
        .with("Organization-Signature", &org_sig)
        .with("Previous-Hash", &prev_hash))
}

async fn phase_two(ctx: &mut SessionCtx, req: &Request, wid: &RandomID) -> Result<Response> {
    let Some(mut entry) = ctx.pending_entry.take() else {
        return Ok(Response::new(status::PROCESS_INCOMPLETE).with_info("no entry awaiting seals"));
    };
    if req.validate(&["Previous-Hash", "Hash", "User-Signature"]).is_err() {
        return Ok(Response::new(status::BAD_REQUEST).with_info("missing field"));
    }

    entry.set_field("Previous-Hash", &req.data["Previous-Hash"])?;
    entry.set_field("Hash", &req.data["Hash"])?;
    entry.set_field("User-Signature", &req.data["User-Signature"])?;

    // End-to-end re-validation; the server trusts nothing from phase one.
    if let Err(e) = entry.is_data_compliant() {
        return Ok(Response::new(status::BAD_REQUEST).with_info(&e.to_string()));
    }
    match entry.is_expired() {
        Ok(false) => {}
        Ok(true) => return Ok(Response::new(status::EXPIRED)),
        Err(e) => return Ok(Response::new(status::BAD_REQUEST).with_info(&e.to_string())),
    }

    let org_pair = ctx.state.store.get_org_signing_pair().await?;
    if !entry.verify_signature("Organization-Signature", &org_pair.verification_key()?)? {
        return Ok(Response::new(status::BAD_REQUEST).with_info("organization signature mismatch"));
    }
    if !entry.verify_hash()? {
        return Ok(Response::new(status::BAD_REQUEST).with_info("hash mismatch"));
    }
    if entry
        .get_field("Hash")
        .map(|h| !h.starts_with(BLAKE3_PREFIX))
        .unwrap_or(true)
    {
        return Ok(Response::new(status::BAD_REQUEST).with_info("unsupported hash algorithm"));
    }

    let owner = format!("{}/{}", wid, ctx.state.domain);
    let expected_prev = match ctx.state.store.get_current_entry(&owner).await {
        Ok(tip) => {
            let tip_entry = Entry::from_text(&tip.entry)?;
            tip_entry.get_field("Hash").map(|h| h.to_string())
        }
        Err(StoreError::NotFound) => {
            let org_tip = ctx
                .state
                .store
                .get_current_entry(ctx.state.domain.as_str())
                .await?;
            Entry::from_text(&org_tip.entry)?
                .get_field("Hash")
                .map(|h| h.to_string())
        }
        Err(e) => return Err(e.into()),
    };
    if entry.get_field("Previous-Hash").map(|h| h.to_string()) != expected_prev {
        return Ok(Response::new(status::BAD_REQUEST).with_info("chain tip moved, restart"));
    }

    // The user signature is a self-signature under the entry's own
    // verification key; continuity across a key rotation comes from the
    // hash link, not the signer.
    if !entry.verify_signature("User-Signature", &entry.verification_key()?)? {
        return Ok(Response::new(status::BAD_REQUEST).with_info("user signature mismatch"));
    }

    match ctx.state.store.add_keycard_entry(&owner, &entry.serialize()).await {
        Ok(()) => Ok(Response::ok()),
        Err(StoreError::ChainContinuity(reason)) => {
            Ok(Response::new(status::BAD_REQUEST).with_info(&reason))
        }
        Err(e) => Err(e.into()),
    }
}

/// The admin/support/abuse user IDs are pinned to the workspaces that
/// registered them; an entry may neither claim one for a different
/// workspace nor drop one the workspace holds.
async fn check_special_accounts(
    ctx: &SessionCtx,
    entry: &Entry,
    wid: &RandomID,
) -> Result<Option<Response>> {
    let workspace = ctx.state.store.get_workspace(wid).await?;
    let entry_uid = entry.get_field("User-ID");

    if let Some(uid) = entry_uid {
        if SPECIAL_ACCOUNTS.contains(&uid) && workspace.uid.as_deref() != Some(uid) {
            return Ok(Some(
                Response::new(status::FORBIDDEN).with_info("special account user IDs are reserved"),
            ));
        }
    }
    if let Some(stored) = workspace.uid.as_deref() {
        if SPECIAL_ACCOUNTS.contains(&stored) && entry_uid != Some(stored) {
            return Ok(Some(
                Response::new(status::FORBIDDEN)
                    .with_info("special account user IDs cannot change"),
            ));
        }
    }
    Ok(None)
}
