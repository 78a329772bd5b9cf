//! REGCODE and REGISTER: turning a reservation (or an open door) into a
//! real workspace.
//!
//! REGCODE redeems a one-time code issued through PREREG and works in
//! every registration mode. REGISTER creates a workspace with no prior
//! invitation and is honored only when the server runs in open mode.

use anyhow::Result;

use mg_crypto::password::hash_password;
use mg_keycard::{Domain, RandomID, UserID};
use mg_proto::message::status;
use mg_proto::{Request, Response};
use mg_store::StoreError;

use crate::config::RegistrationMode;
use crate::session::{LoginState, SessionCtx};

pub async fn regcode(ctx: &mut SessionCtx, req: &Request) -> Result<Response> {
    if ctx.login != LoginState::NoSession {
        return Ok(Response::new(status::BAD_REQUEST).with_info("session already active"));
    }
    if req.validate(&["Workspace-ID", "Reg-Code", "Password-Hash"]).is_err() {
        return Ok(Response::new(status::BAD_REQUEST).with_info("missing field"));
    }
    let wid: RandomID = match req.data["Workspace-ID"].parse() {
        Ok(w) => w,
        Err(_) => return Ok(Response::new(status::BAD_REQUEST).with_info("bad workspace ID")),
    };

    let Some(slot) = ctx
        .state
        .store
        .consume_prereg(&wid, &req.data["Reg-Code"])
        .await?
    else {
        return Ok(Response::new(status::UNAUTHORIZED).with_info("unknown workspace or code"));
    };

    // The slot's values were validated when the admin reserved it.
    let uid: Option<UserID> = slot.uid.as_deref().map(str::parse).transpose()?;
    let domain: Domain = slot.domain.parse()?;
    match ctx
        .state
        .store
        .add_workspace(
            &wid,
            uid.as_ref(),
            &domain,
            &hash_password(&req.data["Password-Hash"])?,
            "individual",
        )
        .await
    {
        Ok(()) => {}
        Err(StoreError::Exists) => return Ok(Response::new(status::RESOURCE_EXISTS)),
        Err(e) => return Err(e.into()),
    }

    let mut resp = Response::ok()
        .with("Workspace-ID", wid.as_str())
        .with("Domain", domain.as_str());
    if let Some(uid) = uid {
        resp = resp.with("User-ID", uid.as_str());
    }
    Ok(resp)
}

pub async fn register(ctx: &mut SessionCtx, req: &Request) -> Result<Response> {
    if ctx.state.config.registration != RegistrationMode::Open {
        return Ok(Response::new(status::FORBIDDEN).with_info("registration is by invitation"));
    }
    if ctx.login != LoginState::NoSession {
        return Ok(Response::new(status::BAD_REQUEST).with_info("session already active"));
    }
    if req.validate(&["Workspace-ID", "Password-Hash"]).is_err() {
        return Ok(Response::new(status::BAD_REQUEST).with_info("missing field"));
    }
    let wid: RandomID = match req.data["Workspace-ID"].parse() {
        Ok(w) => w,
        Err(_) => return Ok(Response::new(status::BAD_REQUEST).with_info("bad workspace ID")),
    };
    let uid: Option<UserID> = match req.data.get("User-ID") {
        Some(raw) => match raw.parse() {
            Ok(u) => Some(u),
            Err(_) => return Ok(Response::new(status::BAD_REQUEST).with_info("bad user ID")),
        },
        None => None,
    };
    if let Some(ref uid) = uid {
        if ctx.state.store.resolve_uid(uid, &ctx.state.domain).await.is_ok() {
            return Ok(Response::new(status::RESOURCE_EXISTS).with_info("user ID taken"));
        }
    }

    match ctx
        .state
        .store
        .add_workspace(
            &wid,
            uid.as_ref(),
            &ctx.state.domain,
            &hash_password(&req.data["Password-Hash"])?,
            "individual",
        )
        .await
    {
        Ok(()) => Ok(Response::ok()
            .with("Workspace-ID", wid.as_str())
            .with("Domain", ctx.state.domain.as_str())),
        Err(StoreError::Exists) => Ok(Response::new(status::RESOURCE_EXISTS)),
        Err(e) => Err(e.into()),
    }
}
