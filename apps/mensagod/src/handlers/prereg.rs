//! PREREG: admin-only workspace preregistration.

use anyhow::Result;
use rand::RngCore;

use mg_crypto::password::hash_password;
use mg_keycard::{Domain, RandomID, UserID};
use mg_proto::message::status;
use mg_proto::{Request, Response};
use mg_store::StoreError;

use crate::session::{LoginState, SessionCtx};

/// Registration codes are long enough to resist online guessing; only
/// their Argon2 hash is stored.
fn generate_regcode() -> String {
    let mut raw = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut raw);
    hex::encode(raw)
}

pub async fn prereg(ctx: &mut SessionCtx, req: &Request) -> Result<Response> {
    let caller = match &ctx.login {
        LoginState::LoggedIn(wid) => wid.clone(),
        _ => return Ok(Response::new(status::UNAUTHORIZED)),
    };
    let admin_uid: UserID = "admin".parse()?;
    let admin_wid = match ctx.state.store.resolve_uid(&admin_uid, &ctx.state.domain).await {
        Ok(wid) => wid,
        Err(StoreError::NotFound) => return Ok(Response::new(status::FORBIDDEN)),
        Err(e) => return Err(e.into()),
    };
    if caller != admin_wid {
        return Ok(Response::new(status::FORBIDDEN));
    }

    let domain: Domain = match req.data.get("Domain") {
        Some(raw) => match raw.parse() {
            Ok(d) => d,
            Err(_) => return Ok(Response::new(status::BAD_REQUEST).with_info("bad domain")),
        },
        None => ctx.state.domain.clone(),
    };
    let uid: Option<UserID> = match req.data.get("User-ID") {
        Some(raw) => match raw.parse() {
            Ok(u) => Some(u),
            Err(_) => return Ok(Response::new(status::BAD_REQUEST).with_info("bad user ID")),
        },
        None => None,
    };
    if let Some(ref uid) = uid {
        if ctx.state.store.resolve_uid(uid, &domain).await.is_ok() {
            return Ok(Response::new(status::RESOURCE_EXISTS).with_info("user ID taken"));
        }
    }

    let wid = RandomID::generate();
    let regcode = generate_regcode();
    match ctx
        .state
        .store
        .add_prereg(&wid, uid.as_ref(), &domain, &hash_password(&regcode)?)
        .await
    {
        Ok(()) => {}
        Err(StoreError::Exists) => {
            return Ok(Response::new(status::RESOURCE_EXISTS));
        }
        Err(e) => return Err(e.into()),
    }

    let mut resp = Response::ok()
        .with("Workspace-ID", wid.as_str())
        .with("Domain", domain.as_str())
        .with("Reg-Code", &regcode);
    if let Some(uid) = uid {
        resp = resp.with("User-ID", uid.as_str());
    }
    Ok(resp)
}
