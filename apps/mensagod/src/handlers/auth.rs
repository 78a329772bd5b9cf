//! LOGIN / PASSWORD / LOGOUT.
//!
//! LOGIN carries a random client challenge sealed to the org's encryption
//! key. Echoing the plaintext back proves the server holds the key before
//! the client reveals anything, and only then does PASSWORD send the
//! password hash.

use anyhow::Result;

use mg_crypto::CryptoString;
use mg_keycard::RandomID;
use mg_proto::message::status;
use mg_proto::{Request, Response};
use mg_store::StoreError;

use crate::session::{LoginState, SessionCtx};

pub async fn login(ctx: &mut SessionCtx, req: &Request) -> Result<Response> {
    if !matches!(ctx.login, LoginState::NoSession) {
        return Ok(Response::new(status::BAD_REQUEST).with_info("session already in progress"));
    }
    if req.validate(&["Workspace-ID", "Challenge"]).is_err() {
        return Ok(Response::new(status::BAD_REQUEST).with_info("missing field"));
    }

    let wid: RandomID = match req.data["Workspace-ID"].parse() {
        Ok(w) => w,
        Err(_) => {
            return Ok(Response::new(status::BAD_REQUEST).with_info("bad workspace ID"));
        }
    };
    if !ctx.state.store.workspace_exists(&wid).await? {
        return Ok(Response::new(status::NOT_FOUND).with_info("workspace not found"));
    }

    let challenge: CryptoString = match req.data["Challenge"].parse() {
        Ok(c) => c,
        Err(_) => {
            return Ok(Response::new(status::BAD_REQUEST).with_info("bad challenge"));
        }
    };
    let org_pair = ctx.state.store.get_org_encryption_pair().await?;
    let answer = match org_pair.decrypt(&challenge) {
        Ok(raw) => match String::from_utf8(raw) {
            Ok(s) => s,
            Err(_) => {
                return Ok(Response::new(status::BAD_REQUEST).with_info("bad challenge"));
            }
        },
        Err(_) => {
            return Ok(
                Response::new(status::BAD_REQUEST).with_info("challenge decryption failed")
            );
        }
    };

    ctx.login = LoginState::AwaitingPassword(wid);
    Ok(Response::new(status::CONTINUE).with("Response", &answer))
}

pub async fn password(ctx: &mut SessionCtx, req: &Request) -> Result<Response> {
    let wid = match &ctx.login {
        LoginState::AwaitingPassword(wid) => wid.clone(),
        _ => {
            return Ok(Response::new(status::BAD_SESSION).with_info("LOGIN must come first"));
        }
    };
    let hash = match req.field("Password-Hash") {
        Ok(h) => h,
        Err(_) => {
            return Ok(Response::new(status::BAD_REQUEST).with_info("missing field"));
        }
    };

    match ctx.state.store.check_password(&wid, hash).await {
        Ok(true) => {
            ctx.login = LoginState::LoggedIn(wid);
            Ok(Response::ok())
        }
        Ok(false) | Err(StoreError::NotFound) => {
            ctx.login = LoginState::NoSession;
            Ok(Response::new(status::UNAUTHORIZED))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn logout(ctx: &mut SessionCtx) -> Result<Response> {
    ctx.login = LoginState::NoSession;
    ctx.pending_entry = None;
    Ok(Response::ok())
}
