//! GETWID and GETCARD.

use anyhow::Result;

use mg_keycard::{Domain, MAddress, UserID};
use mg_proto::message::status;
use mg_proto::{Request, Response};
use mg_resolver::ResolveError;
use mg_store::StoreError;

use crate::session::SessionCtx;

pub async fn getwid(ctx: &mut SessionCtx, req: &Request) -> Result<Response> {
    if req.validate(&["User-ID", "Domain"]).is_err() {
        return Ok(Response::new(status::BAD_REQUEST).with_info("missing field"));
    }
    let uid: UserID = match req.data["User-ID"].parse() {
        Ok(u) => u,
        Err(_) => return Ok(Response::new(status::BAD_REQUEST).with_info("bad user ID")),
    };
    let domain: Domain = match req.data["Domain"].parse() {
        Ok(d) => d,
        Err(_) => return Ok(Response::new(status::BAD_REQUEST).with_info("bad domain")),
    };

    let addr = MAddress::User { uid, domain };
    match ctx.state.resolver.resolve_address(&addr).await {
        Ok(wid) => Ok(Response::ok().with("Workspace-ID", wid.as_str())),
        Err(ResolveError::NotFound) => Ok(Response::new(status::NOT_FOUND)),
        Err(e) => Err(e.into()),
    }
}

/// Start-Index semantics: 0 = current entry only, 1 = the whole chain,
/// N = entries from index N upward. Large cards ride the multipart framing
/// transparently.
pub async fn getcard(ctx: &mut SessionCtx, req: &Request) -> Result<Response> {
    if req.validate(&["Owner", "Start-Index"]).is_err() {
        return Ok(Response::new(status::BAD_REQUEST).with_info("missing field"));
    }
    let owner = &req.data["Owner"];
    let start: u32 = match req.data["Start-Index"].parse() {
        Ok(n) => n,
        Err(_) => return Ok(Response::new(status::BAD_REQUEST).with_info("bad start index")),
    };

    let rows = if start == 0 {
        match ctx.state.store.get_current_entry(owner).await {
            Ok(row) => vec![row],
            Err(StoreError::NotFound) => return Ok(Response::new(status::NOT_FOUND)),
            Err(e) => return Err(e.into()),
        }
    } else {
        match ctx.state.store.get_keycard_entries(owner, start).await {
            Ok(rows) => rows,
            Err(StoreError::NotFound) => return Ok(Response::new(status::NOT_FOUND)),
            Err(e) => return Err(e.into()),
        }
    };

    let mut card_data = String::new();
    for row in rows {
        card_data.push_str("----- BEGIN ENTRY -----\r\n");
        card_data.push_str(&row.entry);
        card_data.push_str("----- END ENTRY -----\r\n");
    }
    Ok(Response::ok().with("Card-Data", &card_data))
}
