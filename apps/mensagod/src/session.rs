//! Per-connection command loop.
//!
//! One session per inbound connection: read a request, dispatch on its
//! Action, write the response, repeat until the peer hangs up. Handlers
//! map every expected failure to a wire code themselves; anything that
//! escapes is logged and collapsed to 300 so internals never cross the
//! connection boundary.

use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, warn};

use mg_keycard::{Entry, RandomID};
use mg_proto::message::status;
use mg_proto::{ProtoError, Request, Response};

use crate::handlers;
use crate::state::ServerState;

/// Authentication progress for one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginState {
    NoSession,
    AwaitingPassword(RandomID),
    LoggedIn(RandomID),
}

/// Everything a handler may touch: shared state plus per-connection
/// protocol state. The stream itself stays with the session loop.
pub struct SessionCtx {
    pub state: Arc<ServerState>,
    pub login: LoginState,
    /// The org-countersigned entry awaiting the client's seals in a
    /// two-phase ADDENTRY exchange.
    pub pending_entry: Option<Entry>,
}

pub struct Session<S> {
    stream: S,
    ctx: SessionCtx,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Session<S> {
    pub fn new(state: Arc<ServerState>, stream: S) -> Self {
        Self {
            stream,
            ctx: SessionCtx {
                state,
                login: LoginState::NoSession,
                pending_entry: None,
            },
        }
    }

    pub async fn run(mut self) -> Result<()> {
        loop {
            let request = match Request::receive(&mut self.stream).await {
                Ok(r) => r,
                Err(ProtoError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    debug!("peer closed the connection");
                    return Ok(());
                }
                Err(e) => {
                    warn!(error = %e, "dropping connection on unreadable request");
                    return Ok(());
                }
            };

            let response = dispatch(&mut self.ctx, &request).await;
            response.send(&mut self.stream).await?;
        }
    }
}

pub async fn dispatch(ctx: &mut SessionCtx, request: &Request) -> Response {
    let result = match request.action.as_str() {
        "LOGIN" => handlers::auth::login(ctx, request).await,
        "PASSWORD" => handlers::auth::password(ctx, request).await,
        "LOGOUT" => handlers::auth::logout(ctx).await,
        "GETWID" => handlers::card::getwid(ctx, request).await,
        "GETCARD" => handlers::card::getcard(ctx, request).await,
        "PREREG" => handlers::prereg::prereg(ctx, request).await,
        "REGCODE" => handlers::register::regcode(ctx, request).await,
        "REGISTER" => handlers::register::register(ctx, request).await,
        "ADDENTRY" => handlers::addentry::addentry(ctx, request).await,
        other => {
            debug!(action = other, "unknown action");
            Ok(Response::new(status::BAD_REQUEST).with_info("unknown action"))
        }
    };

    match result {
        Ok(response) => response,
        Err(e) => {
            error!(action = %request.action, error = %e, "handler failure");
            Response::new(status::INTERNAL_ERROR)
        }
    }
}
