//! Command messages: JSON Request/Response plus status codes.
//!
//! Requests are `{"Action": ..., "Data": {string: string}}`; responses are
//! `{"Code": int, "Status": ..., "Info": ..., "Data": {...}}`. Codes follow
//! an HTTP-like convention: 100s continue/pending, 200 success, 300s server
//! error, 400s client error, 500s delivery diagnostics.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::ProtoError;
use crate::frame::{read_message, write_message};

/// Wire status codes.
pub mod status {
    pub const CONTINUE: u16 = 100;
    pub const PENDING: u16 = 102;
    pub const OK: u16 = 200;
    pub const INTERNAL_ERROR: u16 = 300;
    pub const NOT_IMPLEMENTED: u16 = 301;
    pub const BAD_REQUEST: u16 = 400;
    pub const UNAUTHORIZED: u16 = 401;
    pub const FORBIDDEN: u16 = 403;
    pub const NOT_FOUND: u16 = 404;
    pub const RESOURCE_EXISTS: u16 = 408;
    pub const BAD_SESSION: u16 = 414;
    pub const PROCESS_INCOMPLETE: u16 = 416;
    pub const EXPIRED: u16 = 415;
    /// Delivery diagnostic: receiver metadata could not be decrypted.
    pub const UNREADABLE_ADDRESS: u16 = 504;

    pub fn text(code: u16) -> &'static str {
        match code {
            CONTINUE => "CONTINUE",
            PENDING => "PENDING",
            OK => "OK",
            INTERNAL_ERROR => "INTERNAL SERVER ERROR",
            NOT_IMPLEMENTED => "NOT IMPLEMENTED",
            BAD_REQUEST => "BAD REQUEST",
            UNAUTHORIZED => "UNAUTHORIZED",
            FORBIDDEN => "FORBIDDEN",
            NOT_FOUND => "NOT FOUND",
            RESOURCE_EXISTS => "RESOURCE EXISTS",
            BAD_SESSION => "BAD SESSION",
            PROCESS_INCOMPLETE => "PROCESS INCOMPLETE",
            EXPIRED => "EXPIRED",
            UNREADABLE_ADDRESS => "UNREADABLE ADDRESS",
            _ => "UNKNOWN",
        }
    }
}

/// A client command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    #[serde(rename = "Action")]
    pub action: String,
    #[serde(rename = "Data", default)]
    pub data: HashMap<String, String>,
}

impl Request {
    pub fn new(action: &str) -> Self {
        Self {
            action: action.to_string(),
            data: HashMap::new(),
        }
    }

    pub fn with(mut self, field: &str, value: &str) -> Self {
        self.data.insert(field.to_string(), value.to_string());
        self
    }

    /// Fetch a required field; its absence is a schema violation.
    pub fn field(&self, name: &str) -> Result<&str, ProtoError> {
        self.data
            .get(name)
            .map(|s| s.as_str())
            .ok_or_else(|| ProtoError::Schema(format!("missing field {name}")))
    }

    pub fn validate(&self, required: &[&str]) -> Result<(), ProtoError> {
        for name in required {
            if !self.data.contains_key(*name) {
                return Err(ProtoError::Schema(format!("missing field {name}")));
            }
        }
        Ok(())
    }

    pub async fn send<W: AsyncWrite + Unpin>(&self, stream: &mut W) -> Result<(), ProtoError> {
        write_message(stream, &serde_json::to_vec(self)?).await
    }

    pub async fn receive<R: AsyncRead + Unpin>(stream: &mut R) -> Result<Self, ProtoError> {
        let raw = read_message(stream).await?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

/// A server reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    #[serde(rename = "Code")]
    pub code: u16,
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "Info", default)]
    pub info: String,
    #[serde(rename = "Data", default)]
    pub data: HashMap<String, String>,
}

impl Response {
    pub fn new(code: u16) -> Self {
        Self {
            code,
            status: status::text(code).to_string(),
            info: String::new(),
            data: HashMap::new(),
        }
    }

    pub fn with_info(mut self, info: &str) -> Self {
        self.info = info.to_string();
        self
    }

    pub fn with(mut self, field: &str, value: &str) -> Self {
        self.data.insert(field.to_string(), value.to_string());
        self
    }

    pub fn ok() -> Self {
        Self::new(status::OK)
    }

    pub fn field(&self, name: &str) -> Result<&str, ProtoError> {
        self.data
            .get(name)
            .map(|s| s.as_str())
            .ok_or_else(|| ProtoError::Schema(format!("missing field {name}")))
    }

    pub async fn send<W: AsyncWrite + Unpin>(&self, stream: &mut W) -> Result<(), ProtoError> {
        write_message(stream, &serde_json::to_vec(self)?).await
    }

    pub async fn receive<R: AsyncRead + Unpin>(stream: &mut R) -> Result<Self, ProtoError> {
        let raw = read_message(stream).await?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn request_response_roundtrip() {
        let (mut a, mut b) = tokio::io::duplex(1 << 16);

        let req = Request::new("GETWID").with("User-ID", "csimons");
        req.send(&mut a).await.unwrap();
        let got = Request::receive(&mut b).await.unwrap();
        assert_eq!(got.action, "GETWID");
        assert_eq!(got.field("User-ID").unwrap(), "csimons");
        assert!(got.field("Domain").is_err());

        let resp = Response::ok().with("Workspace-ID", "id-here");
        resp.send(&mut b).await.unwrap();
        let got = Response::receive(&mut a).await.unwrap();
        assert_eq!(got.code, status::OK);
        assert_eq!(got.status, "OK");
    }

    #[test]
    fn wire_shape_matches_convention() {
        let req = Request::new("LOGIN").with("Workspace-ID", "w");
        let v: serde_json::Value = serde_json::from_str(&serde_json::to_string(&req).unwrap()).unwrap();
        assert_eq!(v["Action"], "LOGIN");
        assert_eq!(v["Data"]["Workspace-ID"], "w");

        let resp = Response::new(status::BAD_REQUEST).with_info("nope");
        let v: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&resp).unwrap()).unwrap();
        assert_eq!(v["Code"], 400);
        assert_eq!(v["Status"], "BAD REQUEST");
        assert_eq!(v["Info"], "nope");
    }
}
