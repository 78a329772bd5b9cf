//! Row types for the relational store.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One provisioned account.
#[derive(Debug, Clone, FromRow)]
pub struct Workspace {
    pub wid: String,
    pub uid: Option<String>,
    pub domain: String,
    pub wtype: String,
    pub status: String,
}

/// One persisted keycard entry. `owner` is the org's domain for
/// organization cards and the `wid/domain` workspace address for user
/// cards.
#[derive(Debug, Clone, FromRow)]
pub struct KeycardRow {
    pub owner: String,
    pub idx: i64,
    pub entry: String,
    pub fingerprint: String,
}

/// One outstanding preregistration, handed back when its code is redeemed
/// so the new workspace inherits the user ID and domain the admin reserved.
#[derive(Debug, Clone, FromRow)]
pub struct Prereg {
    pub wid: String,
    pub uid: Option<String>,
    pub domain: String,
}

/// Client-sync record kinds. Only Create is produced today; the variant
/// space matches the protocol's update vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateType {
    Create,
    Delete,
    Move,
    Rotate,
}

impl UpdateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateType::Create => "CREATE",
            UpdateType::Delete => "DELETE",
            UpdateType::Move => "MOVE",
            UpdateType::Rotate => "ROTATE",
        }
    }
}

/// Sync record appended when the server changes a workspace's data on its
/// own authority (e.g. delivering a message). `devid` is the all-zero
/// device ID for server-authored records.
#[derive(Debug, Clone, FromRow)]
pub struct UpdateRecord {
    pub rid: String,
    pub wid: String,
    pub update_type: String,
    pub update_data: String,
    pub unixtime: i64,
    pub devid: String,
}

/// Device ID used for records the server writes about itself.
pub const SERVER_DEVICE_ID: &str = "00000000-0000-0000-0000-000000000000";
