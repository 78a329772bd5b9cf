//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use tempfile::TempDir;

use mg_crypto::password::hash_password;
use mg_keycard::{RandomID, UserID};
use mensagod::config::{RegistrationMode, ServerConfig};
use mensagod::setup::{provision_org, ProvisionResult};
use mensagod::state::ServerState;

pub const ADMIN_PASSWORD_HASH: &str = "argon2-digest-from-the-client";

pub struct TestServer {
    pub state: Arc<ServerState>,
    pub admin_wid: RandomID,
    _tmp: TempDir,
}

/// Provisions a fresh org in a tempdir and registers the admin workspace.
pub async fn test_server() -> TestServer {
    test_server_with(RegistrationMode::Prereg).await
}

pub async fn test_server_with(registration: RegistrationMode) -> TestServer {
    let tmp = tempfile::tempdir().unwrap();
    let config = ServerConfig {
        domain: "example.com".into(),
        org_name: "Example, Inc.".into(),
        top_dir: tmp.path().join("blobs"),
        db_path: tmp.path().join("mensago.db"),
        registration,
        ..Default::default()
    };
    std::fs::create_dir_all(&config.top_dir).unwrap();

    let state = ServerState::init(config).await.unwrap();
    let ProvisionResult { admin_wid, .. } = provision_org(&state).await.unwrap();

    let admin_uid: UserID = "admin".parse().unwrap();
    state
        .store
        .add_workspace(
            &admin_wid,
            Some(&admin_uid),
            &state.domain,
            &hash_password(ADMIN_PASSWORD_HASH).unwrap(),
            "individual",
        )
        .await
        .unwrap();

    TestServer {
        state,
        admin_wid,
        _tmp: tmp,
    }
}
