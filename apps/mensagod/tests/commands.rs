//! Session-level command tests over in-memory streams.

mod common;

use mg_client::{ClientError, ServerConnection};
use mg_crypto::password::hash_password;
use mg_keycard::{RandomID, UserID};
use mg_proto::message::status;
use mg_proto::{Request, Response};
use mensagod::config::RegistrationMode;
use mensagod::session::Session;
use tokio::io::duplex;

use common::{test_server, test_server_with, ADMIN_PASSWORD_HASH};

#[tokio::test]
async fn getwid_resolves_registered_users() {
    let server = test_server().await;
    let (client_end, server_end) = duplex(16384);
    let session = tokio::spawn(Session::new(server.state.clone(), server_end).run());

    let uid: UserID = "csimons".parse().unwrap();
    let wid = RandomID::generate();
    server
        .state
        .store
        .add_workspace(&wid, Some(&uid), &server.state.domain, &hash_password("x").unwrap(), "individual")
        .await
        .unwrap();

    let mut conn = ServerConnection::from_stream(client_end);
    let resolved = conn.getwid(&uid, &server.state.domain).await.unwrap();
    assert_eq!(resolved, wid);

    let missing: UserID = "nobody".parse().unwrap();
    let err = conn.getwid(&missing, &server.state.domain).await.unwrap_err();
    assert!(matches!(err, ClientError::Protocol(404, _)));

    drop(conn);
    session.await.unwrap().unwrap();
}

#[tokio::test]
async fn wrong_password_resets_the_session() {
    let server = test_server().await;
    let (client_end, server_end) = duplex(16384);
    let session = tokio::spawn(Session::new(server.state.clone(), server_end).run());

    let org_enc = server.state.store.get_org_encryption_pair().await.unwrap();
    let mut conn = ServerConnection::from_stream(client_end);
    conn.login(&server.admin_wid, &org_enc.encryption_key().unwrap())
        .await
        .unwrap();

    let err = conn.password("wrong-hash").await.unwrap_err();
    assert!(matches!(err, ClientError::Protocol(401, _)));

    // The failed attempt cleared the login; PASSWORD now needs LOGIN again.
    let err = conn.password(ADMIN_PASSWORD_HASH).await.unwrap_err();
    assert!(matches!(err, ClientError::Protocol(414, _)));

    drop(conn);
    session.await.unwrap().unwrap();
}

#[tokio::test]
async fn prereg_is_admin_only() {
    let server = test_server().await;
    let (client_end, server_end) = duplex(16384);
    let session = tokio::spawn(Session::new(server.state.clone(), server_end).run());

    let mut conn = ServerConnection::from_stream(client_end);

    // Unauthenticated callers are refused outright.
    let err = conn.prereg(None, None).await.unwrap_err();
    assert!(matches!(err, ClientError::Protocol(401, _)));

    // The admin gets a one-time code bound to a fresh workspace ID.
    let org_enc = server.state.store.get_org_encryption_pair().await.unwrap();
    conn.login(&server.admin_wid, &org_enc.encryption_key().unwrap())
        .await
        .unwrap();
    conn.password(ADMIN_PASSWORD_HASH).await.unwrap();

    let uid: UserID = "newuser".parse().unwrap();
    let info = conn.prereg(Some(&uid), None).await.unwrap();
    assert_eq!(info.domain, server.state.domain);
    assert_eq!(info.uid.as_ref(), Some(&uid));
    assert!(!info.reg_code.is_empty());

    drop(conn);
    session.await.unwrap().unwrap();
}

#[tokio::test]
async fn regcode_redeems_a_preregistration_once() {
    let server = test_server().await;
    let (client_end, server_end) = duplex(16384);
    let session = tokio::spawn(Session::new(server.state.clone(), server_end).run());

    let org_enc = server.state.store.get_org_encryption_pair().await.unwrap();
    let org_key = org_enc.encryption_key().unwrap();

    let mut conn = ServerConnection::from_stream(client_end);
    conn.login(&server.admin_wid, &org_key).await.unwrap();
    conn.password(ADMIN_PASSWORD_HASH).await.unwrap();
    let uid: UserID = "kevyn".parse().unwrap();
    let info = conn.prereg(Some(&uid), None).await.unwrap();
    conn.logout().await.unwrap();

    // A wrong code must not consume the reservation.
    let err = conn.regcode(&info.wid, "not-the-code", "pwhash").await.unwrap_err();
    assert!(matches!(err, ClientError::Protocol(401, _)));

    conn.regcode(&info.wid, &info.reg_code, "pwhash").await.unwrap();

    // The new account is live with the reserved user ID and password.
    conn.login(&info.wid, &org_key).await.unwrap();
    conn.password("pwhash").await.unwrap();
    conn.logout().await.unwrap();
    let resolved = conn.getwid(&uid, &server.state.domain).await.unwrap();
    assert_eq!(resolved, info.wid);

    // Spent codes are gone.
    let err = conn.regcode(&info.wid, &info.reg_code, "pwhash").await.unwrap_err();
    assert!(matches!(err, ClientError::Protocol(401, _)));

    drop(conn);
    session.await.unwrap().unwrap();
}

#[tokio::test]
async fn register_is_refused_in_prereg_mode() {
    let server = test_server().await;
    let (client_end, server_end) = duplex(16384);
    let session = tokio::spawn(Session::new(server.state.clone(), server_end).run());

    let mut conn = ServerConnection::from_stream(client_end);
    let err = conn
        .register(&RandomID::generate(), None, "pwhash")
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Protocol(403, _)));

    drop(conn);
    session.await.unwrap().unwrap();
}

#[tokio::test]
async fn open_mode_registers_and_logs_in() {
    let server = test_server_with(RegistrationMode::Open).await;
    let (client_end, server_end) = duplex(16384);
    let session = tokio::spawn(Session::new(server.state.clone(), server_end).run());

    let mut conn = ServerConnection::from_stream(client_end);
    let wid = RandomID::generate();
    let uid: UserID = "walkin".parse().unwrap();
    conn.register(&wid, Some(&uid), "pwhash").await.unwrap();

    // Taken IDs are refused.
    let err = conn
        .register(&RandomID::generate(), Some(&uid), "other")
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Protocol(408, _)));

    let org_enc = server.state.store.get_org_encryption_pair().await.unwrap();
    conn.login(&wid, &org_enc.encryption_key().unwrap()).await.unwrap();
    conn.password("pwhash").await.unwrap();

    drop(conn);
    session.await.unwrap().unwrap();
}

#[tokio::test]
async fn unknown_action_gets_bad_request() {
    let server = test_server().await;
    let (mut client_end, server_end) = duplex(16384);
    let session = tokio::spawn(Session::new(server.state.clone(), server_end).run());

    Request::new("FROBNICATE")
        .send(&mut client_end)
        .await
        .unwrap();
    let resp = Response::receive(&mut client_end).await.unwrap();
    assert_eq!(resp.code, status::BAD_REQUEST);

    drop(client_end);
    session.await.unwrap().unwrap();
}
