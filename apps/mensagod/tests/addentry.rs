//! End-to-end two-phase ADDENTRY over an in-memory stream, exercising the
//! real session loop on one side and the real client library on the other.

mod common;

use mg_client::{ClientError, ServerConnection};
use mg_crypto::{EncryptionPair, SigningPair};
use mg_keycard::{chain_next, Entry, EntryType, Keycard};
use mensagod::session::Session;
use tokio::io::duplex;

use common::{test_server, ADMIN_PASSWORD_HASH};

fn user_entry(wid: &str, spair: &SigningPair, epair: &EncryptionPair) -> Entry {
    let mut entry = Entry::new(EntryType::User);
    entry
        .set_fields(&[
            ("Workspace-ID", wid),
            ("User-ID", "admin"),
            ("Domain", "example.com"),
            ("Verification-Key", &spair.public_key().to_string()),
            ("Encryption-Key", &epair.public_key().to_string()),
        ])
        .unwrap();
    entry
}

#[tokio::test]
async fn two_phase_addentry_commits_a_verifiable_chain() {
    let server = test_server().await;
    let (client_end, server_end) = duplex(65536);
    let session = tokio::spawn(Session::new(server.state.clone(), server_end).run());

    let org_enc = server.state.store.get_org_encryption_pair().await.unwrap();
    let org_sign = server.state.store.get_org_signing_pair().await.unwrap();

    let mut conn = ServerConnection::from_stream(client_end);
    conn.login(&server.admin_wid, &org_enc.encryption_key().unwrap())
        .await
        .unwrap();
    conn.password(ADMIN_PASSWORD_HASH).await.unwrap();

    let spair = SigningPair::generate().unwrap();
    let epair = EncryptionPair::generate().unwrap();
    let entry = user_entry(server.admin_wid.as_str(), &spair, &epair);

    let sealed = conn
        .add_entry(&entry, &org_sign.verification_key().unwrap(), &spair)
        .await
        .unwrap();
    assert_eq!(sealed.index().unwrap(), 1);
    assert!(sealed.get_field("Organization-Signature").is_some());
    assert!(sealed.get_field("User-Signature").is_some());

    // The committed entry links to the org chain tip and retrieves intact.
    let owner = format!("{}/example.com", server.admin_wid);
    let card = conn.getcard(&owner, 1).await.unwrap();
    assert_eq!(card.entries.len(), 1);
    assert_eq!(card.entries[0], sealed);

    let org_tip = server
        .state
        .store
        .get_current_entry("example.com")
        .await
        .unwrap();
    let org_entry = Entry::from_text(&org_tip.entry).unwrap();
    assert_eq!(
        card.entries[0].get_field("Previous-Hash"),
        org_entry.get_field("Hash"),
    );

    conn.logout().await.unwrap();
    drop(conn);
    session.await.unwrap().unwrap();
}

#[tokio::test]
async fn key_rotation_extends_the_chain() {
    let server = test_server().await;
    let (client_end, server_end) = duplex(65536);
    let session = tokio::spawn(Session::new(server.state.clone(), server_end).run());

    let org_enc = server.state.store.get_org_encryption_pair().await.unwrap();
    let org_sign = server.state.store.get_org_signing_pair().await.unwrap();
    let org_vk = org_sign.verification_key().unwrap();

    let mut conn = ServerConnection::from_stream(client_end);
    conn.login(&server.admin_wid, &org_enc.encryption_key().unwrap())
        .await
        .unwrap();
    conn.password(ADMIN_PASSWORD_HASH).await.unwrap();

    let spair = SigningPair::generate().unwrap();
    let epair = EncryptionPair::generate().unwrap();
    let entry = user_entry(server.admin_wid.as_str(), &spair, &epair);
    let sealed = conn.add_entry(&entry, &org_vk, &spair).await.unwrap();

    // Rotate: entry 2 publishes fresh keys and is signed with them.
    let (next, keys) = chain_next(&sealed, 90).unwrap();
    let new_pair =
        SigningPair::from_cryptostrings(&keys["primary.public"], &keys["primary.private"])
            .unwrap();
    let rotated = conn.add_entry(&next, &org_vk, &new_pair).await.unwrap();

    assert_eq!(rotated.index().unwrap(), 2);
    assert_ne!(
        rotated.get_field("Verification-Key"),
        sealed.get_field("Verification-Key"),
    );
    assert_eq!(rotated.get_field("Previous-Hash"), sealed.get_field("Hash"));

    let owner = format!("{}/example.com", server.admin_wid);
    let card = conn.getcard(&owner, 1).await.unwrap();
    assert_eq!(card.entries.len(), 2);
    card.verify_chain().unwrap();

    drop(conn);
    session.await.unwrap().unwrap();
}

#[tokio::test]
async fn addentry_with_untrusted_org_key_aborts_before_commit() {
    let server = test_server().await;
    let (client_end, server_end) = duplex(65536);
    let session = tokio::spawn(Session::new(server.state.clone(), server_end).run());

    let org_enc = server.state.store.get_org_encryption_pair().await.unwrap();
    let mut conn = ServerConnection::from_stream(client_end);
    conn.login(&server.admin_wid, &org_enc.encryption_key().unwrap())
        .await
        .unwrap();
    conn.password(ADMIN_PASSWORD_HASH).await.unwrap();

    let spair = SigningPair::generate().unwrap();
    let epair = EncryptionPair::generate().unwrap();
    let entry = user_entry(server.admin_wid.as_str(), &spair, &epair);

    // Pin a key that is not the org's; the client must refuse the
    // countersignature and never upload the final seals.
    let rogue = SigningPair::generate().unwrap();
    let err = conn
        .add_entry(&entry, &rogue.verification_key().unwrap(), &spair)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Verification(_)));

    let owner = format!("{}/example.com", server.admin_wid);
    assert!(server.state.store.get_current_entry(&owner).await.is_err());

    drop(conn);
    session.await.unwrap().unwrap();
}

#[tokio::test]
async fn addentry_requires_login() {
    let server = test_server().await;
    let (client_end, server_end) = duplex(65536);
    let session = tokio::spawn(Session::new(server.state.clone(), server_end).run());

    let spair = SigningPair::generate().unwrap();
    let epair = EncryptionPair::generate().unwrap();
    let entry = user_entry(server.admin_wid.as_str(), &spair, &epair);
    let org_sign = server.state.store.get_org_signing_pair().await.unwrap();

    let mut conn = ServerConnection::from_stream(client_end);
    let err = conn
        .add_entry(&entry, &org_sign.verification_key().unwrap(), &spair)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Protocol(401, _)));

    drop(conn);
    session.await.unwrap().unwrap();
}

#[tokio::test]
async fn getcard_serves_the_org_card() {
    let server = test_server().await;
    let (client_end, server_end) = duplex(65536);
    let session = tokio::spawn(Session::new(server.state.clone(), server_end).run());

    let mut conn = ServerConnection::from_stream(client_end);
    let card: Keycard = conn.getcard("example.com", 1).await.unwrap();
    assert_eq!(card.entries.len(), 1);
    card.verify_chain().unwrap();

    drop(conn);
    session.await.unwrap().unwrap();
}
