//! First-run provisioning: org keys, the root org keycard entry, and the
//! admin account preregistration.

use anyhow::Result;
use rand::RngCore;

use mg_crypto::hash::BLAKE3_PREFIX;
use mg_crypto::password::hash_password;
use mg_crypto::{EncryptionPair, SigningPair};
use mg_keycard::{Entry, EntryType, RandomID, UserID};

use crate::state::ServerState;

pub struct ProvisionResult {
    pub admin_wid: RandomID,
    pub admin_regcode: String,
}

/// Sets up a fresh server: generates the org keypairs, publishes the
/// self-signed root org entry, and preregisters the admin account.
/// Returns the registration code exactly once; only its hash survives.
pub async fn provision_org(state: &ServerState) -> Result<ProvisionResult> {
    let spair = SigningPair::generate()?;
    let epair = EncryptionPair::generate()?;
    state.store.set_org_keys(&spair, &epair).await?;

    let admin_wid = RandomID::generate();
    let admin_addr = format!("{}/{}", admin_wid, state.domain);

    let mut root = Entry::new(EntryType::Organization);
    root.set_fields(&[
        ("Name", &state.config.org_name),
        ("Domain", state.domain.as_str()),
        ("Contact-Admin", &admin_addr),
        ("Primary-Verification-Key", &spair.public_key().to_string()),
        ("Encryption-Key", &epair.public_key().to_string()),
    ])?;
    root.hash(BLAKE3_PREFIX)?;
    root.sign("Organization-Signature", &spair)?;
    state
        .store
        .add_keycard_entry(state.domain.as_str(), &root.serialize())
        .await?;

    let mut raw = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut raw);
    let regcode = hex::encode(raw);
    let admin_uid: UserID = "admin".parse()?;
    state
        .store
        .add_prereg(&admin_wid, Some(&admin_uid), &state.domain, &hash_password(&regcode)?)
        .await?;

    Ok(ProvisionResult {
        admin_wid,
        admin_regcode: regcode,
    })
}
