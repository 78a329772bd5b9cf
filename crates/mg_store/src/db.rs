//! Relational store over SQLite via sqlx.
//!
//! WAL journal mode and foreign keys are configured at connection time, not
//! inside a migration — SQLite forbids changing `journal_mode` inside a
//! transaction and sqlx wraps every migration in one.
//!
//! Chain-sensitive writes (`add_keycard_entry`) re-check the chain tip
//! inside their own transaction rather than trusting an earlier read; the
//! store's transaction semantics are the only serialization point shared by
//! concurrent sessions.

use std::path::Path;

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool};
use uuid::Uuid;

use mg_crypto::{hash as cshash, CryptoString, EncryptionPair, SigningPair};
use mg_keycard::{Domain, RandomID, UserID};

use crate::error::StoreError;
use crate::models::{KeycardRow, Prereg, UpdateType, Workspace, SERVER_DEVICE_ID};

/// Central store handle. Cheap to clone (pool is Arc internally).
#[derive(Clone)]
pub struct Store {
    pub pool: SqlitePool,
}

impl Store {
    /// Open (or create) the database at `db_path` and run migrations.
    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        let opts = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePool::connect_with(opts).await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        Ok(Self { pool })
    }

    // ── Workspaces ───────────────────────────────────────────────────────────

    pub async fn add_workspace(
        &self,
        wid: &RandomID,
        uid: Option<&UserID>,
        domain: &Domain,
        password_hash: &str,
        wtype: &str,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        // Uniqueness is re-checked here, inside the same transaction as the
        // insert, not assumed from an earlier read.
        let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM workspaces WHERE wid = ?")
            .bind(wid.as_str())
            .fetch_one(&mut *tx)
            .await?;
        if exists > 0 {
            return Err(StoreError::Exists);
        }

        sqlx::query(
            "INSERT INTO workspaces (wid, uid, domain, wtype, status, password)
             VALUES (?, ?, ?, ?, 'active', ?)",
        )
        .bind(wid.as_str())
        .bind(uid.map(|u| u.as_str()))
        .bind(domain.as_str())
        .bind(wtype)
        .bind(password_hash)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn workspace_exists(&self, wid: &RandomID) -> Result<bool, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM workspaces WHERE wid = ?")
            .bind(wid.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    pub async fn get_workspace(&self, wid: &RandomID) -> Result<Workspace, StoreError> {
        sqlx::query_as::<_, Workspace>(
            "SELECT wid, uid, domain, wtype, status FROM workspaces WHERE wid = ?",
        )
        .bind(wid.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)
    }

    /// Resolve a user ID to its workspace ID within a domain.
    pub async fn resolve_uid(
        &self,
        uid: &UserID,
        domain: &Domain,
    ) -> Result<RandomID, StoreError> {
        let row: Option<String> =
            sqlx::query_scalar("SELECT wid FROM workspaces WHERE uid = ? AND domain = ?")
                .bind(uid.as_str())
                .bind(domain.as_str())
                .fetch_optional(&self.pool)
                .await?;
        let wid = row.ok_or(StoreError::NotFound)?;
        Ok(wid.parse()?)
    }

    /// Verify a login password hash against the stored Argon2 digest.
    pub async fn check_password(
        &self,
        wid: &RandomID,
        password: &str,
    ) -> Result<bool, StoreError> {
        let stored: Option<String> =
            sqlx::query_scalar("SELECT password FROM workspaces WHERE wid = ?")
                .bind(wid.as_str())
                .fetch_optional(&self.pool)
                .await?;
        let stored = stored.ok_or(StoreError::NotFound)?;
        Ok(mg_crypto::password::verify_password(password, &stored)?)
    }

    // ── Keycards ─────────────────────────────────────────────────────────────

    /// Append an entry to `owner`'s card. The expected index is re-derived
    /// from the current tip inside the transaction; a stale caller gets a
    /// chain-continuity error instead of a fork.
    pub async fn add_keycard_entry(&self, owner: &str, entry_text: &str) -> Result<(), StoreError> {
        let entry = mg_keycard::Entry::from_text(entry_text)?;
        let index = entry.index()? as i64;
        let fingerprint = cshash::hash(entry_text.as_bytes()).to_string();

        let mut tx = self.pool.begin().await?;

        let tip: Option<i64> =
            sqlx::query_scalar("SELECT MAX(idx) FROM keycards WHERE owner = ?")
                .bind(owner)
                .fetch_one(&mut *tx)
                .await?;
        let expected = tip.unwrap_or(0) + 1;
        if index != expected {
            return Err(StoreError::ChainContinuity(format!(
                "expected index {expected}, got {index}"
            )));
        }

        sqlx::query("INSERT INTO keycards (owner, idx, entry, fingerprint) VALUES (?, ?, ?, ?)")
            .bind(owner)
            .bind(index)
            .bind(entry_text)
            .bind(&fingerprint)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Entries from `start_index` up (1 = whole chain); the paged GETCARD
    /// contract.
    pub async fn get_keycard_entries(
        &self,
        owner: &str,
        start_index: u32,
    ) -> Result<Vec<KeycardRow>, StoreError> {
        let rows = sqlx::query_as::<_, KeycardRow>(
            "SELECT owner, idx, entry, fingerprint FROM keycards
             WHERE owner = ? AND idx >= ? ORDER BY idx",
        )
        .bind(owner)
        .bind(start_index as i64)
        .fetch_all(&self.pool)
        .await?;
        if rows.is_empty() {
            return Err(StoreError::NotFound);
        }
        Ok(rows)
    }

    /// The chain tip only (GETCARD with Start-Index 0).
    pub async fn get_current_entry(&self, owner: &str) -> Result<KeycardRow, StoreError> {
        sqlx::query_as::<_, KeycardRow>(
            "SELECT owner, idx, entry, fingerprint FROM keycards
             WHERE owner = ? ORDER BY idx DESC LIMIT 1",
        )
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)
    }

    // ── Organization keys ────────────────────────────────────────────────────

    pub async fn set_org_keys(
        &self,
        signing: &SigningPair,
        encryption: &EncryptionPair,
    ) -> Result<(), StoreError> {
        sqlx::query("INSERT OR REPLACE INTO orgkeys (purpose, pubkey, privkey) VALUES ('sign', ?, ?)")
            .bind(signing.public_key().to_string())
            .bind(signing.private_key()?.to_string())
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "INSERT OR REPLACE INTO orgkeys (purpose, pubkey, privkey) VALUES ('encrypt', ?, ?)",
        )
        .bind(encryption.public_key().to_string())
        .bind(encryption.private_key()?.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_org_signing_pair(&self) -> Result<SigningPair, StoreError> {
        let (public, private) = self.get_org_key_row("sign").await?;
        Ok(SigningPair::from_cryptostrings(&public, &private)?)
    }

    pub async fn get_org_encryption_pair(&self) -> Result<EncryptionPair, StoreError> {
        let (public, private) = self.get_org_key_row("encrypt").await?;
        Ok(EncryptionPair::from_cryptostrings(&public, &private)?)
    }

    async fn get_org_key_row(
        &self,
        purpose: &str,
    ) -> Result<(CryptoString, CryptoString), StoreError> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT pubkey, privkey FROM orgkeys WHERE purpose = ?")
                .bind(purpose)
                .fetch_optional(&self.pool)
                .await?;
        let (pubkey, privkey) = row.ok_or(StoreError::NotFound)?;
        Ok((
            pubkey.parse().map_err(StoreError::Crypto)?,
            privkey.parse().map_err(StoreError::Crypto)?,
        ))
    }

    // ── Preregistration ──────────────────────────────────────────────────────

    pub async fn add_prereg(
        &self,
        wid: &RandomID,
        uid: Option<&UserID>,
        domain: &Domain,
        regcode_hash: &str,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("INSERT OR IGNORE INTO prereg (wid, uid, domain, regcode) VALUES (?, ?, ?, ?)")
            .bind(wid.as_str())
            .bind(uid.map(|u| u.as_str()))
            .bind(domain.as_str())
            .bind(regcode_hash)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Exists);
        }
        Ok(())
    }

    /// Consume a preregistration code: verify and delete in one transaction.
    /// A redeemed code hands back the reserved slot; a wrong or already
    /// spent code yields `None`.
    pub async fn consume_prereg(
        &self,
        wid: &RandomID,
        regcode: &str,
    ) -> Result<Option<Prereg>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let row: Option<(String, Option<String>, String)> =
            sqlx::query_as("SELECT regcode, uid, domain FROM prereg WHERE wid = ?")
                .bind(wid.as_str())
                .fetch_optional(&mut *tx)
                .await?;
        let (stored, uid, domain) = match row {
            Some(r) => r,
            None => return Ok(None),
        };
        if !mg_crypto::password::verify_password(regcode, &stored)? {
            return Ok(None);
        }
        sqlx::query("DELETE FROM prereg WHERE wid = ?")
            .bind(wid.as_str())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(Some(Prereg {
            wid: wid.to_string(),
            uid,
            domain,
        }))
    }

    // ── Sync records ─────────────────────────────────────────────────────────

    /// Append a server-authored update record for `wid`.
    pub async fn add_update_record(
        &self,
        wid: &RandomID,
        update_type: UpdateType,
        data: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO updates (rid, wid, update_type, update_data, unixtime, devid)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(wid.as_str())
        .bind(update_type.as_str())
        .bind(data)
        .bind(Utc::now().timestamp())
        .bind(SERVER_DEVICE_ID)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_update_records(
        &self,
        wid: &RandomID,
    ) -> Result<Vec<crate::models::UpdateRecord>, StoreError> {
        Ok(sqlx::query_as(
            "SELECT rid, wid, update_type, update_data, unixtime, devid
             FROM updates WHERE wid = ? ORDER BY unixtime",
        )
        .bind(wid.as_str())
        .fetch_all(&self.pool)
        .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mg_crypto::password::hash_password;

    async fn open_test_store() -> (Store, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("test.db")).await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn workspace_roundtrip_and_uid_resolution() {
        let (store, _dir) = open_test_store().await;
        let wid = RandomID::generate();
        let uid: UserID = "csimons".parse().unwrap();
        let domain: Domain = "example.com".parse().unwrap();
        let pwhash = hash_password("hunter2hash").unwrap();

        store
            .add_workspace(&wid, Some(&uid), &domain, &pwhash, "individual")
            .await
            .unwrap();

        assert!(store.workspace_exists(&wid).await.unwrap());
        assert_eq!(store.resolve_uid(&uid, &domain).await.unwrap(), wid);
        assert!(store.check_password(&wid, "hunter2hash").await.unwrap());
        assert!(!store.check_password(&wid, "wrong").await.unwrap());

        // Double provisioning is an explicit Exists failure
        assert!(matches!(
            store
                .add_workspace(&wid, None, &domain, &pwhash, "individual")
                .await,
            Err(StoreError::Exists)
        ));
    }

    #[tokio::test]
    async fn keycard_chain_continuity_enforced() {
        let (store, _dir) = open_test_store().await;

        let spair = SigningPair::generate().unwrap();
        let epair = EncryptionPair::generate().unwrap();
        let mut entry = mg_keycard::Entry::new(mg_keycard::EntryType::Organization);
        let admin = format!("{}/example.com", RandomID::generate());
        entry
            .set_fields(&[
                ("Name", "Example"),
                ("Domain", "example.com"),
                ("Contact-Admin", &admin),
                ("Primary-Verification-Key", &spair.public_key().to_string()),
                ("Encryption-Key", &epair.public_key().to_string()),
            ])
            .unwrap();
        entry.hash(mg_crypto::hash::BLAKE3_PREFIX).unwrap();
        entry.sign("Organization-Signature", &spair).unwrap();

        store
            .add_keycard_entry("example.com", &entry.serialize())
            .await
            .unwrap();

        // Re-adding index 1 violates continuity
        assert!(matches!(
            store.add_keycard_entry("example.com", &entry.serialize()).await,
            Err(StoreError::ChainContinuity(_))
        ));

        let tip = store.get_current_entry("example.com").await.unwrap();
        assert_eq!(tip.idx, 1);
        let all = store.get_keycard_entries("example.com", 1).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn prereg_codes_are_single_use() {
        let (store, _dir) = open_test_store().await;
        let wid = RandomID::generate();
        let domain: Domain = "example.com".parse().unwrap();
        let code_hash = hash_password("Sample-Reg-Code").unwrap();

        let uid: UserID = "kevyn".parse().unwrap();
        store.add_prereg(&wid, Some(&uid), &domain, &code_hash).await.unwrap();
        assert!(store.consume_prereg(&wid, "wrong-code").await.unwrap().is_none());

        let slot = store
            .consume_prereg(&wid, "Sample-Reg-Code")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(slot.uid.as_deref(), Some("kevyn"));
        assert_eq!(slot.domain, "example.com");
        // Consumed: second redemption fails
        assert!(store
            .consume_prereg(&wid, "Sample-Reg-Code")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn org_keys_roundtrip() {
        let (store, _dir) = open_test_store().await;
        let spair = SigningPair::generate().unwrap();
        let epair = EncryptionPair::generate().unwrap();
        store.set_org_keys(&spair, &epair).await.unwrap();

        let loaded = store.get_org_signing_pair().await.unwrap();
        assert_eq!(loaded.public_key(), spair.public_key());
        let loaded = store.get_org_encryption_pair().await.unwrap();
        assert_eq!(loaded.public_key(), epair.public_key());
    }
}
