//! Store-backed card source for the resolver layer.
//!
//! The server answers address and card lookups out of its own database;
//! wrapping the store in a `CardSource` lets the shared `KCResolver` cache
//! sit in front of it, so hot lookups skip the database entirely.

use async_trait::async_trait;

use mg_keycard::{Domain, Entry, RandomID, UserID};
use mg_resolver::{CardSource, ResolveError};
use mg_store::{Store, StoreError};

pub struct StoreCardSource {
    store: Store,
}

impl StoreCardSource {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

fn map_store_error(e: StoreError) -> ResolveError {
    match e {
        StoreError::NotFound => ResolveError::NotFound,
        other => ResolveError::Source(other.to_string()),
    }
}

#[async_trait]
impl CardSource for StoreCardSource {
    async fn fetch_card(&self, owner: &str, start_index: u32) -> Result<Vec<Entry>, ResolveError> {
        let rows = self
            .store
            .get_keycard_entries(owner, start_index.max(1))
            .await
            .map_err(map_store_error)?;
        rows.iter()
            .map(|row| Entry::from_text(&row.entry).map_err(ResolveError::Keycard))
            .collect()
    }

    async fn fetch_wid(&self, uid: &UserID, domain: &Domain) -> Result<RandomID, ResolveError> {
        self.store
            .resolve_uid(uid, domain)
            .await
            .map_err(map_store_error)
    }
}
