//! Shared server state, passed explicitly to sessions and workers.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Semaphore;

use mg_keycard::Domain;
use mg_resolver::{KCResolver, SystemDnsHandler};
use mg_store::{BlobStore, Store};

use crate::config::ServerConfig;
use crate::delivery::DeliveryQueue;
use crate::resolver::StoreCardSource;

pub struct ServerState {
    pub config: ServerConfig,
    pub domain: Domain,
    pub store: Store,
    pub blobs: BlobStore,
    /// Cached address and card lookups in front of the store.
    pub resolver: KCResolver,
    pub queue: DeliveryQueue,
    /// Advisory cap on concurrent delivery workers; a worker holds one
    /// permit for its whole drain loop.
    pub delivery_slots: Arc<Semaphore>,
}

impl ServerState {
    pub async fn init(config: ServerConfig) -> Result<Arc<Self>> {
        let domain: Domain = config.domain.parse()?;
        let store = Store::open(&config.db_path).await?;
        let blobs = BlobStore::new(&config.top_dir)?;
        let resolver = KCResolver::new(
            Arc::new(StoreCardSource::new(store.clone())),
            Arc::new(SystemDnsHandler::new()),
        );
        let slots = config.delivery_workers.max(1);
        Ok(Arc::new(Self {
            config,
            domain,
            store,
            blobs,
            resolver,
            queue: DeliveryQueue::new(),
            delivery_slots: Arc::new(Semaphore::new(slots)),
        }))
    }

    pub fn is_local_domain(&self, domain: &Domain) -> bool {
        *domain == self.domain
    }
}
