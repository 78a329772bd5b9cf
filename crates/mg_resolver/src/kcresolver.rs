//! Cached keycard and address resolution.
//!
//! `KCResolver` answers the questions every client and the delivery path
//! keep asking: what is this org's current key, what is this user's keycard,
//! which workspace does an address map to, and where is the domain's server.
//! Each answer is cached; keycards stay cached no longer than the number of
//! days their current entry's Time-To-Live field allows.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::debug;

use mg_crypto::VerificationKey;
use mg_keycard::{Domain, Entry, Keycard, MAddress, RandomID, UserID};

use crate::cache::LruCache;
use crate::dns::DnsHandler;
use crate::error::ResolveError;
use crate::records::{DnsMgmtRecord, ServiceConfig};

/// Where keycard data comes from. The server backs this with its database,
/// the client with a server connection.
#[async_trait]
pub trait CardSource: Send + Sync {
    /// Fetches the entries for an owner (`example.com` for an org card or
    /// `wid/domain` for a user card), starting at `start_index`. An index of
    /// zero means the whole card.
    async fn fetch_card(&self, owner: &str, start_index: u32) -> Result<Vec<Entry>, ResolveError>;

    /// Maps a user ID on a domain to its workspace ID.
    async fn fetch_wid(&self, uid: &UserID, domain: &Domain) -> Result<RandomID, ResolveError>;
}

struct Cached<V> {
    value: V,
    deadline: Instant,
}

impl<V: Clone> Clone for Cached<V> {
    fn clone(&self) -> Self {
        Self { value: self.value.clone(), deadline: self.deadline }
    }
}

/// Default per-cache capacity. Tens of distinct correspondents is typical.
const CACHE_CAPACITY: usize = 32;

/// DNS-derived answers age out after an hour regardless of hit rate.
const DNS_CACHE_LIFETIME: Duration = Duration::from_secs(3600);

pub struct KCResolver {
    source: Arc<dyn CardSource>,
    dns: Arc<dyn DnsHandler>,
    entries: LruCache<String, Cached<Entry>>,
    cards: LruCache<String, Cached<Keycard>>,
    mgmt: LruCache<Domain, Cached<DnsMgmtRecord>>,
    services: LruCache<Domain, Cached<Vec<ServiceConfig>>>,
    wids: LruCache<MAddress, RandomID>,
}

impl KCResolver {
    pub fn new(source: Arc<dyn CardSource>, dns: Arc<dyn DnsHandler>) -> Self {
        Self {
            source,
            dns,
            entries: LruCache::new(CACHE_CAPACITY),
            cards: LruCache::new(CACHE_CAPACITY),
            mgmt: LruCache::new(CACHE_CAPACITY),
            services: LruCache::new(CACHE_CAPACITY),
            wids: LruCache::new(CACHE_CAPACITY),
        }
    }

    /// Resolves just the current entry for `owner` when the caller does
    /// not need the whole chain. Backed by its own cache since single
    /// entries are requested far more often than full cards.
    pub async fn get_current_entry(&self, owner: &str) -> Result<Entry, ResolveError> {
        if let Some(hit) = self.entries.get(&owner.to_string()) {
            let fresh = !hit.value.is_expired().unwrap_or(true);
            if Instant::now() < hit.deadline && fresh {
                return Ok(hit.value);
            }
        }

        let card = self.get_card(owner).await?;
        let entry = card.current().cloned().ok_or(ResolveError::NotFound)?;
        let deadline = Instant::now() + card_lifetime(&card);
        self.entries
            .put(owner.to_string(), Cached { value: entry.clone(), deadline });
        Ok(entry)
    }

    /// Resolves a verified keycard for `owner`, from cache when fresh.
    ///
    /// The returned card has passed full chain verification. A cached card
    /// is reused until its Time-To-Live lapses or its current entry passes
    /// its Expires date.
    pub async fn get_card(&self, owner: &str) -> Result<Keycard, ResolveError> {
        self.get_card_boxed(owner).await
    }

    // get_card recurses through check_org_countersignatures for user cards;
    // box through dyn to keep the future type finite and break the Send
    // auto-trait cycle.
    fn get_card_boxed<'a>(
        &'a self,
        owner: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Keycard, ResolveError>> + Send + 'a>> {
        Box::pin(async move {
        if let Some(hit) = self.cards.get(&owner.to_string()) {
            let current_ok = match hit.value.current() {
                Some(entry) => !entry.is_expired().unwrap_or(true),
                None => false,
            };
            if Instant::now() < hit.deadline && current_ok {
                return Ok(hit.value);
            }
        }

        debug!(owner, "fetching keycard");
        let entries = self.source.fetch_card(owner, 0).await?;
        if entries.is_empty() {
            return Err(ResolveError::NotFound);
        }
        let card = Keycard::from_entries(entries);
        card.verify_chain()?;
        if let Some((_, domain)) = owner.split_once('/') {
            self.check_org_countersignatures(&card, domain).await?;
        }

        let deadline = Instant::now() + card_lifetime(&card);
        self.cards
            .put(owner.to_string(), Cached { value: card.clone(), deadline });
        Ok(card)
        })
    }

    /// User cards carry the hosting org's countersignature on every entry.
    /// Check them against the org's own verified card, falling back to the
    /// republished secondary key for entries countersigned just before a
    /// rotation.
    async fn check_org_countersignatures(
        &self,
        card: &Keycard,
        domain: &str,
    ) -> Result<(), ResolveError> {
        let org_card = self.get_card_boxed(domain).await?;
        let org_entry = org_card.current().ok_or(ResolveError::NotFound)?;

        let primary = org_entry.verification_key()?;
        let primary_err = match card.verify_org_signatures(&primary) {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        if let Some(raw) = org_entry.get_field("Secondary-Verification-Key") {
            let secondary = VerificationKey::from_cryptostring(raw.parse()?)?;
            card.verify_org_signatures(&secondary)?;
            return Ok(());
        }
        Err(primary_err.into())
    }

    /// Resolves any Mensago address down to a workspace ID.
    ///
    /// Workspace addresses already carry their WID; user addresses go
    /// through the card source once and are cached forever after, since a
    /// workspace ID never changes for the life of the account.
    pub async fn resolve_address(&self, addr: &MAddress) -> Result<RandomID, ResolveError> {
        match addr {
            MAddress::Workspace(w) => Ok(w.wid.clone()),
            MAddress::User { uid, domain } => {
                if let Some(wid) = self.wids.get(addr) {
                    return Ok(wid);
                }
                let wid = self.source.fetch_wid(uid, domain).await?;
                self.wids.put(addr.clone(), wid.clone());
                Ok(wid)
            }
        }
    }

    /// The org's DNS management record, cached for up to an hour.
    pub async fn get_mgmt_record(&self, domain: &Domain) -> Result<DnsMgmtRecord, ResolveError> {
        if let Some(hit) = self.mgmt.get(domain) {
            if Instant::now() < hit.deadline {
                return Ok(hit.value);
            }
        }
        let record = DnsMgmtRecord::fetch(self.dns.as_ref(), domain).await?;
        self.mgmt.put(
            domain.clone(),
            Cached { value: record.clone(), deadline: Instant::now() + DNS_CACHE_LIFETIME },
        );
        Ok(record)
    }

    /// The server list for a domain, cached for up to an hour.
    pub async fn get_service_config(
        &self,
        domain: &Domain,
    ) -> Result<Vec<ServiceConfig>, ResolveError> {
        if let Some(hit) = self.services.get(domain) {
            if Instant::now() < hit.deadline {
                return Ok(hit.value);
            }
        }
        let configs = ServiceConfig::fetch(self.dns.as_ref(), domain).await?;
        self.services.put(
            domain.clone(),
            Cached { value: configs.clone(), deadline: Instant::now() + DNS_CACHE_LIFETIME },
        );
        Ok(configs)
    }
}

/// How long a verified card may be served from cache, per its current
/// entry's Time-To-Live field (days, clamped to 1..=30).
fn card_lifetime(card: &Keycard) -> Duration {
    let days = card
        .current()
        .and_then(|e| e.get_field("Time-To-Live"))
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(1)
        .clamp(1, 30);
    Duration::from_secs(days * 86400)
}
