//! mg_resolver — caches, DNS lookups, and keycard resolution
//!
//! Repeated keycard, service-record, and address lookups are expensive
//! round trips (DNS, network, database), so everything resolved here passes
//! through small bounded LRU caches. DNS itself sits behind a trait so
//! tests script their own answers and the server can swap resolvers.
//!
//! # Modules
//! - `cache`      — fixed-capacity thread-safe LRU store
//! - `dns`        — `DnsHandler` trait, system resolver, scripted fake
//! - `records`    — management record (TXT) and service record (SRV) parsing
//! - `kcresolver` — cached org/user card and address→WID resolution

pub mod cache;
pub mod dns;
pub mod error;
pub mod kcresolver;
pub mod records;

pub use cache::LruCache;
pub use dns::{DnsHandler, FakeDnsHandler, SrvRecord, SystemDnsHandler};
pub use error::{DnsError, ResolveError};
pub use kcresolver::{CardSource, KCResolver};
pub use records::{DnsMgmtRecord, ServiceConfig};
