//! Pluggable DNS lookups.
//!
//! The resolver layer only ever talks to a `DnsHandler`, so the system
//! resolver, a test fake, or a future DNSSEC-validating implementation are
//! interchangeable at construction time.

use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr};

use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::TokioAsyncResolver;
use parking_lot::Mutex;

use crate::error::DnsError;

/// One SRV answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrvRecord {
    pub priority: u16,
    pub port: u16,
    pub target: String,
}

#[async_trait]
pub trait DnsHandler: Send + Sync {
    async fn lookup_a(&self, name: &str) -> Result<Vec<Ipv4Addr>, DnsError>;
    async fn lookup_aaaa(&self, name: &str) -> Result<Vec<Ipv6Addr>, DnsError>;
    async fn lookup_txt(&self, name: &str) -> Result<Vec<String>, DnsError>;
    async fn lookup_srv(&self, name: &str) -> Result<Vec<SrvRecord>, DnsError>;
}

// ── System resolver ──────────────────────────────────────────────────────────

/// DNS over the host's configured resolver (hickory).
pub struct SystemDnsHandler {
    resolver: TokioAsyncResolver,
}

impl SystemDnsHandler {
    pub fn new() -> Self {
        Self {
            resolver: TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default()),
        }
    }
}

impl Default for SystemDnsHandler {
    fn default() -> Self {
        Self::new()
    }
}

fn map_error(e: hickory_resolver::error::ResolveError) -> DnsError {
    match e.kind() {
        ResolveErrorKind::NoRecordsFound { .. } => DnsError::NotFound,
        ResolveErrorKind::Timeout => DnsError::NoResponse,
        _ => DnsError::Misconfigured(e.to_string()),
    }
}

#[async_trait]
impl DnsHandler for SystemDnsHandler {
    async fn lookup_a(&self, name: &str) -> Result<Vec<Ipv4Addr>, DnsError> {
        let lookup = self.resolver.ipv4_lookup(name).await.map_err(map_error)?;
        let out: Vec<Ipv4Addr> = lookup.iter().map(|a| a.0).collect();
        if out.is_empty() {
            return Err(DnsError::Empty);
        }
        Ok(out)
    }

    async fn lookup_aaaa(&self, name: &str) -> Result<Vec<Ipv6Addr>, DnsError> {
        let lookup = self.resolver.ipv6_lookup(name).await.map_err(map_error)?;
        let out: Vec<Ipv6Addr> = lookup.iter().map(|a| a.0).collect();
        if out.is_empty() {
            return Err(DnsError::Empty);
        }
        Ok(out)
    }

    async fn lookup_txt(&self, name: &str) -> Result<Vec<String>, DnsError> {
        let lookup = self.resolver.txt_lookup(name).await.map_err(map_error)?;
        let out: Vec<String> = lookup
            .iter()
            .map(|txt| {
                txt.txt_data()
                    .iter()
                    .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .collect();
        if out.is_empty() {
            return Err(DnsError::Empty);
        }
        Ok(out)
    }

    async fn lookup_srv(&self, name: &str) -> Result<Vec<SrvRecord>, DnsError> {
        let lookup = self.resolver.srv_lookup(name).await.map_err(map_error)?;
        let mut out: Vec<SrvRecord> = lookup
            .iter()
            .map(|srv| SrvRecord {
                priority: srv.priority(),
                port: srv.port(),
                target: srv.target().to_utf8().trim_end_matches('.').to_string(),
            })
            .collect();
        if out.is_empty() {
            return Err(DnsError::Empty);
        }
        out.sort_by_key(|r| r.priority);
        Ok(out)
    }
}

// ── Test fake ────────────────────────────────────────────────────────────────

/// Scripted DNS answers for tests. Unscripted names answer NotFound.
#[derive(Default)]
pub struct FakeDnsHandler {
    a: Mutex<HashMap<String, Vec<Ipv4Addr>>>,
    aaaa: Mutex<HashMap<String, Vec<Ipv6Addr>>>,
    txt: Mutex<HashMap<String, Vec<String>>>,
    srv: Mutex<HashMap<String, Vec<SrvRecord>>>,
}

impl FakeDnsHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_a(&self, name: &str, addr: Ipv4Addr) {
        self.a.lock().entry(name.to_string()).or_default().push(addr);
    }

    pub fn add_aaaa(&self, name: &str, addr: Ipv6Addr) {
        self.aaaa.lock().entry(name.to_string()).or_default().push(addr);
    }

    pub fn add_txt(&self, name: &str, record: &str) {
        self.txt
            .lock()
            .entry(name.to_string())
            .or_default()
            .push(record.to_string());
    }

    pub fn add_srv(&self, name: &str, record: SrvRecord) {
        self.srv.lock().entry(name.to_string()).or_default().push(record);
    }
}

#[async_trait]
impl DnsHandler for FakeDnsHandler {
    async fn lookup_a(&self, name: &str) -> Result<Vec<Ipv4Addr>, DnsError> {
        self.a.lock().get(name).cloned().ok_or(DnsError::NotFound)
    }

    async fn lookup_aaaa(&self, name: &str) -> Result<Vec<Ipv6Addr>, DnsError> {
        self.aaaa.lock().get(name).cloned().ok_or(DnsError::NotFound)
    }

    async fn lookup_txt(&self, name: &str) -> Result<Vec<String>, DnsError> {
        self.txt.lock().get(name).cloned().ok_or(DnsError::NotFound)
    }

    async fn lookup_srv(&self, name: &str) -> Result<Vec<SrvRecord>, DnsError> {
        let mut out = self.srv.lock().get(name).cloned().ok_or(DnsError::NotFound)?;
        out.sort_by_key(|r| r.priority);
        Ok(out)
    }
}
