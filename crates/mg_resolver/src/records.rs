//! DNS-published org records.
//!
//! Organizations publish two things in DNS: a management record (TXT at
//! `mensago.<domain>`) carrying the org's current keys, and service records
//! (SRV at `_mensago._tcp.<domain>`) naming the servers for the domain.

use mg_crypto::CryptoString;
use mg_keycard::Domain;

use crate::dns::DnsHandler;
use crate::error::DnsError;

/// Default Mensago service port, used when no SRV record exists.
pub const DEFAULT_PORT: u16 = 2001;

/// The org's DNS management record.
///
/// Published as TXT strings of `key=value` pairs. `pvk` and `ek` are
/// required; `svk` appears only during key rotation and `tls` only when the
/// org pins its certificate hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsMgmtRecord {
    pub pvk: CryptoString,
    pub svk: Option<CryptoString>,
    pub ek: CryptoString,
    pub tls: Option<CryptoString>,
}

impl DnsMgmtRecord {
    /// Parses a record out of the TXT strings returned for `mensago.<domain>`.
    ///
    /// Pairs may be spread across multiple TXT records. Unknown keys are
    /// ignored so the format can grow.
    pub fn parse(txt_records: &[String]) -> Result<Self, DnsError> {
        let mut pvk = None;
        let mut svk = None;
        let mut ek = None;
        let mut tls = None;

        for record in txt_records {
            for pair in record.split_whitespace() {
                let Some((key, value)) = pair.split_once('=') else {
                    continue;
                };
                let parse_cs = |field: &str| -> Result<CryptoString, DnsError> {
                    value.parse().map_err(|_| {
                        DnsError::Misconfigured(format!("bad {field} value in management record"))
                    })
                };
                match key {
                    "pvk" => pvk = Some(parse_cs("pvk")?),
                    "svk" => svk = Some(parse_cs("svk")?),
                    "ek" => ek = Some(parse_cs("ek")?),
                    "tls" => tls = Some(parse_cs("tls")?),
                    _ => {}
                }
            }
        }

        let pvk: CryptoString =
            pvk.ok_or_else(|| DnsError::Misconfigured("management record missing pvk".into()))?;
        let ek: CryptoString =
            ek.ok_or_else(|| DnsError::Misconfigured("management record missing ek".into()))?;

        if pvk.prefix() != "ED25519" {
            return Err(DnsError::Misconfigured("pvk must be an ED25519 key".into()));
        }
        if let Some(ref k) = svk {
            if k.prefix() != "ED25519" {
                return Err(DnsError::Misconfigured("svk must be an ED25519 key".into()));
            }
        }
        if ek.prefix() != "CURVE25519" {
            return Err(DnsError::Misconfigured("ek must be a CURVE25519 key".into()));
        }

        Ok(Self { pvk, svk, ek, tls })
    }

    /// Looks up and parses the management record for `domain`.
    pub async fn fetch(dns: &dyn DnsHandler, domain: &Domain) -> Result<Self, DnsError> {
        let txt = dns.lookup_txt(&format!("mensago.{domain}")).await?;
        Self::parse(&txt)
    }
}

/// Where to reach a domain's Mensago service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub server: String,
    pub port: u16,
    pub priority: u16,
}

impl ServiceConfig {
    /// Resolves the server list for a domain.
    ///
    /// SRV records at `_mensago._tcp.<domain>` win. Without them the
    /// fallback is a host named `mensago.<domain>`, then the bare domain,
    /// both on the default port.
    pub async fn fetch(dns: &dyn DnsHandler, domain: &Domain) -> Result<Vec<Self>, DnsError> {
        match dns.lookup_srv(&format!("_mensago._tcp.{domain}")).await {
            Ok(records) => {
                return Ok(records
                    .into_iter()
                    .map(|r| Self { server: r.target, port: r.port, priority: r.priority })
                    .collect());
            }
            Err(DnsError::NotFound) | Err(DnsError::Empty) => {}
            Err(e) => return Err(e),
        }

        let fallback = format!("mensago.{domain}");
        if dns.lookup_a(&fallback).await.is_ok() || dns.lookup_aaaa(&fallback).await.is_ok() {
            return Ok(vec![Self { server: fallback, port: DEFAULT_PORT, priority: 0 }]);
        }

        let bare = domain.to_string();
        if dns.lookup_a(&bare).await.is_ok() || dns.lookup_aaaa(&bare).await.is_ok() {
            return Ok(vec![Self { server: bare, port: DEFAULT_PORT, priority: 0 }]);
        }

        Err(DnsError::NotFound)
    }
}
