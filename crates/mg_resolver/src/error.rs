use thiserror::Error;

/// Typed DNS lookup failures, one variant per distinguishable outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DnsError {
    #[error("no response from resolver")]
    NoResponse,

    #[error("domain not found")]
    NotFound,

    #[error("lookup returned no records")]
    Empty,

    #[error("misconfigured record: {0}")]
    Misconfigured(String),
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("DNS failure: {0}")]
    Dns(#[from] DnsError),

    #[error("not found")]
    NotFound,

    /// The card source itself failed (network, database).
    #[error("card source failure: {0}")]
    Source(String),

    #[error(transparent)]
    Keycard(#[from] mg_keycard::KeycardError),

    #[error(transparent)]
    Crypto(#[from] mg_crypto::CryptoError),
}
