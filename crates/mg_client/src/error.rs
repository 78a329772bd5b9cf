use thiserror::Error;

/// Client-side failures, split so callers can tell a server refusal apart
/// from a local verification failure.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The server answered with an unexpected status code.
    #[error("server returned {0}: {1}")]
    Protocol(u16, String),

    /// A response was missing a field the exchange requires.
    #[error("missing response field: {0}")]
    MissingField(String),

    /// The server's answer failed local verification. Treat the session as
    /// hostile; nothing it sent should be trusted.
    #[error("server response failed verification: {0}")]
    Verification(String),

    #[error(transparent)]
    Proto(#[from] mg_proto::ProtoError),

    #[error(transparent)]
    Keycard(#[from] mg_keycard::KeycardError),

    #[error(transparent)]
    Crypto(#[from] mg_crypto::CryptoError),

    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
}
