use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeycardError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Field not permitted for this entry type: {0}")]
    UnknownField(String),

    #[error("Bad value for field {field}: {reason}")]
    BadFieldValue { field: String, reason: String },

    #[error("Entry is not compliant: {0}")]
    NotCompliant(String),

    #[error("Entry has expired")]
    Expired,

    #[error("Keycard chain broken at entry {index}: {reason}")]
    BrokenChain { index: usize, reason: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error(transparent)]
    Crypto(#[from] mg_crypto::CryptoError),
}
