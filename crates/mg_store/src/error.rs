use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Not found")]
    NotFound,

    #[error("Resource already exists")]
    Exists,

    #[error("Chain continuity violation: {0}")]
    ChainContinuity(String),

    #[error("Bad server path: {0}")]
    BadPath(String),

    #[error("Filesystem error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Crypto(#[from] mg_crypto::CryptoError),

    #[error(transparent)]
    Keycard(#[from] mg_keycard::KeycardError),
}
