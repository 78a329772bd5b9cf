use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame payload too large: {0} bytes")]
    FrameTooLarge(usize),

    #[error("Invalid or unexpected frame type: {0}")]
    InvalidFrame(u8),

    #[error("Multipart size mismatch: declared {declared}, received {received}")]
    SizeMismatch { declared: usize, received: usize },

    #[error("Schema violation: {0}")]
    Schema(String),

    #[error("Bad message encoding: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Crypto(#[from] mg_crypto::CryptoError),

    #[error(transparent)]
    Keycard(#[from] mg_keycard::KeycardError),
}
