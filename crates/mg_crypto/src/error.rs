use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Bad CryptoString format: {0}")]
    BadFormat(String),

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("Signature verification failed")]
    SignatureVerification,

    #[error("Encryption failed")]
    EncryptionFailure,

    #[error("Decryption failed (authentication tag mismatch — wrong key or tampering)")]
    DecryptionFailure,

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Password hashing failed: {0}")]
    PasswordHash(String),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),
}
