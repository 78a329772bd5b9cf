//! mg_crypto — Mensago cryptographic primitives
//!
//! # Design principles
//! - NO custom crypto; all primitives come from audited Rust crates.
//! - Zeroize all secret material on drop.
//! - Everything on the wire is a self-describing `CryptoString`
//!   (`ALGORITHM:base85-payload`), so keys, hashes, and signatures can be
//!   stored and compared without out-of-band type information.
//!
//! # Module layout
//! - `cryptostring` — the tagged string format itself
//! - `keys`         — Ed25519 signing pairs, X25519 sealed-box encryption
//!                    pairs, XChaCha20-Poly1305 secret keys
//! - `aead`         — XChaCha20-Poly1305 encrypt/decrypt helpers
//! - `hash`         — BLAKE3 digests as CryptoStrings
//! - `password`     — Argon2id password hashing for account login
//! - `error`        — unified error type

pub mod aead;
pub mod cryptostring;
pub mod error;
pub mod hash;
pub mod keys;
pub mod password;

pub use cryptostring::CryptoString;
pub use error::CryptoError;
pub use keys::{EncryptionPair, PublicEncryptionKey, SecretKey, SigningPair, VerificationKey};
