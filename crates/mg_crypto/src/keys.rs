//! Key types: Ed25519 signing pairs, X25519 sealed-box encryption pairs,
//! and XChaCha20-Poly1305 secret keys.
//!
//! All public halves travel as CryptoStrings (`ED25519:...`,
//! `CURVE25519:...`, `XCHACHA20POLY1305:...`). Secret halves are held as raw
//! bytes and cleared on drop.
//!
//! # Sealed-box construction
//! Asymmetric encryption uses an ephemeral X25519 keypair per message:
//!
//!   shared = DH(ephemeral_secret, recipient_public)
//!   key    = HKDF-SHA256(salt = eph_pub || recipient_pub, ikm = shared)
//!   wire   = eph_pub (32) || nonce (24) || ciphertext+tag
//!
//! The recipient recovers `shared` from the embedded ephemeral public key.
//! Nobody without the recipient secret learns anything about the plaintext,
//! and the sender cannot decrypt their own output.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier as _, VerifyingKey};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use sha2::Sha256;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};
use zeroize::ZeroizeOnDrop;

use crate::aead;
use crate::cryptostring::CryptoString;
use crate::error::CryptoError;

pub const ED25519_PREFIX: &str = "ED25519";
pub const CURVE25519_PREFIX: &str = "CURVE25519";
pub const XCHACHA20POLY1305_PREFIX: &str = "XCHACHA20POLY1305";

const SEALED_BOX_INFO: &[u8] = b"mg-sealed-box-v1";
const SEALED_BOX_AAD: &[u8] = b"mg-sealed-box";

// ── Signing ──────────────────────────────────────────────────────────────────

/// Ed25519 public verification key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationKey {
    public: CryptoString,
}

impl VerificationKey {
    pub fn from_cryptostring(public: CryptoString) -> Result<Self, CryptoError> {
        if public.prefix() != ED25519_PREFIX {
            return Err(CryptoError::InvalidKey(format!(
                "expected {ED25519_PREFIX} key, got {}",
                public.prefix()
            )));
        }
        let _: [u8; 32] = public.to_array()?;
        Ok(Self { public })
    }

    pub fn as_cryptostring(&self) -> &CryptoString {
        &self.public
    }

    /// Verify `signature` over `data`. Ok(false) on a mismatched signature;
    /// errors are reserved for malformed key or signature material.
    pub fn verify(&self, data: &[u8], signature: &CryptoString) -> Result<bool, CryptoError> {
        if signature.prefix() != ED25519_PREFIX {
            return Err(CryptoError::InvalidKey(format!(
                "expected {ED25519_PREFIX} signature, got {}",
                signature.prefix()
            )));
        }
        let vk = VerifyingKey::from_bytes(&self.public.to_array()?)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let sig = Signature::from_bytes(&signature.to_array()?);
        Ok(vk.verify(data, &sig).is_ok())
    }
}

/// Ed25519 signing keypair. Drop clears the secret half.
#[derive(ZeroizeOnDrop)]
pub struct SigningPair {
    #[zeroize(skip)]
    public: CryptoString,
    secret: [u8; 32],
}

impl SigningPair {
    pub fn generate() -> Result<Self, CryptoError> {
        let signing_key = SigningKey::generate(&mut OsRng);
        let public =
            CryptoString::from_bytes(ED25519_PREFIX, signing_key.verifying_key().as_bytes())?;
        Ok(Self {
            public,
            secret: signing_key.to_bytes(),
        })
    }

    /// Rebuild from stored public/secret CryptoStrings.
    pub fn from_cryptostrings(
        public: &CryptoString,
        secret: &CryptoString,
    ) -> Result<Self, CryptoError> {
        if public.prefix() != ED25519_PREFIX || secret.prefix() != ED25519_PREFIX {
            return Err(CryptoError::InvalidKey("signing pair must be ED25519".into()));
        }
        let secret_bytes: [u8; 32] = secret.to_array()?;
        let derived = SigningKey::from_bytes(&secret_bytes).verifying_key();
        if derived.as_bytes() != public.as_bytes() {
            return Err(CryptoError::InvalidKey(
                "public key does not match secret key".into(),
            ));
        }
        Ok(Self {
            public: public.clone(),
            secret: secret_bytes,
        })
    }

    pub fn public_key(&self) -> &CryptoString {
        &self.public
    }

    /// Export the secret half for persistence.
    pub fn private_key(&self) -> Result<CryptoString, CryptoError> {
        CryptoString::from_bytes(ED25519_PREFIX, &self.secret)
    }

    pub fn verification_key(&self) -> Result<VerificationKey, CryptoError> {
        VerificationKey::from_cryptostring(self.public.clone())
    }

    /// Sign arbitrary bytes, returning a 64-byte Ed25519 signature.
    pub fn sign(&self, data: &[u8]) -> Result<CryptoString, CryptoError> {
        let sig = SigningKey::from_bytes(&self.secret).sign(data);
        CryptoString::from_bytes(ED25519_PREFIX, &sig.to_bytes())
    }
}

impl Clone for SigningPair {
    fn clone(&self) -> Self {
        Self {
            public: self.public.clone(),
            secret: self.secret,
        }
    }
}

impl std::fmt::Debug for SigningPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

// ── Asymmetric encryption ────────────────────────────────────────────────────

/// X25519 public encryption key. Anyone holding this can seal a message
/// that only the matching `EncryptionPair` can open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicEncryptionKey {
    public: CryptoString,
}

impl PublicEncryptionKey {
    pub fn from_cryptostring(public: CryptoString) -> Result<Self, CryptoError> {
        if public.prefix() != CURVE25519_PREFIX {
            return Err(CryptoError::InvalidKey(format!(
                "expected {CURVE25519_PREFIX} key, got {}",
                public.prefix()
            )));
        }
        let _: [u8; 32] = public.to_array()?;
        Ok(Self { public })
    }

    pub fn as_cryptostring(&self) -> &CryptoString {
        &self.public
    }

    /// Seal `plaintext` to this key.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<CryptoString, CryptoError> {
        let recipient = PublicKey::from(self.public.to_array::<32>()?);

        let eph_secret = EphemeralSecret::random_from_rng(OsRng);
        let eph_public = PublicKey::from(&eph_secret);
        let shared = eph_secret.diffie_hellman(&recipient);

        let key = derive_box_key(eph_public.as_bytes(), recipient.as_bytes(), shared.as_bytes())?;
        let ct = aead::encrypt(&key, plaintext, SEALED_BOX_AAD)?;

        let mut wire = Vec::with_capacity(32 + ct.len());
        wire.extend_from_slice(eph_public.as_bytes());
        wire.extend_from_slice(&ct);
        CryptoString::from_bytes(CURVE25519_PREFIX, &wire)
    }
}

/// X25519 encryption keypair. Drop clears the secret half.
#[derive(ZeroizeOnDrop)]
pub struct EncryptionPair {
    #[zeroize(skip)]
    public: CryptoString,
    secret: [u8; 32],
}

impl EncryptionPair {
    pub fn generate() -> Result<Self, CryptoError> {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = CryptoString::from_bytes(
            CURVE25519_PREFIX,
            PublicKey::from(&secret).as_bytes(),
        )?;
        Ok(Self {
            public,
            secret: secret.to_bytes(),
        })
    }

    pub fn from_cryptostrings(
        public: &CryptoString,
        secret: &CryptoString,
    ) -> Result<Self, CryptoError> {
        if public.prefix() != CURVE25519_PREFIX || secret.prefix() != CURVE25519_PREFIX {
            return Err(CryptoError::InvalidKey(
                "encryption pair must be CURVE25519".into(),
            ));
        }
        let secret_bytes: [u8; 32] = secret.to_array()?;
        let derived = PublicKey::from(&StaticSecret::from(secret_bytes));
        if derived.as_bytes() != public.as_bytes() {
            return Err(CryptoError::InvalidKey(
                "public key does not match secret key".into(),
            ));
        }
        Ok(Self {
            public: public.clone(),
            secret: secret_bytes,
        })
    }

    pub fn public_key(&self) -> &CryptoString {
        &self.public
    }

    pub fn private_key(&self) -> Result<CryptoString, CryptoError> {
        CryptoString::from_bytes(CURVE25519_PREFIX, &self.secret)
    }

    pub fn encryption_key(&self) -> Result<PublicEncryptionKey, CryptoError> {
        PublicEncryptionKey::from_cryptostring(self.public.clone())
    }

    /// Seal to this pair's own public key.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<CryptoString, CryptoError> {
        self.encryption_key()?.encrypt(plaintext)
    }

    /// Open a sealed box. A wrong key or tampered ciphertext yields
    /// `DecryptionFailure`; structurally broken input yields `BadFormat`.
    pub fn decrypt(&self, sealed: &CryptoString) -> Result<Vec<u8>, CryptoError> {
        if sealed.prefix() != CURVE25519_PREFIX {
            return Err(CryptoError::BadFormat(format!(
                "expected {CURVE25519_PREFIX} ciphertext, got {}",
                sealed.prefix()
            )));
        }
        let wire = sealed.as_bytes();
        // 32-byte ephemeral key + 24-byte nonce + 16-byte tag minimum
        if wire.len() < 32 + 24 + 16 {
            return Err(CryptoError::BadFormat("sealed box truncated".into()));
        }
        let (eph_bytes, ct) = wire.split_at(32);
        let eph_public = PublicKey::from(
            <[u8; 32]>::try_from(eph_bytes)
                .map_err(|_| CryptoError::BadFormat("bad ephemeral key".into()))?,
        );

        let secret = StaticSecret::from(self.secret);
        let my_public = PublicKey::from(&secret);
        let shared = secret.diffie_hellman(&eph_public);

        let key = derive_box_key(eph_public.as_bytes(), my_public.as_bytes(), shared.as_bytes())?;
        let pt = aead::decrypt(&key, ct, SEALED_BOX_AAD)?;
        Ok(pt.to_vec())
    }
}

impl Clone for EncryptionPair {
    fn clone(&self) -> Self {
        Self {
            public: self.public.clone(),
            secret: self.secret,
        }
    }
}

impl std::fmt::Debug for EncryptionPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

fn derive_box_key(
    eph_pub: &[u8; 32],
    recipient_pub: &[u8; 32],
    shared: &[u8],
) -> Result<[u8; 32], CryptoError> {
    let mut salt = [0u8; 64];
    salt[..32].copy_from_slice(eph_pub);
    salt[32..].copy_from_slice(recipient_pub);
    let hk = Hkdf::<Sha256>::new(Some(&salt), shared);
    let mut key = [0u8; 32];
    hk.expand(SEALED_BOX_INFO, &mut key)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(key)
}

// ── Symmetric encryption ─────────────────────────────────────────────────────

/// 32-byte XChaCha20-Poly1305 key, used for message payload encryption.
#[derive(ZeroizeOnDrop)]
pub struct SecretKey {
    key: [u8; 32],
}

impl SecretKey {
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        Self { key }
    }

    pub fn from_cryptostring(cs: &CryptoString) -> Result<Self, CryptoError> {
        if cs.prefix() != XCHACHA20POLY1305_PREFIX {
            return Err(CryptoError::InvalidKey(format!(
                "expected {XCHACHA20POLY1305_PREFIX} key, got {}",
                cs.prefix()
            )));
        }
        Ok(Self { key: cs.to_array()? })
    }

    pub fn as_cryptostring(&self) -> Result<CryptoString, CryptoError> {
        CryptoString::from_bytes(XCHACHA20POLY1305_PREFIX, &self.key)
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<CryptoString, CryptoError> {
        let ct = aead::encrypt(&self.key, plaintext, b"")?;
        CryptoString::from_bytes(XCHACHA20POLY1305_PREFIX, &ct)
    }

    /// Encrypt to raw bytes, for payload blobs that live outside a
    /// CryptoString header.
    pub fn encrypt_bytes(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        aead::encrypt(&self.key, plaintext, b"")
    }

    pub fn decrypt(&self, ciphertext: &CryptoString) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.prefix() != XCHACHA20POLY1305_PREFIX {
            return Err(CryptoError::BadFormat(format!(
                "expected {XCHACHA20POLY1305_PREFIX} ciphertext, got {}",
                ciphertext.prefix()
            )));
        }
        Ok(aead::decrypt(&self.key, ciphertext.as_bytes(), b"")?.to_vec())
    }

    pub fn decrypt_bytes(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Ok(aead::decrypt(&self.key, ciphertext, b"")?.to_vec())
    }
}

impl Clone for SecretKey {
    fn clone(&self) -> Self {
        Self { key: self.key }
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify() {
        let pair = SigningPair::generate().unwrap();
        let sig = pair.sign(b"entry contents").unwrap();
        let vk = pair.verification_key().unwrap();
        assert!(vk.verify(b"entry contents", &sig).unwrap());
        assert!(!vk.verify(b"tampered contents", &sig).unwrap());
    }

    #[test]
    fn verify_with_wrong_key_is_false_not_error() {
        let pair = SigningPair::generate().unwrap();
        let other = SigningPair::generate().unwrap();
        let sig = pair.sign(b"data").unwrap();
        assert!(!other.verification_key().unwrap().verify(b"data", &sig).unwrap());
    }

    #[test]
    fn sealed_box_roundtrip() {
        let pair = EncryptionPair::generate().unwrap();
        let sealed = pair.encryption_key().unwrap().encrypt(b"secret payload").unwrap();
        assert_eq!(pair.decrypt(&sealed).unwrap(), b"secret payload");
    }

    #[test]
    fn sealed_box_wrong_key_vs_corrupt() {
        let alice = EncryptionPair::generate().unwrap();
        let bob = EncryptionPair::generate().unwrap();
        let sealed = alice.encrypt(b"for alice").unwrap();

        // Wrong key: authentication failure
        assert!(matches!(
            bob.decrypt(&sealed),
            Err(CryptoError::DecryptionFailure)
        ));

        // Corrupt structure: format failure
        let truncated = CryptoString::from_bytes(CURVE25519_PREFIX, &[0u8; 10]).unwrap();
        assert!(matches!(
            alice.decrypt(&truncated),
            Err(CryptoError::BadFormat(_))
        ));
    }

    #[test]
    fn signing_pair_persistence_roundtrip() {
        let pair = SigningPair::generate().unwrap();
        let restored = SigningPair::from_cryptostrings(
            pair.public_key(),
            &pair.private_key().unwrap(),
        )
        .unwrap();
        let sig = restored.sign(b"x").unwrap();
        assert!(pair.verification_key().unwrap().verify(b"x", &sig).unwrap());
    }

    #[test]
    fn secret_key_roundtrip() {
        let key = SecretKey::generate();
        let ct = key.encrypt(b"message body").unwrap();
        assert_eq!(key.decrypt(&ct).unwrap(), b"message body");

        let restored = SecretKey::from_cryptostring(&key.as_cryptostring().unwrap()).unwrap();
        assert_eq!(restored.decrypt(&ct).unwrap(), b"message body");
    }
}
