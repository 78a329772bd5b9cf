//! BLAKE3 digests carried as CryptoStrings.

use sha2::{Digest, Sha256};

use crate::cryptostring::CryptoString;
use crate::error::CryptoError;

pub const BLAKE3_PREFIX: &str = "BLAKE3-256";
pub const SHA256_PREFIX: &str = "SHA-256";

/// Hash `data` with the default algorithm (BLAKE3, 256-bit).
pub fn hash(data: &[u8]) -> CryptoString {
    let digest = blake3::hash(data);
    // 32 nonempty bytes always form a valid CryptoString
    CryptoString::from_bytes(BLAKE3_PREFIX, digest.as_bytes())
        .unwrap_or_else(|_| unreachable!("BLAKE3 digest is always encodable"))
}

/// Hash `data` with the algorithm named by `prefix`.
pub fn hash_with(prefix: &str, data: &[u8]) -> Result<CryptoString, CryptoError> {
    match prefix {
        BLAKE3_PREFIX => Ok(hash(data)),
        SHA256_PREFIX => {
            let digest = Sha256::digest(data);
            CryptoString::from_bytes(SHA256_PREFIX, &digest)
        }
        other => Err(CryptoError::UnsupportedAlgorithm(other.to_string())),
    }
}

/// Recompute the digest of `data` with `expected`'s own algorithm and
/// compare in constant time. Returns false on mismatch, erroring only when
/// the algorithm is unknown.
pub fn check_hash(data: &[u8], expected: &CryptoString) -> Result<bool, CryptoError> {
    let computed = hash_with(expected.prefix(), data)?;
    Ok(constant_time_eq(computed.as_bytes(), expected.as_bytes()))
}

/// Constant-time comparison to prevent timing side channels.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_check() {
        let h = hash(b"keycard entry data");
        assert_eq!(h.prefix(), BLAKE3_PREFIX);
        assert!(check_hash(b"keycard entry data", &h).unwrap());
        assert!(!check_hash(b"tampered data", &h).unwrap());
    }

    #[test]
    fn sha256_supported() {
        let h = hash_with(SHA256_PREFIX, b"abc").unwrap();
        assert!(check_hash(b"abc", &h).unwrap());
    }

    #[test]
    fn unknown_algorithm_is_an_error() {
        let h = CryptoString::from_bytes("MD5", &[0u8; 16]).unwrap();
        assert!(matches!(
            check_hash(b"abc", &h),
            Err(CryptoError::UnsupportedAlgorithm(_))
        ));
    }
}
