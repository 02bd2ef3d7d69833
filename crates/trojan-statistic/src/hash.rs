//! Identity hash derivation.

use sha2::{Digest, Sha224};

/// Derive the identity hash of a password: lowercase hex of its SHA-224.
///
/// The accounting core treats identity hashes as opaque keys; this is only
/// used by configuration and administrative tooling to turn passwords into
/// the hashes a client presents.
///
/// # Example
/// ```
/// use trojan_statistic::sha224_hex;
///
/// assert_eq!(
///     sha224_hex(""),
///     "d14a028c2a3a2bc9476102bb288234c415a2b01f828ea62ac5b3e42f"
/// );
/// ```
#[inline]
pub fn sha224_hex(password: &str) -> String {
    hex::encode(Sha224::digest(password.as_bytes()))
}

/// Whether `hash` is the identity hash of `password`.
#[inline]
pub fn verify_password(password: &str, hash: &str) -> bool {
    sha224_hex(password).eq_ignore_ascii_case(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vector() {
        assert_eq!(
            sha224_hex("abc"),
            "23097d223405d8228642a477bda255b32aadbce4bda0b3f7e36c9da7"
        );
    }

    #[test]
    fn test_hash_shape() {
        let hash = sha224_hex("password");
        assert_eq!(hash.len(), 56);
        assert!(hash.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')));
    }

    #[test]
    fn test_verify_password() {
        let hash = sha224_hex("test123");
        assert!(verify_password("test123", &hash));
        assert!(verify_password("test123", &hash.to_uppercase()));
        assert!(!verify_password("wrong", &hash));
    }
}
