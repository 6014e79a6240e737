//! Cryptographic primitives for the MSE handshake.
//!
//! Three pieces: a streaming SHA-1 helper (every MSE key and marker is a
//! SHA-1 over concatenated labels), Diffie-Hellman over the fixed 768-bit
//! MSE group, and the per-connection RC4 stream [`Filter`].

pub mod dh;
mod filter;

pub use dh::{DiffieHellman, SecretKey, SharedSecret};
pub use filter::Filter;

use sha1::{Digest, Sha1};

/// SHA-1 over the concatenation of `parts`.
///
/// ```
/// use btmse::crypto::digest;
///
/// let d = digest(&[b"req1", &[0u8; 96]]);
/// assert_eq!(d.len(), 20);
/// ```
pub fn digest(parts: &[&[u8]]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_concatenates() {
        // Splitting the input differently must not change the digest.
        assert_eq!(digest(&[b"req1", b"abc"]), digest(&[b"req1a", b"bc"]));
        assert_ne!(digest(&[b"req1"]), digest(&[b"req2"]));
    }

    #[test]
    fn test_digest_known_vector() {
        // SHA1("abc"), the FIPS 180-1 appendix A vector.
        assert_eq!(
            digest(&[b"abc"]).to_vec(),
            hex::decode("a9993e364706816aba3e25717850c26c9cd0d89d").unwrap()
        );
    }
}
