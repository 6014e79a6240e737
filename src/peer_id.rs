//! Client identity.

use rand::Rng as _;
use std::fmt;

const PEER_ID_PREFIX: &[u8] = b"-BM0001-";

/// A 20-byte peer id, the identity a client announces in its handshake.
///
/// The handshake only ever compares peer ids (for self-connect detection)
/// and hands them to the caller; parsing the client name out of one is a
/// different layer's job.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId(pub [u8; 20]);

impl PeerId {
    /// Generates a fresh Azureus-style id: dash-delimited client prefix,
    /// then random bytes.
    pub fn generate() -> Self {
        let mut id = [0u8; 20];
        id[..8].copy_from_slice(PEER_ID_PREFIX);
        rand::rng().fill(&mut id[8..]);
        Self(id)
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 20 {
            return None;
        }
        let mut id = [0u8; 20];
        id.copy_from_slice(bytes);
        Some(Self(id))
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId(")?;
        for byte in &self.0 {
            if byte.is_ascii_graphic() {
                write!(f, "{}", *byte as char)?;
            } else {
                write!(f, "\\x{:02x}", byte)?;
            }
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_unique_and_prefixed() {
        let a = PeerId::generate();
        let b = PeerId::generate();
        assert_ne!(a, b);
        assert_eq!(&a.0[..8], PEER_ID_PREFIX);
    }

    #[test]
    fn test_from_bytes_length_check() {
        assert!(PeerId::from_bytes(&[0u8; 20]).is_some());
        assert!(PeerId::from_bytes(&[0u8; 19]).is_none());
        assert!(PeerId::from_bytes(&[0u8; 21]).is_none());
    }
}
