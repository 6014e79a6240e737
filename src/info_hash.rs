//! Torrent identity.

use std::fmt;

use crate::crypto;

/// A 20-byte SHA-1 info hash identifying a torrent ([BEP-3]).
///
/// MSE keys every connection off the v1 info hash (it is the `SKEY` of the
/// key derivation), so this is the only identity the handshake deals in.
///
/// [BEP-3]: http://bittorrent.org/beps/bep_0003.html
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct InfoHash(pub [u8; 20]);

impl InfoHash {
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// An all-zero hash marks "no torrent"; it never appears on the wire
    /// from a well-formed peer.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// The obfuscated identifier `SHA1("req2", hash)` that an MSE
    /// initiator sends instead of the real hash, so a passive observer
    /// cannot match the connection to a public torrent.
    pub fn obfuscated(&self) -> InfoHash {
        InfoHash(crypto::digest(&[b"req2", &self.0]))
    }

    /// Lowercase hex, the form trackers and magnet links use.
    pub fn to_hex(&self) -> String {
        self.0
            .iter()
            .fold(String::with_capacity(40), |mut s, b| {
                use std::fmt::Write;
                let _ = write!(s, "{:02x}", b);
                s
            })
    }
}

impl fmt::Debug for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InfoHash({})", self.to_hex())
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_display() {
        let hash = InfoHash::from_bytes([0xAB; 20]);
        assert_eq!(hash.to_hex(), "ab".repeat(20));
    }

    #[test]
    fn test_zero_detection() {
        assert!(InfoHash::from_bytes([0; 20]).is_zero());
        assert!(!InfoHash::from_bytes([1; 20]).is_zero());
    }

    #[test]
    fn test_obfuscated_is_req2_digest() {
        let hash = InfoHash::from_bytes([0x11; 20]);
        let expected = crypto::digest(&[b"req2", hash.as_bytes()]);
        assert_eq!(hash.obfuscated().as_bytes(), &expected);
        assert_ne!(hash.obfuscated(), hash);
    }
}
