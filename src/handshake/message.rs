use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

use crate::error::HandshakeError;
use crate::info_hash::InfoHash;
use crate::peer_id::PeerId;

/// The BitTorrent protocol identifier.
pub const PROTOCOL: &[u8] = b"BitTorrent protocol";

/// The identifier with its length prefix, exactly as the first 20 wire
/// bytes of a plaintext handshake.
pub(crate) const PROTOCOL_HEADER: [u8; 20] = *b"\x13BitTorrent protocol";

/// Length of a full handshake message.
pub const HANDSHAKE_LEN: usize = 68;

/// Length of the handshake up to, not including, the peer id.
pub(crate) const HANDSHAKE_PREFIX_LEN: usize = 48;

/// Capability bits in the handshake's reserved field.
///
/// - Byte 5, bit 4: extension protocol (LTEP, [BEP-10])
/// - Byte 7, bit 0: DHT ([BEP-5])
/// - Byte 7, bit 2: fast extension ([BEP-6])
///
/// [BEP-5]: http://bittorrent.org/beps/bep_0005.html
/// [BEP-6]: http://bittorrent.org/beps/bep_0006.html
/// [BEP-10]: http://bittorrent.org/beps/bep_0010.html
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct Reserved([u8; 8]);

impl Reserved {
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    pub fn set_ltep(&mut self) {
        self.0[5] |= 0x10;
    }

    pub fn has_ltep(&self) -> bool {
        self.0[5] & 0x10 != 0
    }

    pub fn set_dht(&mut self) {
        self.0[7] |= 0x01;
    }

    pub fn has_dht(&self) -> bool {
        self.0[7] & 0x01 != 0
    }

    pub fn set_fast(&mut self) {
        self.0[7] |= 0x04;
    }

    pub fn has_fast(&self) -> bool {
        self.0[7] & 0x04 != 0
    }
}

impl fmt::Debug for Reserved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Reserved(ltep={}, dht={}, fast={})",
            self.has_ltep(),
            self.has_dht(),
            self.has_fast()
        )
    }
}

/// The 68-byte BEP-3 handshake message.
///
/// Layout: one length byte (19), `"BitTorrent protocol"`, 8 reserved
/// bytes, the 20-byte info hash, the 20-byte peer id. In MSE terms this
/// message is also the `IA` payload the initiator tucks into its final
/// key-exchange message.
#[derive(Debug, Clone)]
pub struct HandshakeMessage {
    pub info_hash: InfoHash,
    pub peer_id: PeerId,
    pub reserved: Reserved,
}

impl HandshakeMessage {
    /// Builds our handshake: LTEP and the fast extension always, DHT when
    /// the client participates.
    pub fn new(info_hash: InfoHash, peer_id: PeerId, enable_dht: bool) -> Self {
        let mut reserved = Reserved::default();
        reserved.set_ltep();
        reserved.set_fast();
        if enable_dht {
            reserved.set_dht();
        }
        Self {
            info_hash,
            peer_id,
            reserved,
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HANDSHAKE_LEN);
        buf.put_slice(&PROTOCOL_HEADER);
        buf.put_slice(self.reserved.as_bytes());
        buf.put_slice(self.info_hash.as_bytes());
        buf.put_slice(self.peer_id.as_bytes());
        buf.freeze()
    }

    pub fn decode(data: &[u8]) -> Result<Self, HandshakeError> {
        if data.len() < HANDSHAKE_LEN || data[..20] != PROTOCOL_HEADER {
            return Err(HandshakeError::EncryptionWrong);
        }

        let mut reserved = [0u8; 8];
        reserved.copy_from_slice(&data[20..28]);

        let mut info_hash = [0u8; 20];
        info_hash.copy_from_slice(&data[28..48]);

        let mut peer_id = [0u8; 20];
        peer_id.copy_from_slice(&data[48..68]);

        Ok(Self {
            info_hash: InfoHash::from_bytes(info_hash),
            peer_id: PeerId(peer_id),
            reserved: Reserved::from_bytes(reserved),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let msg = HandshakeMessage::new(
            InfoHash::from_bytes([0xAA; 20]),
            PeerId(*b"-BM0001-abcdefghijkl"),
            true,
        );
        let bytes = msg.encode();

        assert_eq!(bytes.len(), HANDSHAKE_LEN);
        assert_eq!(bytes[0], 19);
        assert_eq!(&bytes[1..20], PROTOCOL);
        assert_eq!(bytes[25] & 0x10, 0x10); // ltep
        assert_eq!(bytes[27] & 0x01, 0x01); // dht
        assert_eq!(bytes[27] & 0x04, 0x04); // fast
        assert_eq!(&bytes[28..48], &[0xAA; 20]);
        assert_eq!(&bytes[48..68], b"-BM0001-abcdefghijkl");
    }

    #[test]
    fn test_decode_round_trip() {
        let msg = HandshakeMessage::new(
            InfoHash::from_bytes([7; 20]),
            PeerId([9; 20]),
            false,
        );
        let decoded = HandshakeMessage::decode(&msg.encode()).unwrap();

        assert_eq!(decoded.info_hash, msg.info_hash);
        assert_eq!(decoded.peer_id, msg.peer_id);
        assert!(decoded.reserved.has_ltep());
        assert!(decoded.reserved.has_fast());
        assert!(!decoded.reserved.has_dht());
    }

    #[test]
    fn test_decode_rejects_wrong_header() {
        let mut bytes = HandshakeMessage::new(InfoHash::from_bytes([7; 20]), PeerId([9; 20]), false)
            .encode()
            .to_vec();
        bytes[1] = b'b';
        assert!(matches!(
            HandshakeMessage::decode(&bytes),
            Err(HandshakeError::EncryptionWrong)
        ));

        assert!(matches!(
            HandshakeMessage::decode(&bytes[..HANDSHAKE_LEN - 1]),
            Err(HandshakeError::EncryptionWrong)
        ));
    }

    #[test]
    fn test_reserved_bits_are_independent() {
        let mut reserved = Reserved::default();
        assert!(!reserved.has_ltep() && !reserved.has_dht() && !reserved.has_fast());

        reserved.set_dht();
        assert!(reserved.has_dht());
        assert!(!reserved.has_ltep());
        assert!(!reserved.has_fast());
    }
}
