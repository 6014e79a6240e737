//! Framed wire buffer.
//!
//! A thin frame over [`BytesMut`] with the access patterns the handshake
//! parser needs: prefix peeks for resynchronisation scans, typed
//! big-endian reads, and byte-exact drains. The buffer always holds raw
//! wire bytes; decryption happens as bytes leave it, never in place.

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// An append/drain byte buffer framing one direction of a connection.
#[derive(Default)]
pub struct Buffer {
    buf: BytesMut,
}

impl Buffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Whether the buffered bytes begin with `prefix`, without consuming.
    pub fn starts_with(&self, prefix: &[u8]) -> bool {
        self.buf.len() >= prefix.len() && &self.buf[..prefix.len()] == prefix
    }

    pub fn append(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn append_u16(&mut self, value: u16) {
        self.buf.put_u16(value);
    }

    pub fn append_u32(&mut self, value: u32) {
        self.buf.put_u32(value);
    }

    /// Discards the first `n` buffered bytes.
    ///
    /// # Panics
    ///
    /// Panics if fewer than `n` bytes are buffered; callers check
    /// [`len`](Self::len) first.
    pub fn drain(&mut self, n: usize) {
        self.buf.advance(n);
    }

    /// Moves exactly `out.len()` bytes out of the buffer.
    ///
    /// # Panics
    ///
    /// Panics if the buffer is shorter than `out`.
    pub fn read_exact(&mut self, out: &mut [u8]) {
        self.buf.copy_to_slice(out);
    }

    /// Reads a big-endian u16.
    ///
    /// # Panics
    ///
    /// Panics if fewer than two bytes are buffered.
    pub fn read_u16(&mut self) -> u16 {
        self.buf.get_u16()
    }

    /// Reads a big-endian u32.
    ///
    /// # Panics
    ///
    /// Panics if fewer than four bytes are buffered.
    pub fn read_u32(&mut self) -> u32 {
        self.buf.get_u32()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Takes everything buffered, leaving the buffer empty.
    pub fn take(&mut self) -> Bytes {
        self.buf.split().freeze()
    }

    /// The underlying storage, for filling straight from a socket.
    pub(crate) fn bytes_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_round_trip() {
        let mut buf = Buffer::new();
        buf.append_u32(0xDEAD_BEEF);
        buf.append_u16(512);
        buf.append(b"pad");

        assert_eq!(buf.len(), 9);
        assert_eq!(buf.read_u32(), 0xDEAD_BEEF);
        assert_eq!(buf.read_u16(), 512);

        let mut tail = [0u8; 3];
        buf.read_exact(&mut tail);
        assert_eq!(&tail, b"pad");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_big_endian_layout() {
        let mut buf = Buffer::new();
        buf.append_u16(0x0102);
        assert_eq!(buf.as_slice(), &[0x01, 0x02]);
    }

    #[test]
    fn test_starts_with_and_drain() {
        let mut buf = Buffer::new();
        buf.append(b"xyzBitTorrent");

        assert!(buf.starts_with(b"xyz"));
        assert!(!buf.starts_with(b"Bit"));
        assert!(!buf.starts_with(b"xyzBitTorrent protocol"));

        buf.drain(3);
        assert!(buf.starts_with(b"Bit"));
        assert_eq!(buf.len(), 10);
    }

    #[test]
    fn test_take_empties() {
        let mut buf = Buffer::new();
        buf.append(b"abc");
        let taken = buf.take();
        assert_eq!(&taken[..], b"abc");
        assert!(buf.is_empty());
    }
}
