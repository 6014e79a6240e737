//! Peer IO adaptor.
//!
//! [`PeerIo`] owns one connection to one peer: the stream, the buffered
//! bytes in each direction, the RC4 [`Filter`], and the capability flags
//! the handshake negotiates. The state machine drives it through a sync
//! surface (buffer reads and writes); only the session driver touches the
//! async surface ([`fill`](PeerIo::fill), [`flush`](PeerIo::flush),
//! [`reconnect`](PeerIo::reconnect)).

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::buffer::Buffer;
use crate::crypto::{Filter, SharedSecret};
use crate::info_hash::InfoHash;

/// Anything a peer connection can run over: TCP, µTP, or an in-memory
/// pipe in tests.
pub trait PeerStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> PeerStream for T {}

/// The transport a stream runs over; the retry policy treats them
/// differently.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportKind {
    Tcp,
    Utp,
}

/// Future returned by [`Dialer::dial`].
pub type DialFuture<'a> = Pin<Box<dyn Future<Output = io::Result<Box<dyn PeerStream>>> + Send + 'a>>;

/// Opens a replacement stream for [`PeerIo::reconnect`].
///
/// Outgoing connections carry one so the µTP-to-TCP and
/// encrypted-to-plaintext recoveries can redial the peer.
pub trait Dialer: Send {
    fn dial(&mut self, addr: SocketAddr) -> DialFuture<'_>;
}

/// Dials a plain TCP connection to the peer's address.
pub struct TcpDialer;

impl Dialer for TcpDialer {
    fn dial(&mut self, addr: SocketAddr) -> DialFuture<'_> {
        Box::pin(async move {
            let stream = TcpStream::connect(addr).await?;
            Ok(Box::new(stream) as Box<dyn PeerStream>)
        })
    }
}

/// One buffered, optionally RC4-transformed connection to a peer.
///
/// Cipher semantics: once a direction is keyed, bytes are transformed as
/// they cross the buffer boundary, writes when queued and reads when
/// drained. Bytes already buffered when a cipher is installed are *not*
/// transformed retroactively; the handshake drains any plaintext first
/// and relies on raw-byte prefix scans before keying the read side.
pub struct PeerIo {
    stream: Box<dyn PeerStream>,
    kind: TransportKind,
    addr: SocketAddr,
    incoming: bool,
    torrent_hash: Option<InfoHash>,
    inbuf: Buffer,
    outbuf: Buffer,
    filter: Filter,
    dialer: Option<Box<dyn Dialer>>,
    dht_enabled: bool,
    ltep_enabled: bool,
    fast_enabled: bool,
}

impl PeerIo {
    /// Wraps a stream we opened to `addr` for `info_hash`. Reconnects
    /// redial over plain TCP.
    pub fn outgoing(
        stream: Box<dyn PeerStream>,
        kind: TransportKind,
        addr: SocketAddr,
        info_hash: InfoHash,
    ) -> Self {
        Self::outgoing_with_dialer(stream, kind, addr, info_hash, Box::new(TcpDialer))
    }

    /// Like [`outgoing`](Self::outgoing) with a custom dialer for the
    /// reconnect path.
    pub fn outgoing_with_dialer(
        stream: Box<dyn PeerStream>,
        kind: TransportKind,
        addr: SocketAddr,
        info_hash: InfoHash,
        dialer: Box<dyn Dialer>,
    ) -> Self {
        Self::new(stream, kind, addr, false, Some(info_hash), Some(dialer))
    }

    /// Wraps a stream a remote peer opened to us. The torrent is unknown
    /// until the handshake discovers it.
    pub fn incoming(stream: Box<dyn PeerStream>, kind: TransportKind, addr: SocketAddr) -> Self {
        Self::new(stream, kind, addr, true, None, None)
    }

    fn new(
        stream: Box<dyn PeerStream>,
        kind: TransportKind,
        addr: SocketAddr,
        incoming: bool,
        torrent_hash: Option<InfoHash>,
        dialer: Option<Box<dyn Dialer>>,
    ) -> Self {
        Self {
            stream,
            kind,
            addr,
            incoming,
            torrent_hash,
            inbuf: Buffer::with_capacity(4 * 1024),
            outbuf: Buffer::with_capacity(4 * 1024),
            filter: Filter::new(),
            dialer,
            dht_enabled: false,
            ltep_enabled: false,
            fast_enabled: false,
        }
    }

    pub fn is_incoming(&self) -> bool {
        self.incoming
    }

    pub fn is_utp(&self) -> bool {
        self.kind == TransportKind::Utp
    }

    pub fn address(&self) -> SocketAddr {
        self.addr
    }

    pub fn torrent_hash(&self) -> Option<&InfoHash> {
        self.torrent_hash.as_ref()
    }

    pub fn set_torrent_hash(&mut self, info_hash: InfoHash) {
        self.torrent_hash = Some(info_hash);
    }

    // ------------------------------------------------------------------
    // Read side
    // ------------------------------------------------------------------

    pub fn read_buffer_len(&self) -> usize {
        self.inbuf.len()
    }

    /// Peeks at the *raw* buffered bytes, ciphertext included if the peer
    /// is encrypting. This is what the resynchronisation scans compare
    /// against.
    pub fn read_buffer_starts_with(&self, prefix: &[u8]) -> bool {
        self.inbuf.starts_with(prefix)
    }

    /// Pops `out.len()` bytes, decrypting them in flight once the read
    /// cipher is keyed.
    ///
    /// # Panics
    ///
    /// Panics if fewer bytes are buffered; callers gate on
    /// [`read_buffer_len`](Self::read_buffer_len).
    pub fn read_bytes(&mut self, out: &mut [u8]) {
        self.inbuf.read_exact(out);
        self.filter.decrypt(out);
    }

    /// Reads a big-endian u16 through the cipher.
    pub fn read_u16(&mut self) -> u16 {
        let mut bytes = [0u8; 2];
        self.read_bytes(&mut bytes);
        u16::from_be_bytes(bytes)
    }

    /// Reads a big-endian u32 through the cipher.
    pub fn read_u32(&mut self) -> u32 {
        let mut bytes = [0u8; 4];
        self.read_bytes(&mut bytes);
        u32::from_be_bytes(bytes)
    }

    /// Discards `n` buffered bytes. Discarded ciphertext still runs
    /// through the read cipher so its keystream position stays aligned
    /// with the peer's.
    pub fn read_buffer_drain(&mut self, n: usize) {
        if !self.filter.is_decrypt_active() {
            self.inbuf.drain(n);
            return;
        }
        let mut scratch = [0u8; 128];
        let mut left = n;
        while left > 0 {
            let take = left.min(scratch.len());
            self.read_bytes(&mut scratch[..take]);
            left -= take;
        }
    }

    // ------------------------------------------------------------------
    // Write side
    // ------------------------------------------------------------------

    /// Queues bytes for transmission, encrypting in flight once the write
    /// cipher is keyed. Nothing hits the wire until
    /// [`flush`](Self::flush).
    pub fn write(&mut self, bytes: &[u8]) {
        if self.filter.is_encrypt_active() {
            let mut owned = bytes.to_vec();
            self.filter.encrypt(&mut owned);
            self.outbuf.append(&owned);
        } else {
            self.outbuf.append(bytes);
        }
    }

    // ------------------------------------------------------------------
    // Cipher control
    // ------------------------------------------------------------------

    /// Keys the write cipher. Everything written afterwards is RC4;
    /// already-queued bytes are untouched.
    pub fn encrypt_init(&mut self, is_incoming: bool, secret: &SharedSecret, info_hash: &InfoHash) {
        self.filter.encrypt_init(is_incoming, secret, info_hash);
    }

    /// Keys the read cipher for everything drained from now on.
    pub fn decrypt_init(&mut self, is_incoming: bool, secret: &SharedSecret, info_hash: &InfoHash) {
        self.filter.decrypt_init(is_incoming, secret, info_hash);
    }

    /// Drops the write cipher; used when MSE negotiates plaintext.
    pub fn encrypt_disable(&mut self) {
        self.filter.encrypt_disable();
    }

    /// Drops the read cipher.
    pub fn decrypt_disable(&mut self) {
        self.filter.decrypt_disable();
    }

    pub fn is_encrypt_active(&self) -> bool {
        self.filter.is_encrypt_active()
    }

    pub fn is_decrypt_active(&self) -> bool {
        self.filter.is_decrypt_active()
    }

    // ------------------------------------------------------------------
    // Capabilities
    // ------------------------------------------------------------------

    pub fn enable_dht(&mut self, on: bool) {
        self.dht_enabled = on;
    }

    pub fn enable_ltep(&mut self, on: bool) {
        self.ltep_enabled = on;
    }

    pub fn enable_fast(&mut self, on: bool) {
        self.fast_enabled = on;
    }

    pub fn is_dht_enabled(&self) -> bool {
        self.dht_enabled
    }

    pub fn is_ltep_enabled(&self) -> bool {
        self.ltep_enabled
    }

    pub fn is_fast_enabled(&self) -> bool {
        self.fast_enabled
    }

    // ------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------

    /// Reads more bytes from the transport into the buffer.
    ///
    /// A cleanly closed stream surfaces as `UnexpectedEof`, so the
    /// caller's recovery policy sees it like any other transport failure.
    pub async fn fill(&mut self) -> io::Result<()> {
        let n = self.stream.read_buf(self.inbuf.bytes_mut()).await?;
        if n == 0 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        Ok(())
    }

    /// Writes everything queued to the transport.
    pub async fn flush(&mut self) -> io::Result<()> {
        if self.outbuf.is_empty() {
            return Ok(());
        }
        let data = self.outbuf.take();
        self.stream.write_all(&data).await?;
        self.stream.flush().await
    }

    /// Replaces a failed connection with a fresh TCP stream to the same
    /// address, in place: buffers and ciphers reset, direction and peer
    /// address kept. Only outgoing connections carry a dialer.
    pub async fn reconnect(&mut self) -> io::Result<()> {
        let dialer = self
            .dialer
            .as_mut()
            .ok_or_else(|| io::Error::from(io::ErrorKind::Unsupported))?;
        let stream = dialer.dial(self.addr).await?;

        self.stream = stream;
        self.kind = TransportKind::Tcp;
        self.inbuf.clear();
        self.outbuf.clear();
        self.filter = Filter::new();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::dh::{DiffieHellman, SecretKey};

    fn test_io() -> PeerIo {
        let (a, _b) = tokio::io::duplex(1024);
        PeerIo::incoming(Box::new(a), TransportKind::Tcp, test_addr())
    }

    fn test_addr() -> SocketAddr {
        "127.0.0.1:51413".parse().unwrap()
    }

    fn test_secret() -> SharedSecret {
        let a = DiffieHellman::new(&SecretKey::random());
        let b = DiffieHellman::new(&SecretKey::random());
        a.agree(b.public_key())
    }

    #[tokio::test]
    async fn test_buffered_bytes_not_retroactively_decrypted() {
        let mut io = test_io();
        let secret = test_secret();
        let hash = InfoHash::from_bytes([3u8; 20]);

        io.inbuf.append(b"plainplain");
        io.decrypt_init(true, &secret, &hash);

        // The prefix peek still sees the raw bytes...
        assert!(io.read_buffer_starts_with(b"plain"));

        // ...but a drain now runs through the cipher.
        let mut out = [0u8; 5];
        io.read_bytes(&mut out);
        assert_ne!(&out, b"plain");
    }

    #[tokio::test]
    async fn test_drain_advances_keystream() {
        // Draining n bytes must consume exactly n keystream bytes, so a
        // reader that drains pad and a reader that reads it stay in sync.
        let secret = test_secret();
        let hash = InfoHash::from_bytes([3u8; 20]);

        let mut draining = test_io();
        let mut reading = test_io();
        for io in [&mut draining, &mut reading] {
            io.inbuf.append(&[0xAAu8; 300]);
            io.decrypt_init(true, &secret, &hash);
        }

        draining.read_buffer_drain(295);
        let mut skipped = [0u8; 295];
        reading.read_bytes(&mut skipped);

        assert_eq!(draining.read_u32(), reading.read_u32());
    }

    #[tokio::test]
    async fn test_write_encrypts_only_after_init() {
        let mut io = test_io();
        let secret = test_secret();
        let hash = InfoHash::from_bytes([3u8; 20]);

        io.write(b"clear");
        io.encrypt_init(false, &secret, &hash);
        io.write(b"secret");

        let queued = io.outbuf.as_slice();
        assert_eq!(&queued[..5], b"clear");
        assert_ne!(&queued[5..], b"secret");
    }

    #[tokio::test]
    async fn test_incoming_cannot_reconnect() {
        let mut io = test_io();
        let err = io.reconnect().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    }
}
