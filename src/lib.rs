//! btmse - BitTorrent peer handshake core
//!
//! This library negotiates a peer connection from the moment a byte stream
//! to a remote peer exists until either side is ready to exchange
//! BitTorrent peer-protocol messages. It implements both the plaintext
//! BEP-3 handshake and the Message Stream Encryption (MSE) handshake used
//! to obfuscate traffic against pervasive ISP filtering, including the
//! µTP-to-TCP and encrypted-to-plaintext retry paths.
//!
//! # Modules
//!
//! - [`handshake`] - The protocol state machine and its async driver
//! - [`io`] - Peer IO adaptor owning the stream, buffers and RC4 ciphers
//! - [`crypto`] - SHA-1 helpers, DH-768 key agreement, RC4 stream filter
//! - [`mediator`] - Query interface onto client and torrent state
//! - [`buffer`] - Framed wire buffer with typed big-endian reads
//!
//! # Overview
//!
//! The caller wraps a freshly connected stream in a [`PeerIo`], hands it to
//! a [`Handshake`] together with a [`Mediator`] and an [`EncryptionMode`],
//! and awaits [`Handshake::perform`]. On success the `PeerIo` comes back
//! with the negotiated ciphers installed, ready for the message layer; on
//! failure it is closed and the error says why.

pub mod buffer;
pub mod constants;
pub mod crypto;
mod error;
pub mod handshake;
pub mod info_hash;
pub mod io;
pub mod mediator;
pub mod peer_id;

pub use error::HandshakeError;
pub use handshake::{EncryptionMode, Handshake, HandshakeMessage, HandshakeResult, Reserved};
pub use info_hash::InfoHash;
pub use io::{Dialer, PeerIo, PeerStream, TcpDialer, TransportKind};
pub use mediator::{Mediator, TorrentId, TorrentInfo};
pub use peer_id::PeerId;
