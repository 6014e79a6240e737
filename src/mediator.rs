//! The handshake's window onto client and torrent state it does not own.

use std::net::SocketAddr;

use crate::crypto::SecretKey;
use crate::info_hash::InfoHash;
use crate::peer_id::PeerId;

/// Identifier the surrounding client uses for a torrent it tracks.
pub type TorrentId = u64;

/// What a handshake needs to know about a torrent we host.
#[derive(Clone, Debug)]
pub struct TorrentInfo {
    pub info_hash: InfoHash,
    /// The peer id *we* announce for this torrent.
    pub client_peer_id: PeerId,
    /// Whether we have all pieces (a seed-to-seed incoming connection is
    /// refused).
    pub is_done: bool,
    pub id: TorrentId,
}

/// Pure query interface between a handshake session and the client.
///
/// The session calls these only from its own task, so implementations need
/// no locking beyond whatever their own storage wants.
pub trait Mediator: Send + Sync {
    /// Looks up a torrent by info hash.
    fn torrent_info(&self, info_hash: &InfoHash) -> Option<TorrentInfo>;

    /// Looks up a torrent by `SHA1("req2", info_hash)`, the obfuscated
    /// identifier an MSE initiator sends in place of the real hash.
    /// See [`InfoHash::obfuscated`].
    fn torrent_info_from_obfuscated(&self, obfuscated: &InfoHash) -> Option<TorrentInfo>;

    /// Whether we already know `addr` to be seeding the torrent.
    fn is_peer_known_seed(&self, torrent: TorrentId, addr: SocketAddr) -> bool;

    /// The DH private exponent for a new session.
    fn private_key(&self) -> SecretKey {
        SecretKey::random()
    }

    /// Whether this client participates in the DHT; advertised in the
    /// handshake's reserved bits.
    fn allows_dht(&self) -> bool;

    /// Whether falling back to TCP is allowed when µTP or encryption fails.
    fn allows_tcp(&self) -> bool;

    /// Records that `addr` cannot speak µTP for this torrent, so future
    /// connection attempts go straight to TCP.
    fn set_utp_failed(&self, info_hash: &InfoHash, addr: SocketAddr);
}
