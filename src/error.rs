use thiserror::Error;

/// Errors that can end a handshake.
///
/// All of these surface as a failed [`HandshakeResult`](crate::HandshakeResult);
/// the variants exist so logs and tests can tell the failure modes apart.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The stream did not carry the BitTorrent protocol header where one
    /// was required, or plaintext was offered while we require encryption.
    #[error("unrecognized protocol header")]
    EncryptionWrong,

    /// The info hash is unknown to us, or does not match the torrent this
    /// connection was opened for.
    #[error("unknown or mismatched info hash")]
    BadTorrent,

    /// The peer turned out to be this client talking to itself.
    #[error("connected to ourselves")]
    PeerIsSelf,

    /// The remote peer is a seed and so are we; nothing to exchange.
    #[error("seed-to-seed connection refused")]
    SeedToSeed,

    /// The peer broke the framing rules: a pad length out of range, a
    /// resynchronisation scan that never found its marker, a bad
    /// verification constant, or a crypto selection we never offered.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    /// The transport failed and no recovery path applied.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The handshake timer fired before the exchange completed.
    #[error("handshake timed out")]
    Timeout,
}
