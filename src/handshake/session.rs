use std::io;
use std::sync::Arc;

use rand::Rng as _;
use tokio::time::timeout;
use tracing::{debug, trace};

use super::message::{
    HandshakeMessage, Reserved, HANDSHAKE_LEN, HANDSHAKE_PREFIX_LEN, PROTOCOL_HEADER,
};
use crate::buffer::Buffer;
use crate::constants::{
    CRYPTO_PROVIDE_PLAINTEXT, CRYPTO_PROVIDE_RC4, HANDSHAKE_TIMEOUT, PAD_A_MAX, PAD_B_MAX,
    PAD_C_MAX, PAD_D_MAX, VC,
};
use crate::crypto::{self, dh, DiffieHellman, Filter, SharedSecret};
use crate::error::HandshakeError;
use crate::info_hash::InfoHash;
use crate::io::PeerIo;
use crate::mediator::Mediator;
use crate::peer_id::PeerId;

/// Client encryption policy for one connection attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EncryptionMode {
    /// Only encrypted connections are acceptable.
    Required,
    /// Try encrypted first, fall back to plaintext.
    Preferred,
    /// Lead with plaintext; still answer encryption when a peer insists.
    ClearPreferred,
}

/// Protocol state. Length-bound states carry the length they are waiting
/// out, parsed from the peer; the scanning states carry how much padding
/// they have already ruled out, so the 512-byte pad limit holds no matter
/// how the bytes arrive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    AwaitingHandshake,
    AwaitingPeerId,
    AwaitingYa,
    AwaitingPadA { scanned: usize },
    AwaitingCryptoProvide,
    AwaitingPadC { pad_c_len: u16 },
    AwaitingIa { ia_len: u16 },
    AwaitingPayloadStream,
    AwaitingYb,
    AwaitingVc { scanned: usize },
    AwaitingCryptoSelect,
    AwaitingPadD { pad_d_len: u16 },
}

/// What a state handler wants next.
enum Step {
    /// Re-dispatch on the (possibly new) state.
    Advance,
    /// Nothing useful buffered; wait for the transport.
    NeedMore,
    /// The handshake completed successfully.
    Finished,
}

/// Outcome of one full dispatcher pass.
enum Flow {
    NeedMore,
    Finished,
}

/// Terminal report of a handshake session.
pub struct HandshakeResult {
    /// On success, the connection with the negotiated ciphers installed,
    /// ready for the peer-message layer. On failure it has been closed.
    pub io: Option<PeerIo>,
    /// The peer's id, when the exchange got far enough to learn it.
    pub peer_id: Option<PeerId>,
    /// Whether the peer sent anything at all; callers use this to decide
    /// whether the address is worth another attempt later.
    pub read_anything: bool,
    pub error: Option<HandshakeError>,
}

impl HandshakeResult {
    pub fn is_connected(&self) -> bool {
        self.io.is_some()
    }
}

/// One handshake session over one peer connection.
///
/// Construct with [`new`](Self::new), then await [`perform`](Self::perform);
/// everything between the transport connecting and the peer-message layer
/// taking over happens in there: plaintext or MSE negotiation, the
/// resynchronisation scans, mode selection, self-connect detection, and
/// the µTP-to-TCP / encrypted-to-plaintext retries.
pub struct Handshake {
    mediator: Arc<dyn Mediator>,
    io: PeerIo,
    mode: EncryptionMode,
    state: State,
    dh: DiffieHellman,
    secret: Option<SharedSecret>,
    /// The crypto bits the peer offered (incoming side).
    peer_crypto_provide: u32,
    /// The single bit that won the negotiation; zero until then.
    crypto_select: u32,
    peer_id: Option<PeerId>,
    have_sent_bt_handshake: bool,
    have_read_anything: bool,
}

impl Handshake {
    pub fn new(mediator: Arc<dyn Mediator>, io: PeerIo, mode: EncryptionMode) -> Self {
        let dh = DiffieHellman::new(&mediator.private_key());
        let state = if io.is_incoming() || mode == EncryptionMode::ClearPreferred {
            State::AwaitingHandshake
        } else {
            State::AwaitingYb
        };
        Self {
            mediator,
            io,
            mode,
            state,
            dh,
            secret: None,
            peer_crypto_provide: 0,
            crypto_select: 0,
            peer_id: None,
            have_sent_bt_handshake: false,
            have_read_anything: false,
        }
    }

    /// Runs the handshake to completion, or to the 30-second timeout.
    ///
    /// Resolves exactly once. On failure the connection is closed before
    /// the result is returned.
    pub async fn perform(mut self) -> HandshakeResult {
        let outcome = match timeout(HANDSHAKE_TIMEOUT, self.run()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(HandshakeError::Timeout),
        };

        match outcome {
            Ok(()) => HandshakeResult {
                peer_id: self.peer_id,
                read_anything: self.have_read_anything,
                io: Some(self.io),
                error: None,
            },
            Err(error) => {
                debug!("handshake with {} failed: {}", self.io.address(), error);
                HandshakeResult {
                    peer_id: self.peer_id,
                    read_anything: self.have_read_anything,
                    io: None,
                    error: Some(error),
                }
            }
        }
    }

    async fn run(&mut self) -> Result<(), HandshakeError> {
        self.begin()?;
        loop {
            match self.can_read()? {
                Flow::Finished => {
                    self.io.flush().await?;
                    return Ok(());
                }
                Flow::NeedMore => {
                    if let Err(err) = self.flush_and_fill().await {
                        self.recover(err).await?;
                    }
                }
            }
        }
    }

    /// Sends whatever opens our side of the exchange.
    fn begin(&mut self) -> Result<(), HandshakeError> {
        if self.io.is_incoming() {
            return Ok(());
        }
        if self.mode != EncryptionMode::ClearPreferred {
            // A->B: Diffie Hellman Ya, PadA
            self.send_public_key_and_pad(PAD_A_MAX);
        } else {
            // No MSE wanted: lead with the plaintext handshake.
            self.send_bt_handshake()?;
        }
        Ok(())
    }

    async fn flush_and_fill(&mut self) -> io::Result<()> {
        self.io.flush().await?;
        self.io.fill().await
    }

    /// The dispatcher: runs handlers for as long as they advance, with a
    /// buffered-length gate before re-entering the length-bound states so
    /// multi-segment arrivals are consumed without another socket event.
    fn can_read(&mut self) -> Result<Flow, HandshakeError> {
        loop {
            trace!("dispatching in state {:?}", self.state);
            let step = match self.state {
                State::AwaitingHandshake => self.read_handshake(),
                State::AwaitingPeerId => self.read_peer_id(),
                State::AwaitingYa => self.read_ya(),
                State::AwaitingPadA { scanned } => self.read_pad_a(scanned),
                State::AwaitingCryptoProvide => self.read_crypto_provide(),
                State::AwaitingPadC { pad_c_len } => self.read_pad_c(pad_c_len),
                State::AwaitingIa { ia_len } => self.read_ia(ia_len),
                State::AwaitingPayloadStream => self.read_payload_stream(),
                State::AwaitingYb => self.read_yb(),
                State::AwaitingVc { scanned } => self.read_vc(scanned),
                State::AwaitingCryptoSelect => self.read_crypto_select(),
                State::AwaitingPadD { pad_d_len } => self.read_pad_d(pad_d_len),
            }?;

            match step {
                Step::Finished => return Ok(Flow::Finished),
                Step::NeedMore => return Ok(Flow::NeedMore),
                Step::Advance => {
                    let buffered = self.io.read_buffer_len();
                    let ready = match self.state {
                        State::AwaitingPadC { pad_c_len } => buffered >= pad_c_len as usize,
                        State::AwaitingPadD { pad_d_len } => buffered >= pad_d_len as usize,
                        State::AwaitingIa { ia_len } => buffered >= ia_len as usize,
                        _ => true,
                    };
                    if !ready {
                        return Ok(Flow::NeedMore);
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Outgoing, encrypted
    // ------------------------------------------------------------------

    fn read_yb(&mut self) -> Result<Step, HandshakeError> {
        if self.io.read_buffer_len() < PROTOCOL_HEADER.len() {
            return Ok(Step::NeedMore);
        }

        if self.io.read_buffer_starts_with(&PROTOCOL_HEADER) {
            // The peer skipped our key exchange and answered in plaintext.
            trace!("got a plain handshake back");
            self.state = State::AwaitingHandshake;
            return Ok(Step::Advance);
        }
        if self.io.read_buffer_len() < dh::KEY_LEN {
            return Ok(Step::NeedMore);
        }

        trace!("got an encrypted handshake back");
        self.have_read_anything = true;

        let mut peer_public_key = [0u8; dh::KEY_LEN];
        self.io.read_bytes(&mut peer_public_key);
        let secret = self.dh.agree(&peer_public_key);
        let info_hash = self.torrent_hash()?;

        // A->B: HASH('req1', S), HASH('req2', SKEY) xor HASH('req3', S),
        //       ENCRYPT(VC, crypto_provide, len(PadC), PadC, len(IA)), ENCRYPT(IA)
        self.io.write(&crypto::digest(&[b"req1", secret.as_bytes()]));

        let req2 = crypto::digest(&[b"req2", info_hash.as_bytes()]);
        let req3 = crypto::digest(&[b"req3", secret.as_bytes()]);
        let mut xored = [0u8; 20];
        for (i, byte) in xored.iter_mut().enumerate() {
            *byte = req2[i] ^ req3[i];
        }
        self.io.write(&xored);

        // The two hashes travel in the clear; everything after goes
        // through the cipher.
        self.io
            .encrypt_init(self.io.is_incoming(), &secret, &info_hash);

        let mut out = Buffer::with_capacity(HANDSHAKE_LEN + 16);
        out.append(&VC);
        out.append_u32(self.crypto_provide());
        out.append_u16(0); // no PadC
        let msg = self.build_bt_handshake()?;
        out.append_u16(HANDSHAKE_LEN as u16); // len(IA)
        out.append(&msg.encode());
        self.have_sent_bt_handshake = true;
        self.io.write(out.as_slice());

        self.secret = Some(secret);
        self.state = State::AwaitingVc { scanned: 0 };
        Ok(Step::Advance)
    }

    /// MSE: "Since the length of PadB is unknown, A will be able to
    /// resynchronize on ENCRYPT(VC)".
    fn read_vc(&mut self, mut scanned: usize) -> Result<Step, HandshakeError> {
        let info_hash = self.torrent_hash()?;
        let secret = self.shared_secret()?;

        // A throwaway filter keyed like the decrypt stream about to be
        // installed tells us what ENCRYPT(VC) looks like on the wire,
        // without consuming keystream from the real cipher.
        let mut needle = VC;
        let mut filter = Filter::new();
        filter.encrypt_init(true, &secret, &info_hash);
        filter.encrypt(&mut needle);

        loop {
            if self.io.read_buffer_len() < needle.len() {
                trace!("vc scan ran out of bytes after {}", scanned);
                self.state = State::AwaitingVc { scanned };
                return Ok(Step::NeedMore);
            }
            if self.io.read_buffer_starts_with(&needle) {
                trace!("found the encrypted vc after {} pad bytes", scanned);
                // Consume the marker through the real cipher so its
                // keystream advances exactly as the peer's did writing it.
                self.io
                    .decrypt_init(self.io.is_incoming(), &secret, &info_hash);
                let mut vc = VC;
                self.io.read_bytes(&mut vc);
                self.state = State::AwaitingCryptoSelect;
                return Ok(Step::Advance);
            }
            if scanned == PAD_B_MAX {
                return Err(HandshakeError::ProtocolViolation(
                    "no encrypted VC within PadB range",
                ));
            }
            self.io.read_buffer_drain(1);
            scanned += 1;
        }
    }

    fn read_crypto_select(&mut self) -> Result<Step, HandshakeError> {
        if self.io.read_buffer_len() < 4 + 2 {
            return Ok(Step::NeedMore);
        }

        let crypto_select = self.io.read_u32();
        trace!("crypto select is {}", crypto_select);
        if crypto_select & self.crypto_provide() == 0 {
            return Err(HandshakeError::ProtocolViolation(
                "peer selected a crypto mode we didn't offer",
            ));
        }
        self.crypto_select = crypto_select;

        let pad_d_len = self.io.read_u16();
        if pad_d_len > PAD_D_MAX {
            return Err(HandshakeError::ProtocolViolation("pad_d is too long"));
        }
        self.state = State::AwaitingPadD { pad_d_len };
        Ok(Step::Advance)
    }

    fn read_pad_d(&mut self, pad_d_len: u16) -> Result<Step, HandshakeError> {
        if self.io.read_buffer_len() < pad_d_len as usize {
            return Ok(Step::NeedMore);
        }
        self.io.read_buffer_drain(pad_d_len as usize);

        // With plaintext selected the stream reverts to the clear from
        // here on, in both directions.
        if self.crypto_select == CRYPTO_PROVIDE_PLAINTEXT {
            self.io.encrypt_disable();
            self.io.decrypt_disable();
        }

        self.state = State::AwaitingHandshake;
        Ok(Step::Advance)
    }

    // ------------------------------------------------------------------
    // Plaintext, either direction
    // ------------------------------------------------------------------

    fn read_handshake(&mut self) -> Result<Step, HandshakeError> {
        if self.io.read_buffer_len() < HANDSHAKE_PREFIX_LEN {
            return Ok(Step::NeedMore);
        }
        self.have_read_anything = true;

        if self.io.read_buffer_starts_with(&PROTOCOL_HEADER) {
            if self.mode == EncryptionMode::Required {
                debug!("peer is unencrypted and policy requires encryption");
                return Err(HandshakeError::EncryptionWrong);
            }
        } else if self.io.is_incoming() {
            // Not the protocol header, so presumably MSE message 1.
            trace!("incoming stream doesn't read as plaintext, assuming encrypted");
            self.state = State::AwaitingYa;
            return Ok(Step::Advance);
        }
        // Outgoing: the buffered bytes may be ciphertext after an
        // encrypted exchange; the decrypted reads below are the check
        // that counts.

        let mut name = [0u8; 20];
        self.io.read_bytes(&mut name);
        if name != PROTOCOL_HEADER {
            return Err(HandshakeError::EncryptionWrong);
        }

        let mut reserved = [0u8; 8];
        self.io.read_bytes(&mut reserved);
        let reserved = Reserved::from_bytes(reserved);
        self.io.enable_dht(reserved.has_dht());
        self.io.enable_ltep(reserved.has_ltep());
        self.io.enable_fast(reserved.has_fast());

        let mut hash = [0u8; 20];
        self.io.read_bytes(&mut hash);
        let hash = InfoHash::from_bytes(hash);

        if self.io.is_incoming() {
            if self.mediator.torrent_info(&hash).is_none() {
                debug!("peer wants a torrent we don't have");
                return Err(HandshakeError::BadTorrent);
            }
            self.io.set_torrent_hash(hash);
        } else if self.io.torrent_hash() != Some(&hash) {
            debug!("peer returned the wrong hash");
            return Err(HandshakeError::BadTorrent);
        }

        // An incoming peer is still waiting for our half of the exchange.
        if !self.have_sent_bt_handshake {
            self.send_bt_handshake()?;
        }

        self.state = State::AwaitingPeerId;
        Ok(Step::Advance)
    }

    fn read_peer_id(&mut self) -> Result<Step, HandshakeError> {
        if self.io.read_buffer_len() < 20 {
            return Ok(Step::NeedMore);
        }
        let mut id = [0u8; 20];
        self.io.read_bytes(&mut id);
        let peer_id = PeerId(id);
        self.peer_id = Some(peer_id);
        trace!("peer id is {:?}", peer_id);

        let info_hash = self.torrent_hash()?;
        if let Some(info) = self.mediator.torrent_info(&info_hash) {
            if info.client_peer_id == peer_id {
                debug!("connected to ourselves");
                return Err(HandshakeError::PeerIsSelf);
            }
        }
        Ok(Step::Finished)
    }

    // ------------------------------------------------------------------
    // Incoming, encrypted
    // ------------------------------------------------------------------

    fn read_ya(&mut self) -> Result<Step, HandshakeError> {
        if self.io.read_buffer_len() < dh::KEY_LEN {
            return Ok(Step::NeedMore);
        }

        let mut peer_public_key = [0u8; dh::KEY_LEN];
        self.io.read_bytes(&mut peer_public_key);
        self.secret = Some(self.dh.agree(&peer_public_key));

        // B->A: Diffie Hellman Yb, PadB
        self.send_public_key_and_pad(PAD_B_MAX);
        self.state = State::AwaitingPadA { scanned: 0 };
        Ok(Step::Advance)
    }

    fn read_pad_a(&mut self, mut scanned: usize) -> Result<Step, HandshakeError> {
        let secret = self.shared_secret()?;
        // The end of PadA is wherever HASH('req1', S) starts, in the clear.
        let needle = crypto::digest(&[b"req1", secret.as_bytes()]);

        loop {
            if self.io.read_buffer_len() < needle.len() {
                self.state = State::AwaitingPadA { scanned };
                return Ok(Step::NeedMore);
            }
            if self.io.read_buffer_starts_with(&needle) {
                trace!("found req1 after {} pad bytes", scanned);
                self.io.read_buffer_drain(needle.len());
                self.state = State::AwaitingCryptoProvide;
                return Ok(Step::Advance);
            }
            if scanned == PAD_A_MAX {
                return Err(HandshakeError::ProtocolViolation(
                    "no req1 hash within PadA range",
                ));
            }
            self.io.read_buffer_drain(1);
            scanned += 1;
        }
    }

    fn read_crypto_provide(&mut self) -> Result<Step, HandshakeError> {
        // req2 xor req3, then ENCRYPT(VC, crypto_provide, len(PadC))
        const NEED_LEN: usize = 20 + 8 + 4 + 2;
        if self.io.read_buffer_len() < NEED_LEN {
            return Ok(Step::NeedMore);
        }
        let secret = self.shared_secret()?;

        // The peer sent HASH('req2', SKEY) xor HASH('req3', S); building
        // the latter and xor'ing recovers the obfuscated torrent hash.
        let mut req2_xor_req3 = [0u8; 20];
        self.io.read_bytes(&mut req2_xor_req3);
        let req3 = crypto::digest(&[b"req3", secret.as_bytes()]);
        let mut obfuscated = [0u8; 20];
        for (i, byte) in obfuscated.iter_mut().enumerate() {
            *byte = req2_xor_req3[i] ^ req3[i];
        }

        let info = self
            .mediator
            .torrent_info_from_obfuscated(&InfoHash::from_bytes(obfuscated))
            .ok_or(HandshakeError::BadTorrent)?;
        trace!("incoming encrypted handshake is for torrent {}", info.id);

        let client_is_seed = info.is_done;
        let peer_is_seed = self.mediator.is_peer_known_seed(info.id, self.io.address());
        self.io.set_torrent_hash(info.info_hash);

        if client_is_seed && peer_is_seed {
            debug!("another seed tried to reconnect to us");
            return Err(HandshakeError::SeedToSeed);
        }

        self.io
            .decrypt_init(self.io.is_incoming(), &secret, &info.info_hash);

        let mut vc = VC;
        self.io.read_bytes(&mut vc);
        if vc != VC {
            return Err(HandshakeError::ProtocolViolation(
                "bad verification constant",
            ));
        }

        self.peer_crypto_provide = self.io.read_u32();
        trace!("crypto provide is {}", self.peer_crypto_provide);

        let pad_c_len = self.io.read_u16();
        if pad_c_len > PAD_C_MAX {
            return Err(HandshakeError::ProtocolViolation("pad_c is too long"));
        }
        self.state = State::AwaitingPadC { pad_c_len };
        Ok(Step::Advance)
    }

    fn read_pad_c(&mut self, pad_c_len: u16) -> Result<Step, HandshakeError> {
        if self.io.read_buffer_len() < pad_c_len as usize + 2 {
            return Ok(Step::NeedMore);
        }
        self.io.read_buffer_drain(pad_c_len as usize);

        let ia_len = self.io.read_u16();
        trace!("ia length is {}", ia_len);
        self.state = State::AwaitingIa { ia_len };
        Ok(Step::Advance)
    }

    fn read_ia(&mut self, ia_len: u16) -> Result<Step, HandshakeError> {
        if self.io.read_buffer_len() < ia_len as usize {
            return Ok(Step::NeedMore);
        }
        let secret = self.shared_secret()?;
        let info_hash = self.torrent_hash()?;

        // B->A: ENCRYPT(VC, crypto_select, len(PadD), PadD), ENCRYPT2(Payload)
        self.io
            .encrypt_init(self.io.is_incoming(), &secret, &info_hash);

        let crypto_select = select_crypto(self.mode, self.peer_crypto_provide);
        if crypto_select == 0 {
            debug!("peer didn't offer an encryption mode we like");
            return Err(HandshakeError::ProtocolViolation(
                "peer offered no crypto mode we accept",
            ));
        }
        self.crypto_select = crypto_select;
        trace!("selecting crypto mode {}", crypto_select);

        let mut out = Buffer::with_capacity(HANDSHAKE_LEN + 16);
        out.append(&VC);
        out.append_u32(crypto_select);
        out.append_u16(0); // no PadD

        if crypto_select == CRYPTO_PROVIDE_PLAINTEXT {
            // Flush the encrypted tail of the key exchange now, then drop
            // the write cipher so our handshake below goes out clear.
            self.io.write(out.as_slice());
            out.clear();
            self.io.encrypt_disable();
        }

        let msg = self.build_bt_handshake()?;
        out.append(&msg.encode());
        self.have_sent_bt_handshake = true;
        self.io.write(out.as_slice());

        self.state = State::AwaitingPayloadStream;
        Ok(Step::Advance)
    }

    fn read_payload_stream(&mut self) -> Result<Step, HandshakeError> {
        if self.io.read_buffer_len() < HANDSHAKE_LEN {
            return Ok(Step::NeedMore);
        }

        let mut raw = [0u8; HANDSHAKE_LEN];
        self.io.read_bytes(&mut raw);
        let msg = HandshakeMessage::decode(&raw)?;

        if msg.info_hash.is_zero() || self.io.torrent_hash() != Some(&msg.info_hash) {
            debug!("peer returned the wrong hash");
            return Err(HandshakeError::BadTorrent);
        }

        self.peer_id = Some(msg.peer_id);
        if let Some(info) = self.mediator.torrent_info(&msg.info_hash) {
            if info.client_peer_id == msg.peer_id {
                debug!("connected to ourselves");
                return Err(HandshakeError::PeerIsSelf);
            }
        }

        self.io.enable_dht(msg.reserved.has_dht());
        self.io.enable_ltep(msg.reserved.has_ltep());
        self.io.enable_fast(msg.reserved.has_fast());

        // With plaintext selected the peer stopped encrypting after its
        // IA; stop decrypting with it.
        if self.crypto_select == CRYPTO_PROVIDE_PLAINTEXT {
            self.io.decrypt_disable();
        }
        Ok(Step::Finished)
    }

    // ------------------------------------------------------------------
    // Transport error recovery
    // ------------------------------------------------------------------

    /// The two local recoveries tried, in order, before a transport error
    /// becomes a failed handshake. Both mutate the connection in place
    /// (new socket, same session) and restart at `AwaitingHandshake`.
    async fn recover(&mut self, err: io::Error) -> Result<(), HandshakeError> {
        // A µTP peer that never answered the key exchange probably
        // doesn't speak µTP at all; remember that and redial over TCP.
        if self.io.is_utp() && !self.io.is_incoming() && self.state == State::AwaitingYb {
            if matches!(
                err.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::ConnectionRefused
            ) {
                if let Some(info_hash) = self.io.torrent_hash().copied() {
                    if self.mediator.torrent_info(&info_hash).is_some() {
                        self.mediator.set_utp_failed(&info_hash, self.io.address());
                    }
                }
            }
            if self.mediator.allows_tcp() && self.io.reconnect().await.is_ok() {
                debug!("utp handshake with {} failed, retrying over tcp", self.io.address());
                self.send_bt_handshake()?;
                self.state = State::AwaitingHandshake;
                self.io.flush().await?;
                return Ok(());
            }
        }

        // An error during the key exchange may just mean the peer doesn't
        // do encryption; reconnect and try a plaintext handshake.
        if matches!(self.state, State::AwaitingYb | State::AwaitingVc { .. })
            && self.mode != EncryptionMode::Required
            && self.mediator.allows_tcp()
            && self.io.reconnect().await.is_ok()
        {
            debug!("encrypted handshake with {} failed, trying plaintext", self.io.address());
            self.send_bt_handshake()?;
            self.state = State::AwaitingHandshake;
            self.io.flush().await?;
            return Ok(());
        }

        Err(HandshakeError::Transport(err))
    }

    // ------------------------------------------------------------------
    // Shared pieces
    // ------------------------------------------------------------------

    /// The crypto bits we put in `crypto_provide`.
    fn crypto_provide(&self) -> u32 {
        match self.mode {
            EncryptionMode::Required | EncryptionMode::Preferred => CRYPTO_PROVIDE_RC4,
            EncryptionMode::ClearPreferred => CRYPTO_PROVIDE_RC4 | CRYPTO_PROVIDE_PLAINTEXT,
        }
    }

    fn send_public_key_and_pad(&mut self, pad_max: usize) {
        self.io.write(self.dh.public_key());

        let mut rng = rand::rng();
        let pad_len = rng.random_range(0..=pad_max);
        let mut pad = vec![0u8; pad_len];
        rng.fill(&mut pad[..]);
        self.io.write(&pad);
    }

    fn build_bt_handshake(&self) -> Result<HandshakeMessage, HandshakeError> {
        let info_hash = self
            .io
            .torrent_hash()
            .copied()
            .filter(|hash| !hash.is_zero())
            .ok_or(HandshakeError::BadTorrent)?;
        let info = self
            .mediator
            .torrent_info(&info_hash)
            .ok_or(HandshakeError::BadTorrent)?;
        Ok(HandshakeMessage::new(
            info_hash,
            info.client_peer_id,
            self.mediator.allows_dht(),
        ))
    }

    fn send_bt_handshake(&mut self) -> Result<(), HandshakeError> {
        let msg = self.build_bt_handshake()?;
        self.io.write(&msg.encode());
        self.have_sent_bt_handshake = true;
        Ok(())
    }

    fn torrent_hash(&self) -> Result<InfoHash, HandshakeError> {
        self.io
            .torrent_hash()
            .copied()
            .ok_or(HandshakeError::BadTorrent)
    }

    fn shared_secret(&self) -> Result<SharedSecret, HandshakeError> {
        self.secret
            .ok_or(HandshakeError::ProtocolViolation("no key agreement yet"))
    }
}

/// Picks `crypto_select` from the peer's `crypto_provide` bits per our
/// policy; zero when nothing acceptable was offered.
fn select_crypto(mode: EncryptionMode, provide: u32) -> u32 {
    let preference: &[u32] = match mode {
        EncryptionMode::Required => &[CRYPTO_PROVIDE_RC4],
        EncryptionMode::Preferred => &[CRYPTO_PROVIDE_RC4, CRYPTO_PROVIDE_PLAINTEXT],
        EncryptionMode::ClearPreferred => &[CRYPTO_PROVIDE_PLAINTEXT, CRYPTO_PROVIDE_RC4],
    };
    preference
        .iter()
        .copied()
        .find(|choice| provide & choice != 0)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_crypto_policy() {
        use EncryptionMode::*;
        let rc4 = CRYPTO_PROVIDE_RC4;
        let plain = CRYPTO_PROVIDE_PLAINTEXT;

        assert_eq!(select_crypto(Required, rc4 | plain), rc4);
        assert_eq!(select_crypto(Required, plain), 0);
        assert_eq!(select_crypto(Preferred, rc4 | plain), rc4);
        assert_eq!(select_crypto(Preferred, plain), plain);
        assert_eq!(select_crypto(ClearPreferred, rc4 | plain), plain);
        assert_eq!(select_crypto(ClearPreferred, rc4), rc4);
        assert_eq!(select_crypto(ClearPreferred, 0), 0);
    }
}
