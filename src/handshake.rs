//! The handshake protocol engine.
//!
//! A twelve-state machine covering both directions of both flavors:
//!
//! - outgoing encrypted: `AwaitingYb` → `AwaitingVc` →
//!   `AwaitingCryptoSelect` → `AwaitingPadD` → `AwaitingHandshake` →
//!   `AwaitingPeerId`
//! - incoming encrypted: `AwaitingYa` → `AwaitingPadA` →
//!   `AwaitingCryptoProvide` → `AwaitingPadC` → `AwaitingIa` →
//!   `AwaitingPayloadStream`
//! - plaintext (either side, directly or via fallback):
//!   `AwaitingHandshake` → `AwaitingPeerId`

mod message;
mod session;

pub use message::{HandshakeMessage, Reserved, HANDSHAKE_LEN, PROTOCOL};
pub use session::{EncryptionMode, Handshake, HandshakeResult};
