//! Protocol constants for the plaintext and encrypted handshakes.
//!
//! Wire values are fixed by BEP-3 and the vuze.com Message Stream
//! Encryption specification; the timeout matches what mainstream clients
//! ship with.

use std::time::Duration;

// ============================================================================
// Timing
// ============================================================================

/// How long a handshake may take before it is abandoned.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// MSE padding
// ============================================================================

/// Maximum length of PadA, the padding after the initiator's public key.
/// Its length is never sent; the responder resynchronises on a hash marker.
pub const PAD_A_MAX: usize = 512;

/// Maximum length of PadB, the padding after the responder's public key.
/// Like PadA its end is found by scanning, here for the encrypted VC.
pub const PAD_B_MAX: usize = 512;

/// Maximum length of PadC. Unlike PadA/PadB its length is sent explicitly.
pub const PAD_C_MAX: u16 = 512;

/// Maximum length of PadD, also carried as an explicit u16.
pub const PAD_D_MAX: u16 = 512;

// ============================================================================
// MSE negotiation
// ============================================================================

/// `crypto_provide`/`crypto_select` bit for an unencrypted payload stream.
pub const CRYPTO_PROVIDE_PLAINTEXT: u32 = 0x01;

/// `crypto_provide`/`crypto_select` bit for an RC4-encrypted payload stream.
pub const CRYPTO_PROVIDE_RC4: u32 = 0x02;

/// The verification constant: eight zero bytes. Sent encrypted, it proves
/// the other side derived the same keys and serves as the resync marker
/// that terminates the unlength-prefixed padding.
pub const VC: [u8; 8] = [0u8; 8];

/// Keystream bytes each RC4 stream discards after keying, per the MSE
/// requirement to defeat the Fluhrer-Mantin-Shamir bias.
pub const RC4_WARMUP_DISCARD: usize = 1024;
