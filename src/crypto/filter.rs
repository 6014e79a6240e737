//! The per-connection RC4 stream pair.

use rc4::consts::U20;
use rc4::{KeyInit, Rc4, StreamCipher};

use super::dh::SharedSecret;
use super::digest;
use crate::constants::RC4_WARMUP_DISCARD;
use crate::info_hash::InfoHash;

/// Two independent RC4 streams, one per direction.
///
/// Keys derive as `SHA1("keyA" | "keyB", S, SKEY)`: `keyA` encrypts the
/// initiator's outgoing stream, `keyB` the responder's, so each side keys
/// the same pair from its own perspective via the `is_incoming` flag.
///
/// A `Filter` is also usable detached from any connection: the initiator
/// keys a throwaway one to precompute `ENCRYPT(VC)`, the ciphertext marker
/// it scans for to find the end of PadB, without consuming keystream from
/// the stream that will do the real decrypting.
#[derive(Default)]
pub struct Filter {
    encrypt: Option<Rc4<U20>>,
    decrypt: Option<Rc4<U20>>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys the outgoing stream. May be called at most once per connection;
    /// keying again would desynchronise the keystream.
    pub fn encrypt_init(&mut self, is_incoming: bool, secret: &SharedSecret, info_hash: &InfoHash) {
        let label: &[u8] = if is_incoming { b"keyB" } else { b"keyA" };
        self.encrypt = Some(new_cipher(label, secret, info_hash));
    }

    /// Keys the incoming stream with the opposite label.
    pub fn decrypt_init(&mut self, is_incoming: bool, secret: &SharedSecret, info_hash: &InfoHash) {
        let label: &[u8] = if is_incoming { b"keyA" } else { b"keyB" };
        self.decrypt = Some(new_cipher(label, secret, info_hash));
    }

    /// Transforms `buf` in place; a no-op until the stream is keyed.
    pub fn encrypt(&mut self, buf: &mut [u8]) {
        if let Some(cipher) = &mut self.encrypt {
            cipher.apply_keystream(buf);
        }
    }

    /// Transforms `buf` in place; a no-op until the stream is keyed.
    pub fn decrypt(&mut self, buf: &mut [u8]) {
        if let Some(cipher) = &mut self.decrypt {
            cipher.apply_keystream(buf);
        }
    }

    /// Drops the outgoing cipher; used when MSE negotiates plaintext.
    pub fn encrypt_disable(&mut self) {
        self.encrypt = None;
    }

    /// Drops the incoming cipher.
    pub fn decrypt_disable(&mut self) {
        self.decrypt = None;
    }

    pub fn is_encrypt_active(&self) -> bool {
        self.encrypt.is_some()
    }

    pub fn is_decrypt_active(&self) -> bool {
        self.decrypt.is_some()
    }
}

fn new_cipher(label: &[u8], secret: &SharedSecret, info_hash: &InfoHash) -> Rc4<U20> {
    let key = digest(&[label, secret.as_bytes(), info_hash.as_bytes()]);
    let mut cipher: Rc4<U20> = Rc4::new(key.as_slice().into());

    // MSE: the first 1024 keystream bytes are discarded after keying.
    let mut warmup = [0u8; RC4_WARMUP_DISCARD];
    cipher.apply_keystream(&mut warmup);
    cipher
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::dh::{DiffieHellman, SecretKey};

    fn test_secret() -> SharedSecret {
        let a = DiffieHellman::new(&SecretKey::random());
        let b = DiffieHellman::new(&SecretKey::random());
        a.agree(b.public_key())
    }

    #[test]
    fn test_round_trip_between_peers() {
        let secret = test_secret();
        let hash = InfoHash::from_bytes([7u8; 20]);

        // Initiator encrypts, responder decrypts the same direction.
        let mut initiator = Filter::new();
        let mut responder = Filter::new();
        initiator.encrypt_init(false, &secret, &hash);
        responder.decrypt_init(true, &secret, &hash);

        let mut payload = *b"BitTorrent protocol";
        initiator.encrypt(&mut payload);
        assert_ne!(&payload, b"BitTorrent protocol");
        responder.decrypt(&mut payload);
        assert_eq!(&payload, b"BitTorrent protocol");
    }

    #[test]
    fn test_directions_use_distinct_keys() {
        let secret = test_secret();
        let hash = InfoHash::from_bytes([7u8; 20]);

        let mut filter = Filter::new();
        filter.encrypt_init(false, &secret, &hash);
        filter.decrypt_init(false, &secret, &hash);

        let mut a = [0u8; 8];
        let mut b = [0u8; 8];
        filter.encrypt(&mut a);
        filter.decrypt(&mut b);
        assert_ne!(a, b);
    }

    #[test]
    fn test_throwaway_filter_matches_real_one() {
        // The VC-needle precompute relies on two identically keyed streams
        // producing identical ciphertext.
        let secret = test_secret();
        let hash = InfoHash::from_bytes([9u8; 20]);

        let mut throwaway = Filter::new();
        let mut real = Filter::new();
        throwaway.encrypt_init(true, &secret, &hash);
        real.encrypt_init(true, &secret, &hash);

        let mut x = [0u8; 8];
        let mut y = [0u8; 8];
        throwaway.encrypt(&mut x);
        real.encrypt(&mut y);
        assert_eq!(x, y);
    }

    #[test]
    fn test_inactive_filter_is_identity() {
        let mut filter = Filter::new();
        let mut data = *b"payload";
        filter.encrypt(&mut data);
        filter.decrypt(&mut data);
        assert_eq!(&data, b"payload");
        assert!(!filter.is_encrypt_active());
        assert!(!filter.is_decrypt_active());
    }

    #[test]
    fn test_disable_uninstalls() {
        let secret = test_secret();
        let hash = InfoHash::from_bytes([7u8; 20]);

        let mut filter = Filter::new();
        filter.encrypt_init(false, &secret, &hash);
        assert!(filter.is_encrypt_active());

        filter.encrypt_disable();
        assert!(!filter.is_encrypt_active());
        let mut data = *b"clear";
        filter.encrypt(&mut data);
        assert_eq!(&data, b"clear");
    }
}
