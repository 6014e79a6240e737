//! Diffie-Hellman key agreement over the fixed MSE group.
//!
//! The prime and generator are the ones every MSE-speaking client ships;
//! both sides must use them bit-for-bit or no shared secret comes out.
//! Keys and secrets travel big-endian, zero-padded to the full 96 bytes.

use std::sync::LazyLock;

use num_bigint::BigUint;
use num_traits::Num;
use rand::RngCore as _;

/// Length of an encoded public key or shared secret (768 bits).
pub const KEY_LEN: usize = 96;

/// Length of the private exponent (160 bits).
pub const PRIVATE_KEY_LEN: usize = 20;

// The 768-bit safe prime from the MSE specification.
static P: LazyLock<BigUint> = LazyLock::new(|| {
    BigUint::from_str_radix("FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E088A67CC74020BBEA63B139B22514A08798E3404DDEF9519B3CD3A431B302B0A6DF25F14374FE1356D6D51C245E485B576625E7EC6F44C42E9A63A36210000000000090563", 16).unwrap()
});

static G: LazyLock<BigUint> = LazyLock::new(|| BigUint::from(2u32));

/// A 160-bit DH private exponent.
///
/// The mediator owns generation policy; [`SecretKey::random`] is the
/// default it falls back to.
#[derive(Clone)]
pub struct SecretKey([u8; PRIVATE_KEY_LEN]);

impl SecretKey {
    pub fn random() -> Self {
        let mut bytes = [0u8; PRIVATE_KEY_LEN];
        rand::rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; PRIVATE_KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PRIVATE_KEY_LEN] {
        &self.0
    }
}

/// One side's DH-768 key pair.
pub struct DiffieHellman {
    private_key: BigUint,
    public_key: [u8; KEY_LEN],
}

impl DiffieHellman {
    pub fn new(secret: &SecretKey) -> Self {
        let private_key = BigUint::from_bytes_be(secret.as_bytes());
        let public_key = to_key_bigend(&G.modpow(&private_key, &P));
        Self {
            private_key,
            public_key,
        }
    }

    /// Our public key `Y = G^x mod P`, as it goes on the wire.
    pub fn public_key(&self) -> &[u8; KEY_LEN] {
        &self.public_key
    }

    /// Derives the shared secret `S = Yp^x mod P` from the peer's public key.
    pub fn agree(&self, peer_public_key: &[u8; KEY_LEN]) -> SharedSecret {
        let peer = BigUint::from_bytes_be(peer_public_key);
        SharedSecret(to_key_bigend(&peer.modpow(&self.private_key, &P)))
    }
}

/// The DH shared secret `S`, encoded like a public key.
#[derive(Clone, Copy)]
pub struct SharedSecret([u8; KEY_LEN]);

impl SharedSecret {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

fn to_key_bigend(n: &BigUint) -> [u8; KEY_LEN] {
    let bytes = n.to_bytes_be();
    let mut out = [0u8; KEY_LEN];
    out[KEY_LEN - bytes.len()..].copy_from_slice(&bytes);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agreement_is_symmetric() {
        let a = DiffieHellman::new(&SecretKey::random());
        let b = DiffieHellman::new(&SecretKey::random());

        let s_a = a.agree(b.public_key());
        let s_b = b.agree(a.public_key());
        assert_eq!(s_a.as_bytes(), s_b.as_bytes());
    }

    #[test]
    fn test_public_key_is_zero_padded() {
        // x = 1 gives Y = 2, which must come out right-aligned in 96 bytes.
        let mut exponent = [0u8; PRIVATE_KEY_LEN];
        exponent[PRIVATE_KEY_LEN - 1] = 1;
        let dh = DiffieHellman::new(&SecretKey::from_bytes(exponent));

        let mut expected = [0u8; KEY_LEN];
        expected[KEY_LEN - 1] = 2;
        assert_eq!(dh.public_key(), &expected);
    }

    #[test]
    fn test_distinct_keys_distinct_secrets() {
        let a = DiffieHellman::new(&SecretKey::random());
        let b = DiffieHellman::new(&SecretKey::random());
        let c = DiffieHellman::new(&SecretKey::random());

        assert_ne!(
            a.agree(b.public_key()).as_bytes(),
            a.agree(c.public_key()).as_bytes()
        );
    }
}
