//! Cryptographic primitives for Lorax.
//!
//! Only the unlock handshake needs cryptography: a SHA-256 based
//! challenge response over a device supplied seed.

mod kdf;

pub use kdf::{KeySchedule, ACCESS_KEY_LEN, LEGACY_ACCESS_KEY, LORAX_ACCESS_KEY};

/// Generate random bytes (used for simulated device seeds).
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut bytes);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_bytes() {
        let r1: [u8; 16] = random_bytes();
        let r2: [u8; 16] = random_bytes();
        assert_ne!(r1, r2);
    }
}
