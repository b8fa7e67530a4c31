//! Access key derivation for the unlock handshake.
//!
//! The device hands out a 16-byte seed; the client proves it knows the
//! family key by answering with `SHA-256(key || seed)[..16]`.

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Length of seeds and derived keys.
pub const ACCESS_KEY_LEN: usize = 16;

/// Family key shared with legacy firmware.
pub const LEGACY_ACCESS_KEY: [u8; ACCESS_KEY_LEN] = [
    0x2c, 0x6a, 0x1e, 0x9b, 0x47, 0xd3, 0x80, 0x5f, 0xf1, 0xa9, 0xc0, 0xe2, 0x5b, 0x7d, 0x3e, 0x41,
];

/// Family key shared with Lorax firmware.
pub const LORAX_ACCESS_KEY: [u8; ACCESS_KEY_LEN] = [
    0x8e, 0x3f, 0x05, 0xb2, 0xd4, 0x1a, 0x79, 0xc6, 0xe0, 0x55, 0x7a, 0xb3, 0x19, 0x4d, 0x2c, 0xf8,
];

/// Key schedule for the unlock handshake.
pub struct KeySchedule;

impl KeySchedule {
    /// Derive the 16-byte answer for `seed` under `family_key`.
    pub fn access_key(
        family_key: &[u8; ACCESS_KEY_LEN],
        seed: &[u8; ACCESS_KEY_LEN],
    ) -> [u8; ACCESS_KEY_LEN] {
        let mut buf = [0u8; ACCESS_KEY_LEN * 2];
        buf[..ACCESS_KEY_LEN].copy_from_slice(family_key);
        buf[ACCESS_KEY_LEN..].copy_from_slice(seed);

        let digest = Sha256::digest(buf);
        let mut key = [0u8; ACCESS_KEY_LEN];
        key.copy_from_slice(&digest[..ACCESS_KEY_LEN]);
        key
    }

    /// Same as [`KeySchedule::access_key`] but validates a seed read off the wire.
    pub fn access_key_from_slice(
        family_key: &[u8; ACCESS_KEY_LEN],
        seed: &[u8],
    ) -> Result<[u8; ACCESS_KEY_LEN]> {
        let seed: &[u8; ACCESS_KEY_LEN] = seed
            .get(..ACCESS_KEY_LEN)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| {
                Error::HandshakeFailed(format!(
                    "access seed must be {ACCESS_KEY_LEN} bytes, got {}",
                    seed.len()
                ))
            })?;
        Ok(Self::access_key(family_key, seed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counting_seed() -> [u8; ACCESS_KEY_LEN] {
        let mut seed = [0u8; ACCESS_KEY_LEN];
        for (i, b) in seed.iter_mut().enumerate() {
            *b = i as u8;
        }
        seed
    }

    #[test]
    fn test_legacy_vector() {
        let key = KeySchedule::access_key(&LEGACY_ACCESS_KEY, &counting_seed());
        assert_eq!(hex::encode(key), "765985ad6ea0e216f9108f64965e6da7");
    }

    #[test]
    fn test_lorax_vector() {
        let key = KeySchedule::access_key(&LORAX_ACCESS_KEY, &counting_seed());
        assert_eq!(hex::encode(key), "fd9f04bcf90fdfe6af5ebf01012c0c1a");
    }

    #[test]
    fn test_short_seed_rejected() {
        let err = KeySchedule::access_key_from_slice(&LORAX_ACCESS_KEY, &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, Error::HandshakeFailed(_)));
    }

    #[test]
    fn test_long_seed_truncated() {
        let mut long = counting_seed().to_vec();
        long.extend_from_slice(&[0xFF; 4]);
        let key = KeySchedule::access_key_from_slice(&LEGACY_ACCESS_KEY, &long).unwrap();
        assert_eq!(key, KeySchedule::access_key(&LEGACY_ACCESS_KEY, &counting_seed()));
    }
}
