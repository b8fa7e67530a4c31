//! Auxiliary value conversions.

use byteorder::{ByteOrder, LittleEndian};

/// Calculate CRC32 checksum.
pub fn crc32(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Pack an IEEE-754 single as little-endian bytes.
pub fn encode_f32(value: f32) -> [u8; 4] {
    let mut buf = [0u8; 4];
    LittleEndian::write_f32(&mut buf, value);
    buf
}

/// Unpack a little-endian IEEE-754 single. Short input yields `None`.
pub fn decode_f32(data: &[u8]) -> Option<f32> {
    (data.len() >= 4).then(|| LittleEndian::read_f32(&data[..4]))
}

/// Format a MAC address as upper-case colon separated hex.
///
/// Devices report the address least significant byte first.
pub fn format_mac(raw: &[u8]) -> String {
    raw.iter()
        .rev()
        .map(|b| hex::encode_upper([*b]))
        .collect::<Vec<_>>()
        .join(":")
}

/// Firmware revisions are shown as letters: 0 -> `A`, 25 -> `Z`,
/// 26 -> `AA` and so on.
pub fn version_letter(mut version: u32) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push(char::from(b'A' + (version % 26) as u8));
        if version < 26 {
            break;
        }
        version = version / 26 - 1;
    }
    letters.iter().rev().collect()
}

/// Inverse of [`version_letter`].
pub fn version_from_letter(letters: &str) -> Option<u32> {
    if letters.is_empty() {
        return None;
    }
    let mut value: u32 = 0;
    for c in letters.chars() {
        if !c.is_ascii_uppercase() {
            return None;
        }
        value = value.checked_mul(26)?.checked_add(u32::from(c as u8 - b'A') + 1)?;
    }
    Some(value - 1)
}
