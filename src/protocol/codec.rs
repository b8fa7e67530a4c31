//! Payload builders for Lorax requests.

use bytes::{BufMut, BytesMut};
use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use super::MAX_PATH_LEN;
use crate::error::ProtocolError;

/// Limits negotiated with `GET_LIMITS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    pub max_payload: u8,
    pub max_files: u16,
    pub max_commands: u16,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_payload: 128,
            max_files: 8,
            max_commands: 8,
        }
    }
}

/// Decode a `GET_LIMITS` reply: `[maxPayload:u8][maxFiles:u16LE][maxCommands:u16LE]`.
pub fn decode_limits(data: &[u8]) -> Result<Limits, ProtocolError> {
    if data.len() < 5 {
        return Err(ProtocolError::Truncated {
            len: data.len(),
            need: 5,
        });
    }

    Ok(Limits {
        max_payload: data[0],
        max_files: LittleEndian::read_u16(&data[1..3]),
        max_commands: LittleEndian::read_u16(&data[3..5]),
    })
}

fn check_path(path: &str) -> Result<&[u8], ProtocolError> {
    let bytes = path.as_bytes();
    if bytes.len() > MAX_PATH_LEN {
        return Err(ProtocolError::PathTooLong {
            len: bytes.len(),
            max: MAX_PATH_LEN,
        });
    }
    Ok(bytes)
}

/// `READ_SHORT`: `[reserved:u16][maxPayload:u16][path]`.
pub fn read_short_payload(max_payload: u16, path: &str) -> Result<Vec<u8>, ProtocolError> {
    let path = check_path(path)?;
    let mut buf = BytesMut::with_capacity(4 + path.len());
    buf.put_u16_le(0);
    buf.put_u16_le(max_payload);
    buf.put_slice(path);
    Ok(buf.to_vec())
}

/// `WRITE_SHORT`: `[reserved:u16][reserved:u8][path][0x00][value]`.
///
/// The NUL terminator separates the variable-length path from the value.
pub fn write_short_payload(path: &str, value: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let path = check_path(path)?;
    let mut buf = BytesMut::with_capacity(4 + path.len() + value.len());
    buf.put_u16_le(0);
    buf.put_u8(0);
    buf.put_slice(path);
    buf.put_u8(0);
    buf.put_slice(value);
    Ok(buf.to_vec())
}

/// `OPEN`: raw path bytes.
pub fn open_payload(path: &str) -> Result<Vec<u8>, ProtocolError> {
    Ok(check_path(path)?.to_vec())
}

/// `WATCH`: `[openHandle:u16][reserved:u16][intervalMs:u16][reserved:u16][length:u16]`.
pub fn watch_payload(handle: u16, interval_ms: u16, length: u16) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(10);
    buf.put_u16_le(handle);
    buf.put_u16_le(0);
    buf.put_u16_le(interval_ms);
    buf.put_u16_le(0);
    buf.put_u16_le(length);
    buf.to_vec()
}

/// `WATCH` with a zero handle clears the watch.
pub fn unwatch_payload() -> Vec<u8> {
    watch_payload(0, 0, 0)
}

/// `CLOSE`: `[handle:u16]`.
pub fn close_payload(handle: u16) -> Vec<u8> {
    handle.to_le_bytes().to_vec()
}
