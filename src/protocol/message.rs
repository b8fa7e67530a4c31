//! Request, reply and event frames.

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use super::{EVENT_DATA_OFFSET, REPLY_HEADER_SIZE, REQUEST_HEADER_SIZE};
use crate::error::ProtocolError;
use crate::types::Sequence;

/// Lorax opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    // Access control
    GetAccessSeed = 0x00,
    UnlockAccess = 0x01,
    GetLimits = 0x02,

    // Short (single frame) value access
    ReadShort = 0x10,
    WriteShort = 0x11,
    StatShort = 0x12,

    // Path lifecycle
    Open = 0x20,
    Close = 0x21,
    Read = 0x22,
    Write = 0x23,
    Watch = 0x24,
}

impl Opcode {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0x00 => Some(Self::GetAccessSeed),
            0x01 => Some(Self::UnlockAccess),
            0x02 => Some(Self::GetLimits),
            0x10 => Some(Self::ReadShort),
            0x11 => Some(Self::WriteShort),
            0x12 => Some(Self::StatShort),
            0x20 => Some(Self::Open),
            0x21 => Some(Self::Close),
            0x22 => Some(Self::Read),
            0x23 => Some(Self::Write),
            0x24 => Some(Self::Watch),
            _ => None,
        }
    }

    /// Opcodes that mutate device state and must not overlap on the wire.
    pub fn is_mutating(self) -> bool {
        matches!(self, Self::WriteShort | Self::Write | Self::UnlockAccess)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::GetAccessSeed => "GET_ACCESS_SEED",
            Self::UnlockAccess => "UNLOCK_ACCESS",
            Self::GetLimits => "GET_LIMITS",
            Self::ReadShort => "READ_SHORT",
            Self::WriteShort => "WRITE_SHORT",
            Self::StatShort => "STAT_SHORT",
            Self::Open => "OPEN",
            Self::Close => "CLOSE",
            Self::Read => "READ",
            Self::Write => "WRITE",
            Self::Watch => "WATCH",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u8> for Opcode {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_u8(value).ok_or(ProtocolError::InvalidOpcode(value))
    }
}

/// Outbound command frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub sequence: Sequence,
    pub opcode: Opcode,
    pub payload: Vec<u8>,
}

impl Request {
    pub fn new(sequence: Sequence, opcode: Opcode, payload: Vec<u8>) -> Self {
        Self {
            sequence,
            opcode,
            payload,
        }
    }

    /// Encode to wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; REQUEST_HEADER_SIZE + self.payload.len()];
        LittleEndian::write_u16(&mut buf[0..2], self.sequence.0);
        buf[2] = self.opcode as u8;
        buf[REQUEST_HEADER_SIZE..].copy_from_slice(&self.payload);
        buf
    }

    /// Decode from wire bytes.
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < REQUEST_HEADER_SIZE {
            return Err(ProtocolError::Truncated {
                len: data.len(),
                need: REQUEST_HEADER_SIZE,
            });
        }

        Ok(Self {
            sequence: Sequence(LittleEndian::read_u16(&data[0..2])),
            opcode: Opcode::try_from(data[2])?,
            payload: data[REQUEST_HEADER_SIZE..].to_vec(),
        })
    }
}

/// Reply to a request, matched by sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub sequence: Sequence,
    pub error: bool,
    pub data: Vec<u8>,
}

impl Reply {
    pub fn ok(sequence: Sequence, data: Vec<u8>) -> Self {
        Self {
            sequence,
            error: false,
            data,
        }
    }

    pub fn failed(sequence: Sequence) -> Self {
        Self {
            sequence,
            error: true,
            data: Vec::new(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; REPLY_HEADER_SIZE + self.data.len()];
        LittleEndian::write_u16(&mut buf[0..2], self.sequence.0);
        buf[2] = u8::from(self.error);
        buf[REPLY_HEADER_SIZE..].copy_from_slice(&self.data);
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < REPLY_HEADER_SIZE {
            return Err(ProtocolError::Truncated {
                len: data.len(),
                need: REPLY_HEADER_SIZE,
            });
        }

        Ok(Self {
            sequence: Sequence(LittleEndian::read_u16(&data[0..2])),
            error: data[2] != 0,
            data: data[REPLY_HEADER_SIZE..].to_vec(),
        })
    }
}

/// Pushed value-changed notification for a watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub sequence: Sequence,
    pub error: bool,
    pub watch_id: u16,
    pub data: Vec<u8>,
}

impl Event {
    pub fn new(watch_id: u16, data: Vec<u8>) -> Self {
        Self {
            sequence: Sequence(0),
            error: false,
            watch_id,
            data,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; EVENT_DATA_OFFSET + self.data.len()];
        LittleEndian::write_u16(&mut buf[0..2], self.sequence.0);
        buf[2] = u8::from(self.error);
        LittleEndian::write_u16(&mut buf[3..5], self.watch_id);
        buf[EVENT_DATA_OFFSET..].copy_from_slice(&self.data);
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < EVENT_DATA_OFFSET {
            return Err(ProtocolError::Truncated {
                len: data.len(),
                need: EVENT_DATA_OFFSET,
            });
        }

        Ok(Self {
            sequence: Sequence(LittleEndian::read_u16(&data[0..2])),
            error: data[2] != 0,
            watch_id: LittleEndian::read_u16(&data[3..5]),
            data: data[EVENT_DATA_OFFSET..].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_layout() {
        let req = Request::new(Sequence(0x0102), Opcode::ReadShort, vec![0xAA, 0xBB]);
        assert_eq!(req.encode(), vec![0x02, 0x01, 0x10, 0xAA, 0xBB]);
    }

    #[test]
    fn test_request_round_trip() {
        let opcodes = [
            Opcode::GetAccessSeed,
            Opcode::UnlockAccess,
            Opcode::GetLimits,
            Opcode::ReadShort,
            Opcode::WriteShort,
            Opcode::Open,
            Opcode::Close,
            Opcode::Watch,
        ];
        for (i, opcode) in opcodes.into_iter().enumerate() {
            let seq = Sequence((i as u16) * 9000);
            let payload: Vec<u8> = (0..i as u8).collect();
            let req = Request::new(seq, opcode, payload);
            assert_eq!(Request::decode(&req.encode()).unwrap(), req);
        }
    }

    #[test]
    fn test_request_unknown_opcode() {
        let err = Request::decode(&[0, 0, 0x7F]).unwrap_err();
        assert_eq!(err, ProtocolError::InvalidOpcode(0x7F));
    }

    #[test]
    fn test_reply_decode() {
        let reply = Reply::decode(&[0x05, 0x00, 0x01, 0x42]).unwrap();
        assert_eq!(reply.sequence, Sequence(5));
        assert!(reply.error);
        assert_eq!(reply.data, vec![0x42]);

        assert!(matches!(
            Reply::decode(&[0x05, 0x00]),
            Err(ProtocolError::Truncated { len: 2, need: 3 })
        ));
    }

    #[test]
    fn test_event_layout() {
        let event = Event::new(0x0203, vec![7, 8]);
        let bytes = event.encode();
        assert_eq!(bytes, vec![0, 0, 0, 0x03, 0x02, 0, 7, 8]);

        let decoded = Event::decode(&bytes).unwrap();
        assert_eq!(decoded.watch_id, 0x0203);
        assert_eq!(decoded.data, vec![7, 8]);
    }
}
