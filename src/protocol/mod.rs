//! Lorax wire protocol.
//!
//! Defines the frame layout, opcodes, payload builders and the auxiliary
//! conversions used when talking to device firmware.
//!
//! ## Frame Format
//!
//! ```text
//! request  ┌──────────────┬────────────┬──────────────────────────┐
//!          │ Seq (2, LE)  │ Opcode (1) │ Payload ...              │
//!          └──────────────┴────────────┴──────────────────────────┘
//! reply    ┌──────────────┬────────────┬──────────────────────────┐
//!          │ Seq (2, LE)  │ Error (1)  │ Data ...                 │
//!          └──────────────┴────────────┴──────────────────────────┘
//! event    ┌──────────────┬────────────┬──────────────┬─────┬─────┐
//!          │ Seq (2)      │ Error (1)  │ Watch (2,LE) │ (1) │ ... │
//!          └──────────────┴────────────┴──────────────┴─────┴─────┘
//! ```

mod codec;
mod convert;
mod message;
mod paths;

pub use codec::{
    close_payload, decode_limits, open_payload, read_short_payload, unwatch_payload,
    watch_payload, write_short_payload, Limits,
};
pub use convert::{
    crc32, decode_f32, encode_f32, format_mac, version_from_letter,
    version_letter,
};
pub use message::{Event, Opcode, Reply, Request};
pub use paths::{Field, PathKind, PROFILE_COUNT};

/// Size of the request header (sequence + opcode).
pub const REQUEST_HEADER_SIZE: usize = 3;

/// Size of the reply header (sequence + error flag).
pub const REPLY_HEADER_SIZE: usize = 3;

/// Offset of event data within an event frame.
pub const EVENT_DATA_OFFSET: usize = 6;

/// Sequence numbers wrap modulo this value; it is never emitted itself.
pub const SEQUENCE_MODULUS: u32 = 65535;

/// Default payload limit used until `GET_LIMITS` has been answered.
pub const DEFAULT_MAX_PAYLOAD: u16 = 128;

/// Maximum encoded path length accepted by the payload builders.
pub const MAX_PATH_LEN: usize = 64;
