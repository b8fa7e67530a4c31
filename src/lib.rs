//! # Lorax
//!
//! Communication engine for a portable vaporizer over Bluetooth Low Energy.
//!
//! Lorax speaks two firmware families: the path-addressed request/reply
//! protocol of current firmware, and the one-characteristic-per-value layout
//! of legacy firmware. Both are folded into a single device state snapshot
//! with typed change notifications.
//!
//! ## Architecture
//!
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Host Application                         │
//! ├─────────────────────────────────────────────────────────────────┤
//! │          Session (connect / get / send / watch / profiles)      │
//! ├──────────────────────────────┬──────────────────────────────────┤
//! │  State Machine & Snapshot    │   Watchdog · Poller · Diagnostics│
//! ├──────────────────────────────┴──────────────────────────────────┤
//! │        Dispatcher (sequence, pending replies, busy gate)        │
//! ├─────────────────────────────────────────────────────────────────┤
//! │          Protocol (frames, payloads, paths, conversions)        │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                GATT Transport (platform / simulated)            │
//! └─────────────────────────────────────────────────────────────────┘

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
// Allow stylistic lints that don't affect correctness
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]              // ASCII diagrams in docs
#![allow(clippy::unreadable_literal)]        // UUID literals
#![allow(clippy::cast_possible_truncation)]  // Wire fields are narrower than host types
#![allow(clippy::cast_sign_loss)]            // Device floats are range checked first
#![allow(clippy::cast_precision_loss)]       // Profile indices as f32
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::use_self)]
#![allow(clippy::redundant_pub_crate)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::future_not_send)]
#![allow(clippy::struct_excessive_bools)]    // Simulator switches
#![allow(clippy::match_same_arms)]
#![allow(clippy::ignored_unit_patterns)]

pub mod config;
pub mod crypto;
pub mod error;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod types;

#[cfg(feature = "cli")]
pub mod cli;

pub use config::Config;
pub use error::{Error, Result};
pub use session::Session;
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::protocol::{Field, PathKind};
    pub use crate::session::{DiagnosticsReport, NullContext, Session, SessionContext};
    pub use crate::transport::{GattTransport, SimConfig, SimulatedDevice, TransportEvent};
    pub use crate::types::*;
}
