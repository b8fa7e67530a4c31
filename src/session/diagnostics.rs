//! Session diagnostics reports.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol::Limits;
use crate::types::{DeviceIdentity, Mode, OperatingState};

/// Point-in-time summary of a session, suitable for support logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsReport {
    pub connected: bool,
    pub mode: Option<Mode>,
    pub pup: bool,
    pub transport: String,
    pub services: Vec<String>,
    pub limits: Option<Limits>,
    pub identity: DeviceIdentity,
    pub state: OperatingState,
    pub high_frequency: bool,
    pub watched_paths: Vec<String>,
    pub polls: usize,
    pub pending_requests: usize,
    #[serde(with = "humantime_serde")]
    pub uptime: Duration,
}

impl DiagnosticsReport {
    /// Render as a single JSON line.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"))
    }
}
