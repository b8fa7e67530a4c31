//! Core types used throughout Lorax.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::protocol::{Limits, SEQUENCE_MODULUS};

/// Request sequence number.
///
/// Sequence numbers wrap modulo 65535, so `0xFFFF` is never emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Sequence(pub u16);

impl Sequence {
    pub const ZERO: Self = Self(0);

    pub fn new(n: u16) -> Self {
        Self(n)
    }

    pub fn next(self) -> Self {
        Self(((u32::from(self.0) + 1) % SEQUENCE_MODULUS) as u16)
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Operating mode selected during negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Path-addressed request/reply protocol.
    Lorax,
    /// One characteristic per value, polled by the client.
    Legacy,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lorax => write!(f, "lorax"),
            Self::Legacy => write!(f, "legacy"),
        }
    }
}

/// What the negotiator learned about the connected device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub mode: Mode,
    /// Lorax firmware exposing the Pup sub-service.
    pub pup: bool,
    /// Services advertised by the device.
    pub services: Vec<Uuid>,
    /// Limits negotiated with `GET_LIMITS` (Lorax only).
    pub limits: Option<Limits>,
}

/// Address of an arbitrary device value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Address {
    /// Lorax path.
    Path(String),
    /// Legacy characteristic.
    Characteristic(Uuid),
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Self::Path(s.to_string())
    }
}

impl From<String> for Address {
    fn from(s: String) -> Self {
        Self::Path(s)
    }
}

impl From<Uuid> for Address {
    fn from(uuid: Uuid) -> Self {
        Self::Characteristic(uuid)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(p) => f.write_str(p),
            Self::Characteristic(u) => write!(f, "{u}"),
        }
    }
}

/// Device operating state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OperatingState {
    InitMemory,
    InitVersionDisplay,
    InitBatteryDisplay,
    MasterOff,
    Sleep,
    #[default]
    Idle,
    TempSelect,
    Preheat,
    Active,
    Fade,
    VersionDisplay,
    BatteryDisplay,
    FactoryTest,
    Bonding,
}

impl OperatingState {
    /// Decode the raw state code shared by both firmware families.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::InitMemory),
            1 => Some(Self::InitVersionDisplay),
            2 => Some(Self::InitBatteryDisplay),
            3 => Some(Self::MasterOff),
            4 => Some(Self::Sleep),
            5 => Some(Self::Idle),
            6 => Some(Self::TempSelect),
            7 => Some(Self::Preheat),
            8 => Some(Self::Active),
            9 => Some(Self::Fade),
            10 => Some(Self::VersionDisplay),
            11 => Some(Self::BatteryDisplay),
            12 => Some(Self::FactoryTest),
            13 => Some(Self::Bonding),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::InitMemory => 0,
            Self::InitVersionDisplay => 1,
            Self::InitBatteryDisplay => 2,
            Self::MasterOff => 3,
            Self::Sleep => 4,
            Self::Idle => 5,
            Self::TempSelect => 6,
            Self::Preheat => 7,
            Self::Active => 8,
            Self::Fade => 9,
            Self::VersionDisplay => 10,
            Self::BatteryDisplay => 11,
            Self::FactoryTest => 12,
            Self::Bonding => 13,
        }
    }

    /// Lorax firmware reports the state as a single byte.
    pub fn from_lorax(data: &[u8]) -> Option<Self> {
        data.first().copied().and_then(Self::from_code)
    }

    /// Legacy firmware reports the state as a little-endian f32.
    pub fn from_legacy(data: &[u8]) -> Option<Self> {
        let value = crate::protocol::decode_f32(data)?;
        if !value.is_finite() || value < 0.0 || value > f32::from(u8::MAX) {
            return None;
        }
        Self::from_code(value.round() as u8)
    }

    pub fn is_heating(self) -> bool {
        matches!(self, Self::Preheat | Self::Active)
    }

    /// States treated as idle when deciding side effects.
    pub fn is_idle_equivalent(self) -> bool {
        !matches!(self, Self::Preheat | Self::Active | Self::Fade | Self::TempSelect)
    }
}

/// What the device is charging from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeSource {
    Usb,
    Wireless,
    None,
    Unknown(u8),
}

impl ChargeSource {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Self::Usb,
            1 => Self::Wireless,
            2 | 3 => Self::None,
            other => Self::Unknown(other),
        }
    }
}

/// Installed chamber (atomizer) type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChamberType {
    None,
    Classic,
    ThreeD,
    Xl,
    Unknown(u8),
}

impl ChamberType {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Self::None,
            1 => Self::Classic,
            3 => Self::ThreeD,
            4 => Self::Xl,
            other => Self::Unknown(other),
        }
    }
}

/// RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        (data.len() >= 3).then(|| Self::new(data[0], data[1], data[2]))
    }

    pub fn to_bytes(self) -> [u8; 4] {
        [self.r, self.g, self.b, 0]
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// One of the device-resident heat profiles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProfileEntry {
    pub name: String,
    /// Target temperature in °C.
    pub temperature: f32,
    pub color: Rgb,
    #[serde(with = "humantime_serde")]
    pub time: Duration,
    pub intensity: Option<u8>,
}

/// Device identity fields read during bootstrap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DeviceIdentity {
    pub name: Option<String>,
    pub model: Option<String>,
    pub firmware: Option<String>,
    pub git_hash: Option<String>,
    pub mac: Option<String>,
    pub serial: Option<String>,
}

/// Normalized projection of device state exposed to consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DeviceStateSnapshot {
    pub state: OperatingState,
    pub heater_temp: Option<f32>,
    #[serde(with = "humantime_serde")]
    pub elapsed: Option<Duration>,
    pub chamber: Option<ChamberType>,
    pub battery: Option<f32>,
    pub charge_source: Option<ChargeSource>,
    pub led_color: Option<Rgb>,
    pub led_brightness: Option<u8>,
    pub total_uses: Option<u32>,
    pub active_profile: Option<usize>,
    pub profiles: [Option<ProfileEntry>; crate::protocol::PROFILE_COUNT],
    pub identity: DeviceIdentity,
}

/// Typed change to the device state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum StateDelta {
    OperatingState(OperatingState),
    HeaterTemp(f32),
    Elapsed(#[serde(with = "humantime_serde")] Duration),
    Chamber(ChamberType),
    Battery(f32),
    ChargeSource(ChargeSource),
    LedColor(Rgb),
    LedBrightness(u8),
    TotalUses(u32),
    ActiveProfile(usize),
    DeviceName(String),
    Model(String),
    Firmware(String),
    GitHash(String),
    Mac(String),
    Serial(String),
    ProfileName { index: usize, name: String },
    ProfileTemp { index: usize, temperature: f32 },
    ProfileTime { index: usize, #[serde(with = "humantime_serde")] time: Duration },
    ProfileColor { index: usize, color: Rgb },
    ProfileIntensity { index: usize, intensity: u8 },
}
