//! Addressable device values.
//!
//! Every value the engine understands is a [`PathKind`]; per-profile kinds
//! are expanded into concrete Lorax paths by [`PathKind::template`].

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ProtocolError;
use crate::transport::gatt::legacy;

/// Number of device-resident heat profiles.
pub const PROFILE_COUNT: usize = 4;

/// Kind of addressable value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathKind {
    OperatingState,
    HeaterTemp,
    ElapsedTime,
    ChamberType,
    Battery,
    ChargeSource,
    TotalUses,
    LedColor,
    LedBrightness,
    ActiveProfile,
    DeviceName,
    ModelCode,
    Firmware,
    GitHash,
    MacAddress,
    Serial,
    ProfileName,
    ProfileTemp,
    ProfileTime,
    ProfileColor,
    ProfileIntensity,
}

impl PathKind {
    /// Kinds that address a single fixed path.
    pub const FIXED: [PathKind; 16] = [
        Self::OperatingState,
        Self::HeaterTemp,
        Self::ElapsedTime,
        Self::ChamberType,
        Self::Battery,
        Self::ChargeSource,
        Self::TotalUses,
        Self::LedColor,
        Self::LedBrightness,
        Self::ActiveProfile,
        Self::DeviceName,
        Self::ModelCode,
        Self::Firmware,
        Self::GitHash,
        Self::MacAddress,
        Self::Serial,
    ];

    /// Per-profile kinds, in bootstrap read order.
    pub const PROFILE: [PathKind; 5] = [
        Self::ProfileName,
        Self::ProfileTemp,
        Self::ProfileTime,
        Self::ProfileColor,
        Self::ProfileIntensity,
    ];

    pub fn is_indexed(self) -> bool {
        Self::PROFILE.contains(&self)
    }

    /// Build the Lorax path for this kind.
    ///
    /// `index` is the zero-based profile index and is ignored for fixed kinds.
    pub fn template(self, index: usize) -> Result<String, ProtocolError> {
        if self.is_indexed() && index >= PROFILE_COUNT {
            return Err(ProtocolError::InvalidProfileIndex(index));
        }

        let path = match self {
            Self::OperatingState => "/p/app/stat/id",
            Self::HeaterTemp => "/p/app/htr/temp",
            Self::ElapsedTime => "/p/app/stat/elap",
            Self::ChamberType => "/p/htr/chmt",
            Self::Battery => "/p/bat/soc",
            Self::ChargeSource => "/p/bat/chg/src",
            Self::TotalUses => "/p/app/odom/0/nc",
            Self::LedColor => "/u/app/ui/colr",
            Self::LedBrightness => "/u/app/ui/lbrt",
            Self::ActiveProfile => "/p/app/hcs",
            Self::DeviceName => "/u/sys/name",
            Self::ModelCode => "/p/sys/hw/mdcd",
            Self::Firmware => "/p/sys/fw/ver",
            Self::GitHash => "/p/sys/fw/gith",
            Self::MacAddress => "/p/sys/bt/mac",
            Self::Serial => "/p/sys/hw/ser",
            Self::ProfileName => return Ok(format!("/u/app/hc/{index}/name")),
            Self::ProfileTemp => return Ok(format!("/u/app/hc/{index}/temp")),
            Self::ProfileTime => return Ok(format!("/u/app/hc/{index}/time")),
            Self::ProfileColor => return Ok(format!("/u/app/hc/{index}/colr")),
            Self::ProfileIntensity => return Ok(format!("/u/app/hc/{index}/intn")),
        };
        Ok(path.to_string())
    }

    /// Expected watch value length in bytes.
    pub fn value_len(self) -> u16 {
        match self {
            Self::OperatingState
            | Self::ChamberType
            | Self::ChargeSource
            | Self::LedBrightness
            | Self::ActiveProfile
            | Self::ProfileIntensity => 1,
            _ => 4,
        }
    }

    /// Characteristic exposing this value on legacy firmware.
    ///
    /// Legacy profile characteristics reflect whichever profile was last
    /// selected through [`legacy::PROFILE_CURRENT`].
    pub fn legacy_characteristic(self) -> Option<Uuid> {
        match self {
            Self::OperatingState => Some(legacy::OPERATING_STATE),
            Self::HeaterTemp => Some(legacy::HEATER_TEMP),
            Self::Battery => Some(legacy::BATTERY_LEVEL),
            Self::ChargeSource => Some(legacy::CHARGE_SOURCE),
            Self::TotalUses => Some(legacy::TOTAL_DABS),
            Self::LedColor => Some(legacy::LED_COLOR),
            Self::LedBrightness => Some(legacy::LED_BRIGHTNESS),
            Self::ActiveProfile => Some(legacy::PROFILE_CURRENT),
            Self::DeviceName => Some(legacy::DEVICE_NAME),
            Self::ModelCode => Some(legacy::MODEL_NUMBER),
            Self::Firmware => Some(legacy::FIRMWARE_VERSION),
            Self::GitHash => Some(legacy::GIT_HASH),
            Self::ProfileName => Some(legacy::PROFILE_NAME),
            Self::ProfileTemp => Some(legacy::PROFILE_TEMP),
            Self::ProfileTime => Some(legacy::PROFILE_TIME),
            Self::ProfileColor => Some(legacy::PROFILE_COLOR),
            Self::ElapsedTime
            | Self::ChamberType
            | Self::MacAddress
            | Self::Serial
            | Self::ProfileIntensity => None,
        }
    }
}

/// A concrete addressable value: a kind plus its profile index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    pub kind: PathKind,
    pub index: usize,
}

impl Field {
    pub const fn new(kind: PathKind) -> Self {
        Self { kind, index: 0 }
    }

    pub const fn profile(kind: PathKind, index: usize) -> Self {
        Self { kind, index }
    }

    /// Lorax path of this field.
    pub fn path(&self) -> Result<String, ProtocolError> {
        self.kind.template(self.index)
    }

    /// Resolve a Lorax path back to the field it addresses.
    pub fn from_path(path: &str) -> Option<Self> {
        PathKind::FIXED
            .iter()
            .map(|kind| Field::new(*kind))
            .chain(
                (0..PROFILE_COUNT)
                    .flat_map(|i| PathKind::PROFILE.iter().map(move |k| Field::profile(*k, i))),
            )
            .find(|field| field.path().is_ok_and(|p| p == path))
    }

    /// Resolve a legacy characteristic back to the field it exposes.
    pub fn from_characteristic(uuid: Uuid) -> Option<Self> {
        PathKind::FIXED
            .iter()
            .chain(PathKind::PROFILE.iter())
            .find(|kind| kind.legacy_characteristic() == Some(uuid))
            .map(|kind| Field::new(*kind))
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.path() {
            Ok(path) => f.write_str(&path),
            Err(_) => write!(f, "{:?}[{}]", self.kind, self.index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_templates() {
        assert_eq!(
            PathKind::ProfileTemp.template(2).unwrap(),
            "/u/app/hc/2/temp"
        );
        assert_eq!(
            PathKind::ProfileName.template(0).unwrap(),
            "/u/app/hc/0/name"
        );
        assert_eq!(
            PathKind::ProfileColor.template(4),
            Err(ProtocolError::InvalidProfileIndex(4))
        );
        // Fixed kinds ignore the index.
        assert_eq!(
            PathKind::OperatingState.template(9).unwrap(),
            "/p/app/stat/id"
        );
    }

    #[test]
    fn test_value_lengths() {
        assert_eq!(PathKind::OperatingState.value_len(), 1);
        assert_eq!(PathKind::ChamberType.value_len(), 1);
        assert_eq!(PathKind::HeaterTemp.value_len(), 4);
        assert_eq!(PathKind::ElapsedTime.value_len(), 4);
    }

    #[test]
    fn test_from_path() {
        assert_eq!(
            Field::from_path("/u/app/hc/3/intn"),
            Some(Field::profile(PathKind::ProfileIntensity, 3))
        );
        assert_eq!(
            Field::from_path("/p/app/htr/temp"),
            Some(Field::new(PathKind::HeaterTemp))
        );
        assert_eq!(Field::from_path("/nope"), None);
    }

    #[test]
    fn test_from_characteristic() {
        assert_eq!(
            Field::from_characteristic(legacy::HEATER_TEMP),
            Some(Field::new(PathKind::HeaterTemp))
        );
        assert_eq!(
            Field::from_characteristic(legacy::PROFILE_NAME),
            Some(Field::new(PathKind::ProfileName))
        );
    }

    #[test]
    fn test_paths_unique() {
        let mut seen = std::collections::HashSet::new();
        for kind in PathKind::FIXED {
            assert!(seen.insert(kind.template(0).unwrap()));
        }
        for i in 0..PROFILE_COUNT {
            for kind in PathKind::PROFILE {
                assert!(seen.insert(kind.template(i).unwrap()));
            }
        }
    }
}
