//! Raw value decoding for both firmware families.

use std::time::Duration;

use crate::protocol::{decode_f32, format_mac, version_letter, Field, PathKind};
use crate::types::{ChamberType, ChargeSource, Mode, OperatingState, Rgb, StateDelta};

/// Decode a raw value into a typed delta.
///
/// Returns `None` for values that are malformed for the field.
pub fn decode(field: Field, mode: Mode, data: &[u8]) -> Option<StateDelta> {
    let index = field.index;
    let delta = match field.kind {
        PathKind::OperatingState => StateDelta::OperatingState(match mode {
            Mode::Lorax => OperatingState::from_lorax(data)?,
            Mode::Legacy => OperatingState::from_legacy(data)?,
        }),
        PathKind::HeaterTemp => StateDelta::HeaterTemp(decode_f32(data)?),
        PathKind::ElapsedTime => StateDelta::Elapsed(seconds(data)?),
        PathKind::ChamberType => StateDelta::Chamber(ChamberType::from_code(*data.first()?)),
        PathKind::Battery => StateDelta::Battery(decode_f32(data)?),
        PathKind::ChargeSource => StateDelta::ChargeSource(ChargeSource::from_code(small(mode, data)?)),
        PathKind::TotalUses => StateDelta::TotalUses(whole(decode_f32(data)?)?),
        PathKind::LedColor => StateDelta::LedColor(Rgb::from_bytes(data)?),
        PathKind::LedBrightness => StateDelta::LedBrightness(*data.first()?),
        PathKind::ActiveProfile => StateDelta::ActiveProfile(usize::from(small(mode, data)?)),
        PathKind::DeviceName => StateDelta::DeviceName(text(data)?),
        PathKind::ModelCode => StateDelta::Model(text(data)?),
        PathKind::Firmware => StateDelta::Firmware(match mode {
            Mode::Lorax => version_letter(u32::from(*data.first()?)),
            Mode::Legacy => text(data)?,
        }),
        PathKind::GitHash => StateDelta::GitHash(text(data)?),
        PathKind::MacAddress if data.len() == 6 => StateDelta::Mac(format_mac(data)),
        PathKind::MacAddress => return None,
        PathKind::Serial => StateDelta::Serial(text(data)?),
        PathKind::ProfileName => StateDelta::ProfileName {
            index,
            name: text(data)?,
        },
        PathKind::ProfileTemp => StateDelta::ProfileTemp {
            index,
            temperature: decode_f32(data)?,
        },
        PathKind::ProfileTime => StateDelta::ProfileTime {
            index,
            time: seconds(data)?,
        },
        PathKind::ProfileColor => StateDelta::ProfileColor {
            index,
            color: Rgb::from_bytes(data)?,
        },
        PathKind::ProfileIntensity => StateDelta::ProfileIntensity {
            index,
            intensity: *data.first()?,
        },
    };
    Some(delta)
}

/// Small enumerations: one byte on Lorax, an f32 on legacy firmware.
fn small(mode: Mode, data: &[u8]) -> Option<u8> {
    match mode {
        Mode::Lorax => data.first().copied(),
        Mode::Legacy => {
            let value = decode_f32(data)?;
            (value.is_finite() && (0.0..=255.0).contains(&value)).then(|| value.round() as u8)
        }
    }
}

fn whole(value: f32) -> Option<u32> {
    (value.is_finite() && value >= 0.0 && value <= u32::MAX as f32).then(|| value.round() as u32)
}

fn seconds(data: &[u8]) -> Option<Duration> {
    let value = decode_f32(data)?;
    (value.is_finite() && value >= 0.0).then(|| Duration::from_secs_f32(value))
}

fn text(data: &[u8]) -> Option<String> {
    let end = data.iter().position(|b| *b == 0).unwrap_or(data.len());
    let s = std::str::from_utf8(&data[..end]).ok()?.trim();
    Some(s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::encode_f32;

    #[test]
    fn test_state_per_mode() {
        let field = Field::new(PathKind::OperatingState);
        assert_eq!(
            decode(field, Mode::Lorax, &[7]),
            Some(StateDelta::OperatingState(OperatingState::Preheat))
        );
        assert_eq!(
            decode(field, Mode::Legacy, &encode_f32(7.0)),
            Some(StateDelta::OperatingState(OperatingState::Preheat))
        );
    }

    #[test]
    fn test_charge_source_per_mode() {
        let field = Field::new(PathKind::ChargeSource);
        assert_eq!(
            decode(field, Mode::Lorax, &[1]),
            Some(StateDelta::ChargeSource(ChargeSource::Wireless))
        );
        assert_eq!(
            decode(field, Mode::Legacy, &encode_f32(0.0)),
            Some(StateDelta::ChargeSource(ChargeSource::Usb))
        );
    }

    #[test]
    fn test_firmware_letters() {
        let field = Field::new(PathKind::Firmware);
        assert_eq!(
            decode(field, Mode::Lorax, &[27]),
            Some(StateDelta::Firmware("AB".into()))
        );
        assert_eq!(
            decode(field, Mode::Legacy, b"R\0\0"),
            Some(StateDelta::Firmware("R".into()))
        );
    }

    #[test]
    fn test_profile_fields_carry_index() {
        assert_eq!(
            decode(
                Field::profile(PathKind::ProfileTime, 3),
                Mode::Lorax,
                &encode_f32(45.0)
            ),
            Some(StateDelta::ProfileTime {
                index: 3,
                time: Duration::from_secs(45)
            })
        );
    }

    #[test]
    fn test_malformed_values() {
        assert_eq!(decode(Field::new(PathKind::HeaterTemp), Mode::Lorax, &[1, 2]), None);
        assert_eq!(decode(Field::new(PathKind::MacAddress), Mode::Lorax, &[1, 2, 3]), None);
        assert_eq!(decode(Field::new(PathKind::LedBrightness), Mode::Lorax, &[]), None);
        assert_eq!(
            decode(Field::new(PathKind::ElapsedTime), Mode::Lorax, &encode_f32(-1.0)),
            None
        );
    }
}
