//! End-to-end tests for legacy firmware sessions.
//!
//! Tests cover:
//! - Seed/key unlock over the access characteristic
//! - Profile bootstrap through the shared profile characteristics
//! - Profile switching
//! - Polling and the high-frequency heater poll
//! - Raw characteristic access

use std::sync::Arc;
use std::time::Duration;

use lorax::config::Config;
use lorax::crypto::{KeySchedule, LEGACY_ACCESS_KEY};
use lorax::error::{Error, ProtocolError};
use lorax::protocol::{encode_f32, Field, PathKind};
use lorax::session::Session;
use lorax::transport::gatt::legacy;
use lorax::transport::{SimConfig, SimOp, SimulatedDevice};
use lorax::types::{Mode, OperatingState};
use uuid::Uuid;

// ============================================================================
// Test Infrastructure
// ============================================================================

const PROFILE_CHARACTERISTICS: [Uuid; 5] = [
    legacy::PROFILE_CURRENT,
    legacy::PROFILE_NAME,
    legacy::PROFILE_TEMP,
    legacy::PROFILE_TIME,
    legacy::PROFILE_COLOR,
];

fn test_config() -> Config {
    let mut config = Config::default();
    config.diagnostics.enabled = false;
    config.polling.jitter = Duration::ZERO;
    config
}

async fn connected() -> (Arc<SimulatedDevice>, Session) {
    let device = Arc::new(SimulatedDevice::new(SimConfig::legacy()));
    let session = Session::new(device.clone(), test_config());
    session.connect().await.expect("connect");
    (device, session)
}

/// Operations touching the profile characteristics, in order.
fn profile_ops(device: &SimulatedDevice) -> Vec<SimOp> {
    device
        .log()
        .into_iter()
        .filter(|op| match op {
            SimOp::Read(uuid) | SimOp::Write(uuid, _) => PROFILE_CHARACTERISTICS.contains(uuid),
            _ => false,
        })
        .collect()
}

fn select(index: f32) -> SimOp {
    SimOp::Write(legacy::PROFILE_CURRENT, encode_f32(index).to_vec())
}

fn profile_reads() -> Vec<SimOp> {
    vec![
        SimOp::Read(legacy::PROFILE_NAME),
        SimOp::Read(legacy::PROFILE_TEMP),
        SimOp::Read(legacy::PROFILE_TIME),
        SimOp::Read(legacy::PROFILE_COLOR),
    ]
}

fn set_state(device: &SimulatedDevice, state: OperatingState) {
    device.set_value(
        Field::new(PathKind::OperatingState),
        encode_f32(f32::from(state.code())).to_vec(),
    );
}

// ============================================================================
// Handshake and Bootstrap
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_legacy_unlock() {
    let (device, session) = connected().await;

    let caps = session.capabilities().unwrap();
    assert_eq!(caps.mode, Mode::Legacy);
    assert_eq!(caps.limits, None);

    let key = KeySchedule::access_key(&LEGACY_ACCESS_KEY, &device.seed());
    let log = device.log();
    let seed_read = log
        .iter()
        .position(|op| *op == SimOp::Read(legacy::ACCESS_SEED_KEY))
        .unwrap();
    let key_write = log
        .iter()
        .position(|op| *op == SimOp::Write(legacy::ACCESS_SEED_KEY, key.to_vec()))
        .unwrap();
    assert!(seed_read < key_write);
}

#[tokio::test(start_paused = true)]
async fn test_bootstrap_walks_profiles_and_restores_selection() {
    let (device, session) = connected().await;

    let mut expected = vec![SimOp::Read(legacy::PROFILE_CURRENT)];
    for index in 0..4 {
        expected.push(select(index as f32));
        expected.extend(profile_reads());
    }
    expected.push(select(0.0));
    assert_eq!(profile_ops(&device), expected);

    let snapshot = session.snapshot();
    assert_eq!(snapshot.active_profile, Some(0));
    let emerald = snapshot.profiles[2].as_ref().unwrap();
    assert_eq!(emerald.name, "EMERALD");
    assert_eq!(emerald.temperature, 288.0);
    assert_eq!(emerald.intensity, None);
    assert_eq!(snapshot.identity.firmware.as_deref(), Some("R"));
}

// ============================================================================
// Profiles
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_switch_profile_writes_then_reads() {
    let (device, session) = connected().await;
    device.clear_log();

    session.switch_profile(2).await.unwrap();

    let mut expected = vec![select(2.0)];
    expected.extend(profile_reads());
    assert_eq!(profile_ops(&device), expected);
    assert_eq!(session.snapshot().active_profile, Some(2));
}

#[tokio::test(start_paused = true)]
async fn test_switch_profile_out_of_range() {
    let (device, session) = connected().await;
    device.clear_log();

    let err = session.switch_profile(7).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Protocol(ProtocolError::InvalidProfileIndex(7))
    ));
    assert!(profile_ops(&device).is_empty());
}

// ============================================================================
// Polling
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_polls_pick_up_changes() {
    let (device, session) = connected().await;

    device.set_value(Field::new(PathKind::Battery), encode_f32(42.0).to_vec());
    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert_eq!(session.snapshot().battery, Some(42.0));
    let state_reads = device
        .log()
        .iter()
        .filter(|op| **op == SimOp::Read(legacy::OPERATING_STATE))
        .count();
    assert!(state_reads >= 2);
}

#[tokio::test(start_paused = true)]
async fn test_heating_adds_high_frequency_poll() {
    let (device, session) = connected().await;
    assert_eq!(session.diagnostics().polls, 5);

    set_state(&device, OperatingState::Preheat);
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(session.snapshot().state, OperatingState::Preheat);
    assert!(session.diagnostics().high_frequency);
    assert_eq!(session.diagnostics().polls, 6);

    set_state(&device, OperatingState::Idle);
    tokio::time::sleep(Duration::from_secs(17)).await;
    assert!(!session.diagnostics().high_frequency);
    assert_eq!(session.diagnostics().polls, 5);
}

// ============================================================================
// Raw Access
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_characteristic_get_and_send() {
    let (device, session) = connected().await;

    session.send_command(legacy::LED_BRIGHTNESS, &[17]).await.unwrap();
    assert_eq!(device.characteristic(legacy::LED_BRIGHTNESS), Some(vec![17]));

    let brightness = session.get_value(legacy::LED_BRIGHTNESS).await.unwrap();
    assert_eq!(brightness, Some(vec![17]));
    assert_eq!(session.snapshot().led_brightness, Some(17));

    // Profile characteristics follow the selection and do not touch the snapshot.
    let name = session.get_value(legacy::PROFILE_NAME).await.unwrap();
    assert_eq!(name, Some(b"PEARL".to_vec()));
}

#[tokio::test(start_paused = true)]
async fn test_watch_becomes_poll() {
    let (_device, session) = connected().await;

    session
        .watch(legacy::LED_BRIGHTNESS, Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(session.diagnostics().polls, 6);

    session.unwatch(legacy::LED_BRIGHTNESS).await.unwrap();
    assert_eq!(session.diagnostics().polls, 5);

    let err = session
        .watch("/u/app/hc/0/name", Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Unsupported(_)));
}
