//! End-to-end tests for Lorax firmware sessions.
//!
//! Every test drives a real [`Session`] against the in-memory simulated
//! device and asserts on the device-side operation log.

use std::sync::Arc;
use std::time::Duration;

use lorax::config::Config;
use lorax::protocol::{encode_f32, Field, Opcode, PathKind};
use lorax::session::Session;
use lorax::transport::gatt::lorax as lorax_gatt;
use lorax::transport::{SimConfig, SimOp, SimulatedDevice};
use lorax::types::{Mode, OperatingState, StateDelta};

// ============================================================================
// Test Infrastructure
// ============================================================================

const STATE_PATH: &str = "/p/app/stat/id";
const TEMP_PATH: &str = "/p/app/htr/temp";

fn test_config() -> Config {
    let mut config = Config::default();
    config.diagnostics.enabled = false;
    config.polling.jitter = Duration::ZERO;
    config
}

async fn connected(sim: SimConfig) -> (Arc<SimulatedDevice>, Session) {
    let device = Arc::new(SimulatedDevice::new(sim));
    let session = Session::new(device.clone(), test_config());
    session.connect().await.expect("connect");
    (device, session)
}

/// Let the listener and side-effect tasks catch up.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

fn position(log: &[SimOp], op: &SimOp) -> usize {
    log.iter()
        .position(|o| o == op)
        .unwrap_or_else(|| panic!("{op:?} not in log"))
}

fn count(log: &[SimOp], op: &SimOp) -> usize {
    log.iter().filter(|o| *o == op).count()
}

fn set_state(device: &SimulatedDevice, state: OperatingState) {
    device.set_value(Field::new(PathKind::OperatingState), vec![state.code()]);
}

// ============================================================================
// Connect, Handshake and Bootstrap
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_connect_handshake_order() {
    let (device, session) = connected(SimConfig::lorax()).await;

    let caps = session.capabilities().unwrap();
    assert_eq!(caps.mode, Mode::Lorax);
    assert!(!caps.pup);
    assert_eq!(caps.limits.unwrap().max_payload, 244);

    let log = device.log();
    let connect = position(&log, &SimOp::Connect);
    let pairing_read = position(&log, &SimOp::Read(lorax_gatt::OTA_DIAGNOSTIC));
    let limits = position(&log, &SimOp::Request(Opcode::GetLimits, None));
    let seed = position(&log, &SimOp::Request(Opcode::GetAccessSeed, None));
    let unlock = position(&log, &SimOp::Request(Opcode::UnlockAccess, None));
    assert!(connect < pairing_read && pairing_read < limits && limits < seed && seed < unlock);

    // Nothing path-addressed before the unlock.
    assert!(log[..unlock]
        .iter()
        .all(|op| !matches!(op, SimOp::Request(_, Some(_)))));
}

#[tokio::test(start_paused = true)]
async fn test_pup_device_reads_pup_diagnostic() {
    let (device, session) = connected(SimConfig::pup()).await;

    assert!(session.capabilities().unwrap().pup);
    assert!(device
        .log()
        .contains(&SimOp::Read(lorax_gatt::PUP_DIAGNOSTIC)));
}

#[tokio::test(start_paused = true)]
async fn test_bootstrap_fills_snapshot() {
    let (_device, session) = connected(SimConfig::lorax()).await;
    let snapshot = session.snapshot();

    assert_eq!(snapshot.identity.name.as_deref(), Some("Peak"));
    assert_eq!(snapshot.identity.firmware.as_deref(), Some("X"));
    assert_eq!(snapshot.identity.mac.as_deref(), Some("11:22:33:44:55:66"));
    assert_eq!(snapshot.identity.serial.as_deref(), Some("PK2201834"));
    assert_eq!(snapshot.state, OperatingState::Idle);
    assert_eq!(snapshot.battery, Some(87.0));
    assert_eq!(snapshot.total_uses, Some(1234));
    assert_eq!(snapshot.active_profile, Some(0));

    let names: Vec<_> = snapshot
        .profiles
        .iter()
        .map(|p| p.as_ref().map(|p| p.name.as_str()))
        .collect();
    assert_eq!(
        names,
        vec![Some("PEARL"), Some("CITRINE"), Some("EMERALD"), Some("RUBY")]
    );
    let ruby = snapshot.profiles[3].as_ref().unwrap();
    assert_eq!(ruby.temperature, 316.0);
    assert_eq!(ruby.time, Duration::from_secs(45));
    assert_eq!(ruby.intensity, Some(4));
}

#[tokio::test(start_paused = true)]
async fn test_bootstrap_reads_profiles_round_robin() {
    let (device, _session) = connected(SimConfig::lorax()).await;

    let profile_reads: Vec<String> = device
        .log()
        .into_iter()
        .filter_map(|op| match op {
            SimOp::Request(Opcode::ReadShort, Some(path)) if path.starts_with("/u/app/hc/") => {
                Some(path)
            }
            _ => None,
        })
        .collect();

    let expected: Vec<String> = (0..4)
        .flat_map(|i| {
            ["name", "temp", "time", "colr", "intn"]
                .into_iter()
                .map(move |leaf| format!("/u/app/hc/{i}/{leaf}"))
        })
        .collect();
    assert_eq!(profile_reads, expected);
}

#[tokio::test(start_paused = true)]
async fn test_ambient_watches_opened() {
    let (device, session) = connected(SimConfig::lorax()).await;

    assert_eq!(
        device.watched_paths(),
        vec!["/p/app/odom/0/nc", STATE_PATH, "/p/bat/chg/src", "/p/bat/soc"]
    );
    assert_eq!(session.diagnostics().watched_paths.len(), 4);
}

// ============================================================================
// Values and Watches
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_get_and_send_roundtrip() {
    let (device, session) = connected(SimConfig::lorax()).await;

    session.send_command("/u/app/ui/lbrt", &[42]).await.unwrap();
    assert_eq!(device.value("/u/app/ui/lbrt"), Some(vec![42]));

    let value = session.get_value("/u/app/ui/lbrt").await.unwrap();
    assert_eq!(value, Some(vec![42]));
    assert_eq!(session.snapshot().led_brightness, Some(42));

    // Unknown paths answer with the error flag.
    assert_eq!(session.get_value("/p/nope").await.unwrap(), None);
    assert!(session.send_command("/p/nope", &[1]).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_watch_twice_keeps_single_watch() {
    let (device, session) = connected(SimConfig::lorax()).await;

    session.watch("/u/app/ui/colr", Duration::from_millis(500)).await.unwrap();
    session.watch("/u/app/ui/colr", Duration::from_millis(500)).await.unwrap();

    let colr = device
        .watched_paths()
        .into_iter()
        .filter(|p| p == "/u/app/ui/colr")
        .count();
    assert_eq!(colr, 1);
}

#[tokio::test(start_paused = true)]
async fn test_unwatch_unopened_path_is_noop() {
    let (device, session) = connected(SimConfig::lorax()).await;
    device.clear_log();

    session.unwatch("/u/app/ui/colr").await.unwrap();
    settle().await;
    assert!(device
        .log()
        .iter()
        .all(|op| !matches!(op, SimOp::Request(Opcode::Close | Opcode::Watch, _))));
}

#[tokio::test(start_paused = true)]
async fn test_watch_events_reach_subscribers() {
    let (device, session) = connected(SimConfig::lorax()).await;
    let mut deltas = session.subscribe();

    device.set_value(Field::new(PathKind::Battery), encode_f32(55.0).to_vec());
    settle().await;

    let mut saw = false;
    while let Ok(delta) = deltas.try_recv() {
        if delta == StateDelta::Battery(55.0) {
            saw = true;
        }
    }
    assert!(saw);
    assert_eq!(session.snapshot().battery, Some(55.0));
}

#[tokio::test(start_paused = true)]
async fn test_switch_profile_lorax() {
    let (device, session) = connected(SimConfig::lorax()).await;
    device.clear_log();

    session.switch_profile(3).await.unwrap();

    let log = device.log();
    let write = position(
        &log,
        &SimOp::Request(Opcode::WriteShort, Some("/p/app/hcs".into())),
    );
    let read = position(
        &log,
        &SimOp::Request(Opcode::ReadShort, Some("/u/app/hc/3/name".into())),
    );
    assert!(write < read);
    assert_eq!(device.value("/p/app/hcs"), Some(vec![3]));
    assert_eq!(session.snapshot().active_profile, Some(3));

    assert!(session.switch_profile(4).await.is_err());
}

// ============================================================================
// Heating Side Effects
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_preheat_opens_high_frequency_watches() {
    let (device, session) = connected(SimConfig::lorax()).await;

    set_state(&device, OperatingState::Preheat);
    settle().await;

    let watched = device.watched_paths();
    for path in ["/p/app/stat/elap", "/p/htr/chmt", TEMP_PATH] {
        assert!(watched.iter().any(|p| p == path), "{path} not watched");
    }
    assert!(session.diagnostics().high_frequency);
}

#[tokio::test(start_paused = true)]
async fn test_idle_closes_watches_after_debounce() {
    let (device, session) = connected(SimConfig::lorax()).await;

    set_state(&device, OperatingState::Preheat);
    settle().await;
    set_state(&device, OperatingState::Idle);
    settle().await;

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(device.watched_paths().iter().any(|p| p == TEMP_PATH));

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(!device.watched_paths().iter().any(|p| p == TEMP_PATH));
    assert!(!session.diagnostics().high_frequency);
}

#[tokio::test(start_paused = true)]
async fn test_preheat_bounce_does_not_reopen() {
    let (device, _session) = connected(SimConfig::lorax()).await;
    device.clear_log();

    set_state(&device, OperatingState::Preheat);
    settle().await;
    set_state(&device, OperatingState::Idle);
    settle().await;
    tokio::time::sleep(Duration::from_secs(5)).await;
    set_state(&device, OperatingState::Preheat);
    settle().await;
    tokio::time::sleep(Duration::from_secs(20)).await;

    let log = device.log();
    let temp_open = SimOp::Request(Opcode::Open, Some(TEMP_PATH.into()));
    let temp_close = SimOp::Request(Opcode::Close, Some(TEMP_PATH.into()));
    assert_eq!(count(&log, &temp_open), 1);
    assert_eq!(count(&log, &temp_close), 0);
    assert!(device.watched_paths().iter().any(|p| p == TEMP_PATH));
}

#[tokio::test(start_paused = true)]
async fn test_heater_temp_filtering() {
    let (device, session) = connected(SimConfig::lorax()).await;
    let mut deltas = session.subscribe();

    for temp in [0.0_f32, 1500.0, 350.0] {
        device.set_value(Field::new(PathKind::HeaterTemp), encode_f32(temp).to_vec());
        session.get_value(TEMP_PATH).await.unwrap();
    }

    let mut temps = Vec::new();
    while let Ok(delta) = deltas.try_recv() {
        if let StateDelta::HeaterTemp(t) = delta {
            temps.push(t);
        }
    }
    // The ambient temperature poll may also land a reading in between.
    assert!(!temps.contains(&0.0) && !temps.contains(&1500.0));
    assert_eq!(temps.last(), Some(&350.0));
    assert_eq!(session.snapshot().heater_temp, Some(350.0));
}

#[tokio::test(start_paused = true)]
async fn test_total_uses_emitted_only_on_change() {
    let (device, session) = connected(SimConfig::lorax()).await;
    let mut deltas = session.subscribe();

    // The ambient watch keeps re-sending 1234; only the change gets through.
    tokio::time::sleep(Duration::from_secs(3)).await;
    device.set_value(Field::new(PathKind::TotalUses), encode_f32(1235.0).to_vec());
    tokio::time::sleep(Duration::from_secs(3)).await;

    let mut uses = Vec::new();
    while let Ok(delta) = deltas.try_recv() {
        if let StateDelta::TotalUses(n) = delta {
            uses.push(n);
        }
    }
    assert_eq!(uses, vec![1235]);
}
