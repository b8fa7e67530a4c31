//! In-memory simulated device.
//!
//! Speaks both firmware families at the GATT level so sessions can be
//! exercised end to end without a radio: Lorax request frames are parsed and
//! answered on the reply characteristic, watches push their value once per
//! watch interval and on every change, and legacy characteristics are plain
//! values. Every operation is recorded in an operation log for assertions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use byteorder::{ByteOrder, LittleEndian};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, trace};
use uuid::Uuid;

use super::gatt::{legacy, lorax};
use super::{GattTransport, TransportEvent};
use crate::crypto::{random_bytes, KeySchedule, ACCESS_KEY_LEN, LEGACY_ACCESS_KEY, LORAX_ACCESS_KEY};
use crate::error::{Error, Result, TransportError};
use crate::protocol::{
    encode_f32, Event, Field, Limits, Opcode, PathKind, Reply, Request, PROFILE_COUNT,
};
use crate::types::{Mode, Rgb};

/// Simulated device behavior.
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub mode: Mode,
    /// Expose the Pup sub-service (Lorax only).
    pub pup: bool,
    /// Refuse the link outright.
    pub refuse_connection: bool,
    /// Fail the pairing diagnostic read.
    pub reject_pairing: bool,
    /// Answer `UNLOCK_ACCESS` with the error flag.
    pub reject_unlock: bool,
    pub limits: Limits,
}

impl SimConfig {
    pub fn lorax() -> Self {
        Self {
            mode: Mode::Lorax,
            pup: false,
            refuse_connection: false,
            reject_pairing: false,
            reject_unlock: false,
            limits: Limits {
                max_payload: 244,
                max_files: 16,
                max_commands: 32,
            },
        }
    }

    pub fn pup() -> Self {
        Self {
            pup: true,
            ..Self::lorax()
        }
    }

    pub fn legacy() -> Self {
        Self {
            mode: Mode::Legacy,
            ..Self::lorax()
        }
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self::lorax()
    }
}

/// Recorded device-side operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimOp {
    Connect,
    Disconnect,
    Read(Uuid),
    Write(Uuid, Vec<u8>),
    /// A Lorax request, with the path it addressed where one could be resolved.
    Request(Opcode, Option<String>),
}

#[derive(Debug, Clone)]
struct SimProfile {
    name: String,
    temperature: f32,
    time_secs: f32,
    color: Rgb,
    intensity: u8,
}

#[derive(Debug)]
struct SimWatch {
    path: String,
    handle: u16,
}

#[derive(Debug)]
struct SimState {
    connected: bool,
    unlocked: bool,
    seed: [u8; ACCESS_KEY_LEN],
    /// Lorax values by path.
    values: HashMap<String, Vec<u8>>,
    /// Legacy values by characteristic.
    characteristics: HashMap<Uuid, Vec<u8>>,
    profiles: Vec<SimProfile>,
    current_profile: usize,
    handles: HashMap<u16, String>,
    next_handle: u16,
    watches: HashMap<u16, SimWatch>,
    next_watch: u16,
    busy_rejections: u32,
    log: Vec<SimOp>,
}

/// Simulated device implementing [`GattTransport`].
pub struct SimulatedDevice {
    config: SimConfig,
    state: Arc<Mutex<SimState>>,
    deliver_events: Arc<AtomicBool>,
    event_tx: broadcast::Sender<TransportEvent>,
}

impl SimulatedDevice {
    /// Create a device with default contents.
    pub fn new(config: SimConfig) -> Self {
        let (event_tx, _) = broadcast::channel(1024);

        let profiles = vec![
            SimProfile {
                name: "PEARL".into(),
                temperature: 232.0,
                time_secs: 30.0,
                color: Rgb::new(0, 0xD5, 0xFF),
                intensity: 1,
            },
            SimProfile {
                name: "CITRINE".into(),
                temperature: 260.0,
                time_secs: 35.0,
                color: Rgb::new(0xFF, 0xB8, 0x00),
                intensity: 2,
            },
            SimProfile {
                name: "EMERALD".into(),
                temperature: 288.0,
                time_secs: 40.0,
                color: Rgb::new(0x00, 0xFF, 0x40),
                intensity: 3,
            },
            SimProfile {
                name: "RUBY".into(),
                temperature: 316.0,
                time_secs: 45.0,
                color: Rgb::new(0xFF, 0x00, 0x20),
                intensity: 4,
            },
        ];

        let mut state = SimState {
            connected: false,
            unlocked: false,
            seed: random_bytes(),
            values: HashMap::new(),
            characteristics: HashMap::new(),
            profiles,
            current_profile: 0,
            handles: HashMap::new(),
            next_handle: 1,
            watches: HashMap::new(),
            next_watch: 0x10,
            busy_rejections: 0,
            log: Vec::new(),
        };
        Self::seed_values(&mut state);

        Self {
            config,
            state: Arc::new(Mutex::new(state)),
            deliver_events: Arc::new(AtomicBool::new(true)),
            event_tx,
        }
    }

    fn seed_values(state: &mut SimState) {
        let lorax_values: Vec<(PathKind, Vec<u8>)> = vec![
            (PathKind::OperatingState, vec![5]),
            (PathKind::HeaterTemp, encode_f32(24.5).to_vec()),
            (PathKind::ElapsedTime, encode_f32(0.0).to_vec()),
            (PathKind::ChamberType, vec![1]),
            (PathKind::Battery, encode_f32(87.0).to_vec()),
            (PathKind::ChargeSource, vec![2]),
            (PathKind::TotalUses, encode_f32(1234.0).to_vec()),
            (PathKind::LedColor, vec![0xFF, 0xFF, 0xFF, 0x00]),
            (PathKind::LedBrightness, vec![200]),
            (PathKind::ActiveProfile, vec![0]),
            (PathKind::DeviceName, b"Peak".to_vec()),
            (PathKind::ModelCode, b"22".to_vec()),
            (PathKind::Firmware, vec![23]),
            (PathKind::GitHash, b"5f3a9c1".to_vec()),
            (PathKind::MacAddress, vec![0x66, 0x55, 0x44, 0x33, 0x22, 0x11]),
            (PathKind::Serial, b"PK2201834".to_vec()),
        ];
        for (kind, value) in lorax_values {
            if let Ok(path) = kind.template(0) {
                state.values.insert(path, value);
            }
        }

        for (index, profile) in state.profiles.clone().iter().enumerate() {
            let entries = [
                (PathKind::ProfileName, profile.name.as_bytes().to_vec()),
                (PathKind::ProfileTemp, encode_f32(profile.temperature).to_vec()),
                (PathKind::ProfileTime, encode_f32(profile.time_secs).to_vec()),
                (PathKind::ProfileColor, profile.color.to_bytes().to_vec()),
                (PathKind::ProfileIntensity, vec![profile.intensity]),
            ];
            for (kind, value) in entries {
                if let Ok(path) = kind.template(index) {
                    state.values.insert(path, value);
                }
            }
        }

        let legacy_values: Vec<(Uuid, Vec<u8>)> = vec![
            (legacy::OPERATING_STATE, encode_f32(5.0).to_vec()),
            (legacy::HEATER_TEMP, encode_f32(24.5).to_vec()),
            (legacy::BATTERY_LEVEL, encode_f32(87.0).to_vec()),
            (legacy::CHARGE_SOURCE, encode_f32(2.0).to_vec()),
            (legacy::TOTAL_DABS, encode_f32(1234.0).to_vec()),
            (legacy::LED_COLOR, vec![0xFF, 0xFF, 0xFF, 0x00]),
            (legacy::LED_BRIGHTNESS, vec![200]),
            (legacy::DEVICE_NAME, b"Peak".to_vec()),
            (legacy::MODEL_NUMBER, b"0".to_vec()),
            (legacy::FIRMWARE_VERSION, b"R".to_vec()),
            (legacy::GIT_HASH, b"0c1d2e3".to_vec()),
        ];
        state.characteristics.extend(legacy_values);
    }

    /// Operation log so far.
    pub fn log(&self) -> Vec<SimOp> {
        self.state.lock().log.clone()
    }

    pub fn clear_log(&self) {
        self.state.lock().log.clear();
    }

    /// Reject the next `count` writes with [`TransportError::Busy`].
    pub fn reject_writes(&self, count: u32) {
        self.state.lock().busy_rejections = count;
    }

    /// Stop (or resume) pushing watch events without dropping the link.
    pub fn set_events_enabled(&self, enabled: bool) {
        self.deliver_events.store(enabled, Ordering::SeqCst);
    }

    /// Number of live watches.
    pub fn watch_count(&self) -> usize {
        self.state.lock().watches.len()
    }

    /// Paths with a live watch.
    pub fn watched_paths(&self) -> Vec<String> {
        let state = self.state.lock();
        let mut paths: Vec<String> = state.watches.values().map(|w| w.path.clone()).collect();
        paths.sort();
        paths
    }

    /// Current access seed.
    pub fn seed(&self) -> [u8; ACCESS_KEY_LEN] {
        self.state.lock().seed
    }

    /// Current value of a legacy characteristic.
    pub fn characteristic(&self, uuid: Uuid) -> Option<Vec<u8>> {
        let state = self.state.lock();
        Self::legacy_value(&state, uuid)
    }

    /// Current value of a Lorax path.
    pub fn value(&self, path: &str) -> Option<Vec<u8>> {
        self.state.lock().values.get(path).cloned()
    }

    /// Change a value on the device side, notifying watchers of the path.
    pub fn set_value(&self, field: Field, value: Vec<u8>) {
        let mut events = Vec::new();
        {
            let mut state = self.state.lock();
            if let Ok(path) = field.path() {
                for (id, watch) in &state.watches {
                    if watch.path == path {
                        events.push(Event::new(*id, value.clone()));
                    }
                }
                state.values.insert(path, value.clone());
            }
            if let Some(uuid) = field.kind.legacy_characteristic() {
                if !field.kind.is_indexed() {
                    state.characteristics.insert(uuid, value);
                }
            }
        }

        if self.deliver_events.load(Ordering::SeqCst) {
            for event in events {
                self.notify(lorax::EVENT, event.encode());
            }
        }
    }

    /// Drop the link as if the device walked out of range.
    pub fn drop_link(&self) {
        self.state.lock().connected = false;
        let _ = self.event_tx.send(TransportEvent::Disconnected);
    }

    fn notify(&self, characteristic: Uuid, value: Vec<u8>) {
        let _ = self.event_tx.send(TransportEvent::Notification {
            characteristic,
            value,
        });
    }

    /// Push the watched value every interval for as long as the watch lives.
    fn spawn_watch_pump(&self, id: u16, interval: Duration) {
        let state = Arc::clone(&self.state);
        let enabled = Arc::clone(&self.deliver_events);
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            loop {
                ticker.tick().await;
                let value = {
                    let state = state.lock();
                    let Some(watch) = state.watches.get(&id) else {
                        break;
                    };
                    state.values.get(&watch.path).cloned()
                };
                if let (true, Some(value)) = (enabled.load(Ordering::SeqCst), value) {
                    let _ = event_tx.send(TransportEvent::Notification {
                        characteristic: lorax::EVENT,
                        value: Event::new(id, value).encode(),
                    });
                }
            }
        });
    }

    fn legacy_value(state: &SimState, uuid: Uuid) -> Option<Vec<u8>> {
        let profile = state.profiles.get(state.current_profile)?;
        match uuid {
            u if u == legacy::PROFILE_CURRENT => {
                Some(encode_f32(state.current_profile as f32).to_vec())
            }
            u if u == legacy::PROFILE_NAME => Some(profile.name.as_bytes().to_vec()),
            u if u == legacy::PROFILE_TEMP => Some(encode_f32(profile.temperature).to_vec()),
            u if u == legacy::PROFILE_TIME => Some(encode_f32(profile.time_secs).to_vec()),
            u if u == legacy::PROFILE_COLOR => Some(profile.color.to_bytes().to_vec()),
            other => state.characteristics.get(&other).cloned(),
        }
    }

    fn services_for(&self) -> Vec<Uuid> {
        match self.config.mode {
            Mode::Lorax => {
                let sub = if self.config.pup {
                    lorax::PUP_SERVICE
                } else {
                    lorax::OTA_SERVICE
                };
                vec![lorax::SERVICE, sub]
            }
            Mode::Legacy => vec![legacy::SERVICE, legacy::MODEL_INFO_SERVICE],
        }
    }

    /// Handle one Lorax request frame and produce the reply.
    fn handle_request(&self, state: &mut SimState, request: &Request) -> Reply {
        let seq = request.sequence;
        let payload = &request.payload;
        let locked = !state.unlocked;

        match request.opcode {
            Opcode::GetLimits => {
                let limits = self.config.limits;
                let mut data = vec![limits.max_payload, 0, 0, 0, 0];
                LittleEndian::write_u16(&mut data[1..3], limits.max_files);
                LittleEndian::write_u16(&mut data[3..5], limits.max_commands);
                state.log.push(SimOp::Request(Opcode::GetLimits, None));
                Reply::ok(seq, data)
            }
            Opcode::GetAccessSeed => {
                state.log.push(SimOp::Request(Opcode::GetAccessSeed, None));
                Reply::ok(seq, state.seed.to_vec())
            }
            Opcode::UnlockAccess => {
                state.log.push(SimOp::Request(Opcode::UnlockAccess, None));
                let expected = KeySchedule::access_key(&LORAX_ACCESS_KEY, &state.seed);
                if self.config.reject_unlock || payload.as_slice() != expected {
                    return Reply::failed(seq);
                }
                state.unlocked = true;
                Reply::ok(seq, Vec::new())
            }
            Opcode::ReadShort => {
                let path = String::from_utf8_lossy(payload.get(4..).unwrap_or_default()).into_owned();
                state.log.push(SimOp::Request(Opcode::ReadShort, Some(path.clone())));
                match state.values.get(&path) {
                    Some(value) if !locked => Reply::ok(seq, value.clone()),
                    _ => Reply::failed(seq),
                }
            }
            Opcode::WriteShort => {
                let body = payload.get(3..).unwrap_or_default();
                let Some(split) = body.iter().position(|b| *b == 0) else {
                    return Reply::failed(seq);
                };
                let path = String::from_utf8_lossy(&body[..split]).into_owned();
                let value = body[split + 1..].to_vec();
                state.log.push(SimOp::Request(Opcode::WriteShort, Some(path.clone())));
                if locked || !state.values.contains_key(&path) {
                    return Reply::failed(seq);
                }
                state.values.insert(path, value);
                Reply::ok(seq, Vec::new())
            }
            Opcode::Open => {
                let path = String::from_utf8_lossy(payload).into_owned();
                state.log.push(SimOp::Request(Opcode::Open, Some(path.clone())));
                if locked || !state.values.contains_key(&path) {
                    return Reply::failed(seq);
                }
                let handle = state.next_handle;
                state.next_handle = state.next_handle.wrapping_add(1).max(1);
                state.handles.insert(handle, path);
                Reply::ok(seq, vec![handle as u8])
            }
            Opcode::Close => {
                let handle = payload.get(..2).map_or(0, LittleEndian::read_u16);
                let path = state.handles.remove(&handle);
                state.log.push(SimOp::Request(Opcode::Close, path.clone()));
                if path.is_none() {
                    return Reply::failed(seq);
                }
                state.watches.retain(|_, w| w.handle != handle);
                Reply::ok(seq, Vec::new())
            }
            Opcode::Watch => {
                let handle = payload.get(..2).map_or(0, LittleEndian::read_u16);
                if handle == 0 {
                    state.log.push(SimOp::Request(Opcode::Watch, None));
                    return Reply::ok(seq, Vec::new());
                }
                let Some(path) = state.handles.get(&handle).cloned() else {
                    state.log.push(SimOp::Request(Opcode::Watch, None));
                    return Reply::failed(seq);
                };
                state.log.push(SimOp::Request(Opcode::Watch, Some(path.clone())));
                let id = state.next_watch;
                state.next_watch = state.next_watch.wrapping_add(1);
                state.watches.insert(id, SimWatch { path, handle });

                let interval_ms = payload.get(4..6).map_or(1000, LittleEndian::read_u16);
                self.spawn_watch_pump(id, Duration::from_millis(u64::from(interval_ms.max(1))));
                Reply::ok(seq, id.to_le_bytes().to_vec())
            }
            other => {
                state.log.push(SimOp::Request(other, None));
                Reply::failed(seq)
            }
        }
    }
}

#[async_trait]
impl GattTransport for SimulatedDevice {
    async fn connect(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.log.push(SimOp::Connect);
        if self.config.refuse_connection {
            return Err(Error::ConnectFailed("connection refused by peer".into()));
        }
        state.connected = true;
        state.unlocked = false;
        state.seed = random_bytes();
        debug!("Simulated {} device connected", self.config.mode);
        Ok(())
    }

    async fn services(&self) -> Result<Vec<Uuid>> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected.into());
        }
        Ok(self.services_for())
    }

    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(TransportError::NotConnected.into());
        }
        state.log.push(SimOp::Read(characteristic));

        if characteristic == lorax::PUP_DIAGNOSTIC || characteristic == lorax::OTA_DIAGNOSTIC {
            if self.config.reject_pairing {
                return Err(TransportError::PairingRejected("user declined".into()).into());
            }
            return Ok(vec![0]);
        }
        if characteristic == lorax::VERSION {
            return Ok(b"1".to_vec());
        }
        if characteristic == legacy::ACCESS_SEED_KEY {
            return Ok(state.seed.to_vec());
        }
        if !state.unlocked {
            return Err(TransportError::ReadFailed("device locked".into()).into());
        }

        Self::legacy_value(&state, characteristic)
            .ok_or_else(|| TransportError::CharacteristicNotFound(characteristic).into())
    }

    async fn write(&self, characteristic: Uuid, value: &[u8]) -> Result<()> {
        let reply = {
            let mut state = self.state.lock();
            if !state.connected {
                return Err(TransportError::NotConnected.into());
            }
            if state.busy_rejections > 0 {
                state.busy_rejections -= 1;
                trace!("Simulated busy rejection");
                return Err(TransportError::Busy.into());
            }

            if characteristic == lorax::COMMAND {
                let request = Request::decode(value)
                    .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
                Some(self.handle_request(&mut state, &request))
            } else {
                state.log.push(SimOp::Write(characteristic, value.to_vec()));
                if characteristic == legacy::ACCESS_SEED_KEY {
                    let expected = KeySchedule::access_key(&LEGACY_ACCESS_KEY, &state.seed);
                    state.unlocked = value == expected;
                } else if !state.unlocked {
                    return Err(TransportError::WriteFailed("device locked".into()).into());
                } else if characteristic == legacy::PROFILE_CURRENT {
                    let index = crate::protocol::decode_f32(value)
                        .filter(|v| *v >= 0.0 && (*v as usize) < PROFILE_COUNT)
                        .ok_or_else(|| TransportError::WriteFailed("bad profile index".into()))?;
                    state.current_profile = index as usize;
                } else {
                    state.characteristics.insert(characteristic, value.to_vec());
                }
                None
            }
        };

        if let Some(reply) = reply {
            self.notify(lorax::REPLY, reply.encode());
        }
        Ok(())
    }

    async fn subscribe(&self, characteristic: Uuid) -> Result<()> {
        if characteristic != lorax::REPLY && characteristic != lorax::EVENT {
            return Err(TransportError::SubscribeFailed(format!(
                "{characteristic} does not notify"
            ))
            .into());
        }
        Ok(())
    }

    fn events(&self) -> broadcast::Receiver<TransportEvent> {
        self.event_tx.subscribe()
    }

    async fn disconnect(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.connected {
            state.connected = false;
            state.log.push(SimOp::Disconnect);
            state.handles.clear();
            state.watches.clear();
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    fn transport_type(&self) -> &'static str {
        "sim"
    }
}

impl std::fmt::Debug for SimulatedDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedDevice")
            .field("mode", &self.config.mode)
            .field("pup", &self.config.pup)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Sequence;

    fn frame(seq: u16, opcode: Opcode, payload: Vec<u8>) -> Vec<u8> {
        Request::new(Sequence(seq), opcode, payload).encode()
    }

    fn next_reply(rx: &mut broadcast::Receiver<TransportEvent>) -> Reply {
        match rx.try_recv().unwrap() {
            TransportEvent::Notification { characteristic, value } => {
                assert_eq!(characteristic, lorax::REPLY);
                Reply::decode(&value).unwrap()
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_lorax_unlock_gates_reads() {
        let device = SimulatedDevice::new(SimConfig::lorax());
        let mut rx = device.events();
        device.connect().await.unwrap();

        let read = crate::protocol::read_short_payload(128, "/p/bat/soc").unwrap();
        device
            .write(lorax::COMMAND, &frame(1, Opcode::ReadShort, read.clone()))
            .await
            .unwrap();
        assert!(next_reply(&mut rx).error);

        let key = KeySchedule::access_key(&LORAX_ACCESS_KEY, &device.seed());
        device
            .write(lorax::COMMAND, &frame(2, Opcode::UnlockAccess, key.to_vec()))
            .await
            .unwrap();
        assert!(!next_reply(&mut rx).error);

        device
            .write(lorax::COMMAND, &frame(3, Opcode::ReadShort, read))
            .await
            .unwrap();
        let reply = next_reply(&mut rx);
        assert_eq!(reply.sequence, Sequence(3));
        assert_eq!(reply.data, encode_f32(87.0).to_vec());
    }

    #[tokio::test]
    async fn test_legacy_profile_selection() {
        let device = SimulatedDevice::new(SimConfig::legacy());
        device.connect().await.unwrap();
        let key = KeySchedule::access_key(&LEGACY_ACCESS_KEY, &device.seed());
        device.write(legacy::ACCESS_SEED_KEY, &key).await.unwrap();

        device
            .write(legacy::PROFILE_CURRENT, &encode_f32(2.0))
            .await
            .unwrap();
        let name = device.read(legacy::PROFILE_NAME).await.unwrap();
        assert_eq!(name, b"EMERALD");
    }

    #[tokio::test]
    async fn test_busy_rejection() {
        let device = SimulatedDevice::new(SimConfig::legacy());
        device.connect().await.unwrap();
        device.reject_writes(1);

        let err = device.write(legacy::LED_BRIGHTNESS, &[1]).await.unwrap_err();
        assert!(matches!(err, Error::Transport(TransportError::Busy)));
    }
}
