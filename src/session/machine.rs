//! Device state machine.
//!
//! Folds decoded values into a [`DeviceStateSnapshot`], publishes typed
//! deltas, and asks the session to open or close high-frequency watches as
//! the device starts and stops heating.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::context::SessionContext;
use super::decode::decode;
use crate::protocol::{Field, PROFILE_COUNT};
use crate::types::{DeviceStateSnapshot, Mode, OperatingState, StateDelta};

/// Heater temperatures outside this open range are sensor noise.
const HEATER_TEMP_RANGE: (f32, f32) = (1.0, 1000.0);

/// Work the session performs on behalf of the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    /// Pause ambient reads and open high-frequency watches.
    EnterHighFrequency,
    /// Close high-frequency watches and resume ambient reads.
    LeaveHighFrequency,
}

#[derive(Default)]
struct HighFrequency {
    active: bool,
    close_timer: Option<JoinHandle<()>>,
}

/// Snapshot owner and transition logic.
pub struct DeviceMachine {
    snapshot: RwLock<DeviceStateSnapshot>,
    high_frequency: Mutex<HighFrequency>,
    debounce: Duration,
    context: Arc<dyn SessionContext>,
    delta_tx: broadcast::Sender<StateDelta>,
    effect_tx: mpsc::UnboundedSender<SideEffect>,
}

impl DeviceMachine {
    pub fn new(
        debounce: Duration,
        context: Arc<dyn SessionContext>,
        effect_tx: mpsc::UnboundedSender<SideEffect>,
    ) -> Self {
        let (delta_tx, _) = broadcast::channel(256);
        Self {
            snapshot: RwLock::new(DeviceStateSnapshot::default()),
            high_frequency: Mutex::new(HighFrequency::default()),
            debounce,
            context,
            delta_tx,
            effect_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateDelta> {
        self.delta_tx.subscribe()
    }

    pub fn snapshot(&self) -> DeviceStateSnapshot {
        self.snapshot.read().clone()
    }

    pub fn state(&self) -> OperatingState {
        self.snapshot.read().state
    }

    pub fn is_high_frequency(&self) -> bool {
        self.high_frequency.lock().active
    }

    /// Decode a raw value and apply it.
    pub fn apply(self: &Arc<Self>, field: Field, mode: Mode, data: &[u8]) -> Option<StateDelta> {
        let Some(delta) = decode(field, mode, data) else {
            debug!("Undecodable value for {} ({} bytes)", field, data.len());
            return None;
        };
        self.apply_delta(delta.clone()).then_some(delta)
    }

    /// Apply a typed delta. Returns `false` when the delta was filtered out.
    pub fn apply_delta(self: &Arc<Self>, delta: StateDelta) -> bool {
        let transition = {
            let mut snap = self.snapshot.write();
            match &delta {
                StateDelta::OperatingState(next) => {
                    let prev = std::mem::replace(&mut snap.state, *next);
                    (prev != *next).then_some((prev, *next))
                }
                StateDelta::HeaterTemp(temp) => {
                    let (low, high) = HEATER_TEMP_RANGE;
                    if !(*temp > low && *temp < high) {
                        trace!("Dropping heater temperature {}", temp);
                        return false;
                    }
                    snap.heater_temp = Some(*temp);
                    None
                }
                StateDelta::TotalUses(uses) => {
                    if snap.total_uses == Some(*uses) {
                        return false;
                    }
                    snap.total_uses = Some(*uses);
                    None
                }
                StateDelta::Elapsed(elapsed) => {
                    snap.elapsed = Some(*elapsed);
                    None
                }
                StateDelta::Chamber(chamber) => {
                    snap.chamber = Some(*chamber);
                    None
                }
                StateDelta::Battery(level) => {
                    snap.battery = Some(*level);
                    None
                }
                StateDelta::ChargeSource(source) => {
                    snap.charge_source = Some(*source);
                    None
                }
                StateDelta::LedColor(color) => {
                    snap.led_color = Some(*color);
                    None
                }
                StateDelta::LedBrightness(level) => {
                    snap.led_brightness = Some(*level);
                    None
                }
                StateDelta::ActiveProfile(index) => {
                    if *index >= PROFILE_COUNT {
                        return false;
                    }
                    snap.active_profile = Some(*index);
                    None
                }
                StateDelta::DeviceName(v) => {
                    snap.identity.name = Some(v.clone());
                    None
                }
                StateDelta::Model(v) => {
                    snap.identity.model = Some(v.clone());
                    None
                }
                StateDelta::Firmware(v) => {
                    snap.identity.firmware = Some(v.clone());
                    None
                }
                StateDelta::GitHash(v) => {
                    snap.identity.git_hash = Some(v.clone());
                    None
                }
                StateDelta::Mac(v) => {
                    snap.identity.mac = Some(v.clone());
                    None
                }
                StateDelta::Serial(v) => {
                    snap.identity.serial = Some(v.clone());
                    None
                }
                StateDelta::ProfileName { index, name } => {
                    let Some(slot) = snap.profiles.get_mut(*index) else {
                        return false;
                    };
                    slot.get_or_insert_with(Default::default).name = name.clone();
                    None
                }
                StateDelta::ProfileTemp { index, temperature } => {
                    let Some(slot) = snap.profiles.get_mut(*index) else {
                        return false;
                    };
                    slot.get_or_insert_with(Default::default).temperature = *temperature;
                    None
                }
                StateDelta::ProfileTime { index, time } => {
                    let Some(slot) = snap.profiles.get_mut(*index) else {
                        return false;
                    };
                    slot.get_or_insert_with(Default::default).time = *time;
                    None
                }
                StateDelta::ProfileColor { index, color } => {
                    let Some(slot) = snap.profiles.get_mut(*index) else {
                        return false;
                    };
                    slot.get_or_insert_with(Default::default).color = *color;
                    None
                }
                StateDelta::ProfileIntensity { index, intensity } => {
                    let Some(slot) = snap.profiles.get_mut(*index) else {
                        return false;
                    };
                    slot.get_or_insert_with(Default::default).intensity = Some(*intensity);
                    None
                }
            }
        };

        // No subscribers is fine.
        let _ = self.delta_tx.send(delta);

        if let Some((prev, next)) = transition {
            self.on_transition(prev, next);
        }
        true
    }

    fn on_transition(self: &Arc<Self>, prev: OperatingState, next: OperatingState) {
        debug!("Operating state {:?} -> {:?}", prev, next);
        let mut hf = self.high_frequency.lock();

        if next.is_heating() {
            if let Some(timer) = hf.close_timer.take() {
                timer.abort();
                debug!("Heating resumed within debounce, keeping high-frequency watches");
            }
            if !hf.active {
                if self.context.high_frequency_allowed() {
                    hf.active = true;
                    self.emit(SideEffect::EnterHighFrequency);
                } else {
                    debug!("High-frequency updates not allowed by host");
                }
            }
        } else if next.is_idle_equivalent() && hf.active && hf.close_timer.is_none() {
            // Keyed on the target state alone: a timer that expired during
            // TempSelect must be re-armed by the next idle state.
            let machine: Weak<Self> = Arc::downgrade(self);
            let debounce = self.debounce;
            hf.close_timer = Some(tokio::spawn(async move {
                tokio::time::sleep(debounce).await;
                if let Some(machine) = machine.upgrade() {
                    machine.close_high_frequency();
                }
            }));
        }
    }

    fn close_high_frequency(&self) {
        let mut hf = self.high_frequency.lock();
        hf.close_timer = None;
        if hf.active && self.state().is_idle_equivalent() {
            hf.active = false;
            self.emit(SideEffect::LeaveHighFrequency);
        }
    }

    fn emit(&self, effect: SideEffect) {
        if self.effect_tx.send(effect).is_err() {
            trace!("Side effect {:?} dropped, session gone", effect);
        }
    }

    /// Cancel pending timers and forget high-frequency state.
    pub fn reset(&self) {
        let mut hf = self.high_frequency.lock();
        if let Some(timer) = hf.close_timer.take() {
            timer.abort();
        }
        hf.active = false;
    }
}

impl Drop for DeviceMachine {
    fn drop(&mut self) {
        if let Some(timer) = self.high_frequency.get_mut().close_timer.take() {
            timer.abort();
        }
    }
}
