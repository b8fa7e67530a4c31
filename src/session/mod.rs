//! Device session engine.
//!
//! A [`Session`] owns one link to one device. It negotiates the firmware
//! family, unlocks access, bootstraps identity and profiles, and then keeps
//! the [`DeviceStateSnapshot`] current through watches (Lorax) or polls
//! (legacy), publishing every accepted change as a [`StateDelta`].
//!
//! ```text
//!  transport events ──► listener ──┬─► dispatcher (replies)
//!                                  └─► registry ─► machine ─► deltas
//!                                                     │
//!                                                     └─► side effects
//! ```

mod context;
mod decode;
mod diagnostics;
mod dispatcher;
mod handshake;
mod machine;
mod negotiate;
mod poller;
mod registry;
mod watchdog;

pub use context::{NullContext, SessionContext};
pub use diagnostics::DiagnosticsReport;
pub use machine::SideEffect;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{Error, ProtocolError, Result};
use crate::protocol::{
    encode_f32, read_short_payload, write_short_payload, Event, Field, Opcode, PathKind,
    PROFILE_COUNT,
};
use crate::transport::gatt::{legacy, lorax};
use crate::transport::{GattTransport, TransportEvent};
use crate::types::{Address, Capabilities, DeviceStateSnapshot, Mode, StateDelta};

use dispatcher::Dispatcher;
use machine::DeviceMachine;
use poller::{PollSource, Poller};
use registry::PathRegistry;
use watchdog::{WatchRepair, Watchdog};

/// Watched while heating.
const HIGH_FREQUENCY_KINDS: [PathKind; 3] = [
    PathKind::ElapsedTime,
    PathKind::ChamberType,
    PathKind::HeaterTemp,
];

/// Watched at the ambient rate for the lifetime of a Lorax session.
const AMBIENT_KINDS: [PathKind; 3] = [
    PathKind::Battery,
    PathKind::ChargeSource,
    PathKind::TotalUses,
];

/// Polled for the lifetime of a legacy session.
const LEGACY_POLLED_KINDS: [PathKind; 4] = [
    PathKind::OperatingState,
    PathKind::Battery,
    PathKind::ChargeSource,
    PathKind::TotalUses,
];

const POLL_AMBIENT_TEMP: &str = "ambient-temp";
const POLL_HIGH_FREQUENCY_TEMP: &str = "high-frequency-temp";

/// Connection to a single device.
pub struct Session {
    inner: Arc<Inner>,
}

struct Inner {
    config: Config,
    transport: Arc<dyn GattTransport>,
    live: AtomicBool,
    capabilities: RwLock<Option<Capabilities>>,
    dispatcher: Dispatcher,
    registry: PathRegistry,
    poller: Poller,
    watchdog: Watchdog,
    machine: Arc<DeviceMachine>,
    effect_rx: Mutex<Option<mpsc::UnboundedReceiver<SideEffect>>>,
    /// Interval and value length of every watch the session wants open.
    watch_specs: DashMap<String, (Duration, u16)>,
    profile_lock: tokio::sync::Mutex<()>,
    diagnostics_tx: broadcast::Sender<DiagnosticsReport>,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    connected_at: Mutex<Option<Instant>>,
}

impl Session {
    /// Create a session with a permissive host context.
    pub fn new(transport: Arc<dyn GattTransport>, config: Config) -> Self {
        Self::with_context(transport, config, Arc::new(NullContext))
    }

    /// Create a session that consults `context` for host policy.
    pub fn with_context(
        transport: Arc<dyn GattTransport>,
        config: Config,
        context: Arc<dyn SessionContext>,
    ) -> Self {
        let (effect_tx, effect_rx) = mpsc::unbounded_channel();
        let (diagnostics_tx, _) = broadcast::channel(16);
        let (shutdown_tx, _) = broadcast::channel(1);

        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            let poll_source: Weak<dyn PollSource> = weak.clone();
            let repair: Weak<dyn WatchRepair> = weak.clone();

            Inner {
                dispatcher: Dispatcher::new(
                    Arc::clone(&transport),
                    config.session.max_busy_retries,
                    config.session.reply_timeout,
                ),
                registry: PathRegistry::new(),
                poller: Poller::new(poll_source, config.polling.jitter),
                watchdog: Watchdog::new(repair, config.watch.rewatch_delay),
                machine: Arc::new(DeviceMachine::new(
                    config.session.idle_debounce,
                    context,
                    effect_tx,
                )),
                effect_rx: Mutex::new(Some(effect_rx)),
                watch_specs: DashMap::new(),
                profile_lock: tokio::sync::Mutex::new(()),
                live: AtomicBool::new(false),
                capabilities: RwLock::new(None),
                diagnostics_tx,
                shutdown_tx,
                tasks: Mutex::new(Vec::new()),
                connected_at: Mutex::new(None),
                transport,
                config,
            }
        });

        Self { inner }
    }

    /// Connect, negotiate, unlock and start receiving updates.
    ///
    /// Link and pairing failures surface as [`Error::ConnectFailed`]; a
    /// rejected access key as [`Error::HandshakeFailed`].
    pub async fn connect(&self) -> Result<Capabilities> {
        let inner = &self.inner;
        if inner.live.load(Ordering::Acquire) {
            if let Some(capabilities) = inner.capabilities.read().clone() {
                return Ok(capabilities);
            }
        }

        inner.start_effects();

        // Subscribe before connecting so no notification is missed.
        let events = inner.transport.events();
        let capabilities = match negotiate::negotiate(inner.transport.as_ref()).await {
            Ok(capabilities) => capabilities,
            Err(e) => {
                let _ = inner.transport.disconnect().await;
                return Err(e);
            }
        };

        inner.live.store(true, Ordering::Release);
        *inner.connected_at.lock() = Some(Instant::now());
        inner.spawn_listener(events);

        match inner.establish(capabilities).await {
            Ok(capabilities) => Ok(capabilities),
            Err(e) => {
                warn!("Session setup failed: {}", e);
                inner.teardown().await;
                Err(e)
            }
        }
    }

    /// Tear the session down. Safe to call repeatedly.
    pub async fn disconnect(&self) -> Result<()> {
        self.inner.teardown().await;
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.inner.live.load(Ordering::Acquire)
    }

    /// Capabilities of the connected device.
    pub fn capabilities(&self) -> Option<Capabilities> {
        self.inner.capabilities.read().clone()
    }

    /// Read a raw value.
    ///
    /// Returns `Ok(None)` when the device answers with its error flag. Values
    /// of known fields are also folded into the snapshot.
    pub async fn get_value(&self, address: impl Into<Address>) -> Result<Option<Vec<u8>>> {
        let inner = &self.inner;
        match (inner.mode()?, address.into()) {
            (Mode::Lorax, Address::Path(path)) => {
                let value = inner.read_path(&path).await?;
                if let (Some(value), Some(field)) = (&value, Field::from_path(&path)) {
                    inner.machine.apply(field, Mode::Lorax, value);
                }
                Ok(value)
            }
            (Mode::Legacy, address) => {
                let (field, characteristic) = legacy_target(&address)?;
                let value = inner.dispatcher.read_characteristic(characteristic).await?;
                if let Some(field) = field {
                    inner.machine.apply(field, Mode::Legacy, &value);
                }
                Ok(Some(value))
            }
            (Mode::Lorax, Address::Characteristic(_)) => Err(Error::Unsupported("lorax")),
        }
    }

    /// Write a raw value.
    pub async fn send_command(&self, address: impl Into<Address>, value: &[u8]) -> Result<()> {
        let inner = &self.inner;
        match (inner.mode()?, address.into()) {
            (Mode::Lorax, Address::Path(path)) => inner.write_path(&path, value).await,
            (Mode::Legacy, address) => {
                let (_, characteristic) = legacy_target(&address)?;
                inner
                    .dispatcher
                    .write_characteristic(characteristic, value, true)
                    .await
            }
            (Mode::Lorax, Address::Characteristic(_)) => Err(Error::Unsupported("lorax")),
        }
    }

    /// Receive updates for a value every `interval`.
    ///
    /// Lorax firmware pushes them through a watch; legacy firmware is polled.
    /// Watching the same address again replaces the previous watch.
    pub async fn watch(&self, address: impl Into<Address>, interval: Duration) -> Result<()> {
        let inner = &self.inner;
        match (inner.mode()?, address.into()) {
            (Mode::Lorax, Address::Path(path)) => {
                let length = Field::from_path(&path).map_or(4, |f| f.kind.value_len());
                inner.watch_path(&path, interval, length).await
            }
            (Mode::Legacy, address) => {
                let (Some(field), _) = legacy_target(&address)? else {
                    return Err(Error::Unsupported("legacy"));
                };
                inner.poller.start(&field.to_string(), field, interval);
                Ok(())
            }
            (Mode::Lorax, Address::Characteristic(_)) => Err(Error::Unsupported("lorax")),
        }
    }

    /// Stop updates for a value. A no-op if it is not watched.
    pub async fn unwatch(&self, address: impl Into<Address>) -> Result<()> {
        let inner = &self.inner;
        match (inner.mode()?, address.into()) {
            (Mode::Lorax, Address::Path(path)) => inner.unwatch_path(&path).await,
            (Mode::Legacy, address) => {
                if let (Some(field), _) = legacy_target(&address)? {
                    inner.poller.stop(&field.to_string());
                }
                Ok(())
            }
            (Mode::Lorax, Address::Characteristic(_)) => Err(Error::Unsupported("lorax")),
        }
    }

    /// Make `index` the active heat profile and refresh its settings.
    pub async fn switch_profile(&self, index: usize) -> Result<()> {
        if index >= PROFILE_COUNT {
            return Err(ProtocolError::InvalidProfileIndex(index).into());
        }
        let inner = &self.inner;

        match inner.mode()? {
            Mode::Lorax => {
                let path = PathKind::ActiveProfile.template(0)?;
                inner.write_path(&path, &[index as u8]).await?;
                inner.read_profile(Mode::Lorax, index).await?;
            }
            Mode::Legacy => {
                let _profiles = inner.profile_lock.lock().await;
                inner.select_legacy_profile(index).await?;
                inner.read_profile(Mode::Legacy, index).await?;
            }
        }

        inner.machine.apply_delta(StateDelta::ActiveProfile(index));
        info!("Switched to profile {}", index);
        Ok(())
    }

    /// Current state snapshot.
    pub fn snapshot(&self) -> DeviceStateSnapshot {
        self.inner.machine.snapshot()
    }

    /// Subscribe to state deltas.
    pub fn subscribe(&self) -> broadcast::Receiver<StateDelta> {
        self.inner.machine.subscribe()
    }

    /// Build a diagnostics report now.
    pub fn diagnostics(&self) -> DiagnosticsReport {
        self.inner.diagnostics()
    }

    /// Subscribe to periodic diagnostics reports.
    pub fn subscribe_diagnostics(&self) -> broadcast::Receiver<DiagnosticsReport> {
        self.inner.diagnostics_tx.subscribe()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let _ = self.inner.shutdown_tx.send(());
        for task in self.inner.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

impl Inner {
    fn mode(&self) -> Result<Mode> {
        if !self.live.load(Ordering::Acquire) {
            return Err(Error::Disconnected);
        }
        self.capabilities
            .read()
            .as_ref()
            .map(|c| c.mode)
            .ok_or(Error::Disconnected)
    }

    fn spawn_task(&self, task: JoinHandle<()>) {
        let mut tasks = self.tasks.lock();
        tasks.retain(|t| !t.is_finished());
        tasks.push(task);
    }

    /// Run side effects requested by the machine. Started once per session.
    fn start_effects(self: &Arc<Self>) {
        let Some(mut effect_rx) = self.effect_rx.lock().take() else {
            return;
        };
        let weak = Arc::downgrade(self);

        tokio::spawn(async move {
            while let Some(effect) = effect_rx.recv().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.apply_effect(effect).await;
            }
        });
    }

    fn spawn_listener(self: &Arc<Self>, mut events: broadcast::Receiver<TransportEvent>) {
        let weak = Arc::downgrade(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = events.recv() => {
                        let Some(inner) = weak.upgrade() else {
                            break;
                        };
                        match event {
                            Ok(TransportEvent::Notification { characteristic, value }) => {
                                inner.on_notification(characteristic, &value);
                            }
                            Ok(TransportEvent::Disconnected) => {
                                warn!("Link to device lost");
                                tokio::spawn(async move { inner.teardown().await });
                                break;
                            }
                            Err(RecvError::Lagged(n)) => {
                                warn!("Listener lagged, {} transport events dropped", n);
                            }
                            Err(RecvError::Closed) => break,
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });
        self.spawn_task(task);
    }

    fn on_notification(&self, characteristic: Uuid, value: &[u8]) {
        if characteristic == lorax::REPLY {
            self.dispatcher.handle_reply(value);
        } else if characteristic == lorax::EVENT {
            let event = match Event::decode(value) {
                Ok(event) => event,
                Err(e) => {
                    warn!("Dropping malformed event: {}", e);
                    return;
                }
            };
            if event.error {
                debug!("Event for watch {} carries the error flag", event.watch_id);
                return;
            }
            let Some(path) = self.registry.route(event.watch_id) else {
                trace!("Event for unknown watch {}", event.watch_id);
                return;
            };

            self.watchdog.touch(&path);
            if let Some(field) = Field::from_path(&path) {
                self.machine.apply(field, Mode::Lorax, &event.data);
            }
        } else {
            trace!("Ignoring notification from {}", characteristic);
        }
    }

    async fn establish(self: &Arc<Self>, mut capabilities: Capabilities) -> Result<Capabilities> {
        let mode = capabilities.mode;
        match mode {
            Mode::Lorax => {
                for characteristic in [lorax::REPLY, lorax::EVENT] {
                    self.transport
                        .subscribe(characteristic)
                        .await
                        .map_err(|e| Error::ConnectFailed(e.to_string()))?;
                }
                capabilities.limits = Some(handshake::unlock_lorax(&self.dispatcher).await?);
            }
            Mode::Legacy => handshake::unlock_legacy(&self.dispatcher).await?,
        }
        *self.capabilities.write() = Some(capabilities.clone());

        if self.config.session.bootstrap {
            self.bootstrap(mode).await?;
        }
        self.start_updates(mode).await?;
        self.start_diagnostics();

        info!("Session established ({} mode)", mode);
        Ok(capabilities)
    }

    /// Read identity, profiles and the initial state.
    async fn bootstrap(&self, mode: Mode) -> Result<()> {
        let identity: &[PathKind] = match mode {
            Mode::Lorax => &[
                PathKind::DeviceName,
                PathKind::ModelCode,
                PathKind::Firmware,
                PathKind::GitHash,
                PathKind::MacAddress,
                PathKind::Serial,
            ],
            Mode::Legacy => &[
                PathKind::DeviceName,
                PathKind::ModelCode,
                PathKind::Firmware,
                PathKind::GitHash,
            ],
        };
        for kind in identity {
            self.read_lenient(Field::new(*kind)).await?;
        }

        match mode {
            Mode::Lorax => {
                self.read_lenient(Field::new(PathKind::ActiveProfile)).await?;
                for index in 0..PROFILE_COUNT {
                    self.read_profile(mode, index).await?;
                }
            }
            Mode::Legacy => {
                let _profiles = self.profile_lock.lock().await;
                self.read_lenient(Field::new(PathKind::ActiveProfile)).await?;
                let active = self.machine.snapshot().active_profile;

                for index in 0..PROFILE_COUNT {
                    self.select_legacy_profile(index).await?;
                    self.read_profile(mode, index).await?;
                }
                // Selecting a profile to read it also activates it.
                if let Some(active) = active {
                    self.select_legacy_profile(active).await?;
                }
            }
        }

        for kind in [
            PathKind::OperatingState,
            PathKind::HeaterTemp,
            PathKind::Battery,
            PathKind::ChargeSource,
            PathKind::TotalUses,
            PathKind::LedColor,
            PathKind::LedBrightness,
        ] {
            self.read_lenient(Field::new(kind)).await?;
        }

        debug!("Bootstrap complete");
        Ok(())
    }

    async fn start_updates(&self, mode: Mode) -> Result<()> {
        let watch = &self.config.watch;
        let polling = &self.config.polling;

        match mode {
            Mode::Lorax => {
                let state_path = PathKind::OperatingState.template(0)?;
                self.watch_path(&state_path, watch.state_interval, 1).await?;
                self.watchdog.guard(&state_path, watch.state_interval);

                for kind in AMBIENT_KINDS {
                    self.watch_field(Field::new(kind), watch.ambient_interval).await?;
                }
            }
            Mode::Legacy => {
                for kind in LEGACY_POLLED_KINDS {
                    let field = Field::new(kind);
                    self.poller.start(&field.to_string(), field, polling.interval);
                }
            }
        }

        self.poller.start(
            POLL_AMBIENT_TEMP,
            Field::new(PathKind::HeaterTemp),
            polling.ambient_temp_interval,
        );
        if self.machine.is_high_frequency() {
            self.poller.suspend(POLL_AMBIENT_TEMP);
        }
        Ok(())
    }

    fn start_diagnostics(self: &Arc<Self>) {
        if !self.config.diagnostics.enabled {
            return;
        }
        let weak = Arc::downgrade(self);
        let interval = self.config.diagnostics.interval;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(inner) = weak.upgrade() else {
                            break;
                        };
                        let report = inner.diagnostics();
                        debug!(report = %report.to_json(), "Session diagnostics");
                        let _ = inner.diagnostics_tx.send(report);
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });
        self.spawn_task(task);
    }

    async fn apply_effect(&self, effect: SideEffect) {
        let Ok(mode) = self.mode() else {
            return;
        };
        debug!("Applying {:?}", effect);

        match (effect, mode) {
            (SideEffect::EnterHighFrequency, Mode::Lorax) => {
                self.poller.suspend(POLL_AMBIENT_TEMP);
                for kind in HIGH_FREQUENCY_KINDS {
                    let field = Field::new(kind);
                    if let Err(e) = self
                        .watch_field(field, self.config.watch.high_frequency_interval)
                        .await
                    {
                        warn!("Failed to watch {}: {}", field, e);
                    }
                }
            }
            (SideEffect::LeaveHighFrequency, Mode::Lorax) => {
                for kind in HIGH_FREQUENCY_KINDS {
                    let Ok(path) = kind.template(0) else {
                        continue;
                    };
                    if let Err(e) = self.unwatch_path(&path).await {
                        warn!("Failed to unwatch {}: {}", path, e);
                    }
                }
                self.poller.resume(POLL_AMBIENT_TEMP);
            }
            (SideEffect::EnterHighFrequency, Mode::Legacy) => {
                self.poller.suspend(POLL_AMBIENT_TEMP);
                self.poller.start(
                    POLL_HIGH_FREQUENCY_TEMP,
                    Field::new(PathKind::HeaterTemp),
                    self.config.polling.high_frequency_interval,
                );
            }
            (SideEffect::LeaveHighFrequency, Mode::Legacy) => {
                self.poller.stop(POLL_HIGH_FREQUENCY_TEMP);
                self.poller.resume(POLL_AMBIENT_TEMP);
            }
        }
    }

    async fn watch_field(&self, field: Field, interval: Duration) -> Result<()> {
        let path = field.path()?;
        self.watch_path(&path, interval, field.kind.value_len()).await
    }

    async fn watch_path(&self, path: &str, interval: Duration, length: u16) -> Result<()> {
        self.watch_specs
            .insert(path.to_string(), (interval, length));
        self.registry
            .open_and_watch(&self.dispatcher, path, interval, length)
            .await?;
        Ok(())
    }

    async fn unwatch_path(&self, path: &str) -> Result<()> {
        self.watch_specs.remove(path);
        self.watchdog.stop(path);
        self.registry.unwatch(&self.dispatcher, path).await
    }

    async fn read_path(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let payload = read_short_payload(self.dispatcher.max_payload(), path)?;
        let reply = self
            .dispatcher
            .request(Opcode::ReadShort, payload, Some(path))
            .await?;
        Ok((!reply.error).then_some(reply.data))
    }

    async fn write_path(&self, path: &str, value: &[u8]) -> Result<()> {
        let payload = write_short_payload(path, value)?;
        self.dispatcher
            .request_ok(Opcode::WriteShort, payload, Some(path))
            .await?;
        Ok(())
    }

    /// Read a field and fold it into the snapshot.
    async fn read_field(&self, field: Field) -> Result<Option<StateDelta>> {
        let mode = self.mode()?;
        let value = match mode {
            Mode::Lorax => self.read_path(&field.path()?).await?,
            Mode::Legacy => match field.kind.legacy_characteristic() {
                Some(characteristic) => {
                    Some(self.dispatcher.read_characteristic(characteristic).await?)
                }
                None => None,
            },
        };
        Ok(value.and_then(|value| self.machine.apply(field, mode, &value)))
    }

    /// Like [`Inner::read_field`] but only fatal errors propagate.
    async fn read_lenient(&self, field: Field) -> Result<()> {
        match self.read_field(field).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!("Failed to read {}: {}", field, e);
                Ok(())
            }
        }
    }

    async fn read_profile(&self, mode: Mode, index: usize) -> Result<()> {
        for kind in PathKind::PROFILE {
            if mode == Mode::Legacy && kind.legacy_characteristic().is_none() {
                continue;
            }
            self.read_lenient(Field::profile(kind, index)).await?;
        }
        Ok(())
    }

    async fn select_legacy_profile(&self, index: usize) -> Result<()> {
        self.dispatcher
            .write_characteristic(legacy::PROFILE_CURRENT, &encode_f32(index as f32), true)
            .await
    }

    fn diagnostics(&self) -> DiagnosticsReport {
        let capabilities = self.capabilities.read().clone();
        let snapshot = self.machine.snapshot();
        let uptime = self
            .connected_at
            .lock()
            .map(|at| at.elapsed())
            .unwrap_or_default();

        DiagnosticsReport {
            connected: self.live.load(Ordering::Acquire),
            mode: capabilities.as_ref().map(|c| c.mode),
            pup: capabilities.as_ref().is_some_and(|c| c.pup),
            transport: self.transport.transport_type().to_string(),
            services: capabilities
                .as_ref()
                .map(|c| c.services.iter().map(Uuid::to_string).collect())
                .unwrap_or_default(),
            limits: capabilities.as_ref().and_then(|c| c.limits),
            identity: snapshot.identity,
            state: snapshot.state,
            high_frequency: self.machine.is_high_frequency(),
            watched_paths: self.registry.watched_paths(),
            polls: self.poller.count(),
            pending_requests: self.dispatcher.pending_count(),
            uptime,
        }
    }

    async fn teardown(&self) {
        if !self.live.swap(false, Ordering::AcqRel) {
            return;
        }

        let _ = self.shutdown_tx.send(());
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.poller.stop_all();
        self.watchdog.stop_all();
        self.machine.reset();
        self.dispatcher.clear();
        self.registry.clear();
        self.watch_specs.clear();
        *self.capabilities.write() = None;
        *self.connected_at.lock() = None;

        if let Err(e) = self.transport.disconnect().await {
            warn!("Transport disconnect failed: {}", e);
        }
        info!("Session closed");
    }
}

#[async_trait]
impl PollSource for Inner {
    async fn poll(&self, field: Field) {
        if !self.live.load(Ordering::Acquire) {
            return;
        }
        if let Err(e) = self.read_field(field).await {
            debug!("Poll of {} failed: {}", field, e);
        }
    }
}

#[async_trait]
impl WatchRepair for Inner {
    async fn unwatch(&self, path: &str) -> Result<()> {
        self.registry.unwatch(&self.dispatcher, path).await
    }

    async fn rewatch(&self, path: &str) -> Result<()> {
        let Some((interval, length)) = self.watch_specs.get(path).map(|s| *s) else {
            debug!("{} no longer wanted, not rewatching", path);
            return Ok(());
        };
        self.registry
            .open_and_watch(&self.dispatcher, path, interval, length)
            .await?;
        Ok(())
    }
}

/// Resolve an address to a legacy characteristic, and the field it carries
/// when known.
fn legacy_target(address: &Address) -> Result<(Option<Field>, Uuid)> {
    match address {
        // Profile characteristics follow the selected profile, so their index is unknown.
        Address::Characteristic(uuid) => Ok((
            Field::from_characteristic(*uuid).filter(|field| !field.kind.is_indexed()),
            *uuid,
        )),
        Address::Path(path) => Field::from_path(path)
            .filter(|field| !field.kind.is_indexed())
            .and_then(|field| field.kind.legacy_characteristic().map(|uuid| (Some(field), uuid)))
            .ok_or(Error::Unsupported("legacy")),
    }
}
