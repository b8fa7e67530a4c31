//! Open handle and watch bookkeeping.
//!
//! Each path has at most one open handle and at most one watch. Lifecycle
//! operations are serialized so concurrent callers cannot double-open.

use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::dispatcher::Dispatcher;
use crate::error::{ProtocolError, Result};
use crate::protocol::{close_payload, open_payload, unwatch_payload, watch_payload, Opcode};

/// Tracks open handles and watches by path.
#[derive(Default)]
pub struct PathRegistry {
    /// Path -> open handle.
    handles: DashMap<String, u16>,
    /// Watch id -> path, for routing events.
    watches: DashMap<u16, String>,
    /// Path -> watch id.
    watched: DashMap<String, u16>,
    lifecycle: Mutex<()>,
}

impl PathRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle of an open path.
    pub fn handle(&self, path: &str) -> Option<u16> {
        self.handles.get(path).map(|h| *h)
    }

    pub fn is_open(&self, path: &str) -> bool {
        self.handles.contains_key(path)
    }

    pub fn is_watched(&self, path: &str) -> bool {
        self.watched.contains_key(path)
    }

    /// Path a watch event belongs to.
    pub fn route(&self, watch_id: u16) -> Option<String> {
        self.watches.get(&watch_id).map(|p| p.clone())
    }

    pub fn watch_count(&self) -> usize {
        self.watched.len()
    }

    /// Currently watched paths, sorted.
    pub fn watched_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.watched.iter().map(|e| e.key().clone()).collect();
        paths.sort();
        paths
    }

    /// Open a path, returning its handle. Already-open paths are reused.
    pub async fn open(&self, dispatcher: &Dispatcher, path: &str) -> Result<u16> {
        let _lifecycle = self.lifecycle.lock().await;
        self.open_locked(dispatcher, path).await
    }

    async fn open_locked(&self, dispatcher: &Dispatcher, path: &str) -> Result<u16> {
        if let Some(handle) = self.handle(path) {
            return Ok(handle);
        }

        let data = dispatcher
            .request_ok(Opcode::Open, open_payload(path)?, Some(path))
            .await?;
        let handle = data.first().copied().map(u16::from).ok_or_else(|| {
            ProtocolError::UnexpectedReply(format!("OPEN {path} returned no handle"))
        })?;

        debug!("Opened {} as handle {}", path, handle);
        self.handles.insert(path.to_string(), handle);
        Ok(handle)
    }

    /// Watch an open path.
    ///
    /// An existing watch on the same path is closed first, so repeated calls
    /// leave exactly one watch in place.
    pub async fn watch(
        &self,
        dispatcher: &Dispatcher,
        path: &str,
        interval: Duration,
        length: u16,
    ) -> Result<u16> {
        let _lifecycle = self.lifecycle.lock().await;

        if self.is_watched(path) {
            self.close_locked(dispatcher, path).await?;
            self.open_locked(dispatcher, path).await?;
        }
        let handle = self
            .handle(path)
            .ok_or_else(|| ProtocolError::NotOpen(path.to_string()))?;

        let interval_ms = u16::try_from(interval.as_millis()).unwrap_or(u16::MAX).max(1);
        let data = dispatcher
            .request_ok(
                Opcode::Watch,
                watch_payload(handle, interval_ms, length),
                Some(path),
            )
            .await?;

        let watch_id = match data.get(..2) {
            Some(id) => u16::from_le_bytes([id[0], id[1]]),
            None => handle,
        };

        debug!("Watching {} every {}ms as {}", path, interval_ms, watch_id);
        self.watches.insert(watch_id, path.to_string());
        self.watched.insert(path.to_string(), watch_id);
        Ok(watch_id)
    }

    /// Open and watch a path in one step.
    pub async fn open_and_watch(
        &self,
        dispatcher: &Dispatcher,
        path: &str,
        interval: Duration,
        length: u16,
    ) -> Result<u16> {
        self.open(dispatcher, path).await?;
        self.watch(dispatcher, path, interval, length).await
    }

    /// Close a path. Closing a path that is not open is a no-op.
    pub async fn close(&self, dispatcher: &Dispatcher, path: &str) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        self.close_locked(dispatcher, path).await
    }

    async fn close_locked(&self, dispatcher: &Dispatcher, path: &str) -> Result<()> {
        let Some((_, handle)) = self.handles.remove(path) else {
            return Ok(());
        };
        if let Some((_, watch_id)) = self.watched.remove(path) {
            self.watches.remove(&watch_id);
        }

        let reply = dispatcher
            .request(Opcode::Close, close_payload(handle), Some(path))
            .await?;
        if reply.error {
            warn!("Device refused to close {} (handle {})", path, handle);
        } else {
            debug!("Closed {} (handle {})", path, handle);
        }
        Ok(())
    }

    /// Stop watching a path: close it, then clear the watch on the device.
    pub async fn unwatch(&self, dispatcher: &Dispatcher, path: &str) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if !self.is_open(path) {
            return Ok(());
        }

        self.close_locked(dispatcher, path).await?;
        let reply = dispatcher
            .request(Opcode::Watch, unwatch_payload(), Some(path))
            .await?;
        if reply.error {
            warn!("Device refused to clear watch for {}", path);
        }
        Ok(())
    }

    /// Forget all handles and watches without talking to the device.
    pub fn clear(&self) {
        self.handles.clear();
        self.watches.clear();
        self.watched.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::crypto::{KeySchedule, LORAX_ACCESS_KEY};
    use crate::transport::gatt::lorax;
    use crate::transport::{GattTransport, SimConfig, SimOp, SimulatedDevice, TransportEvent};

    async fn unlocked() -> (Arc<SimulatedDevice>, Arc<Dispatcher>) {
        let device = Arc::new(SimulatedDevice::new(SimConfig::lorax()));
        let dispatcher = Arc::new(Dispatcher::new(device.clone(), 10, None));

        let mut rx = device.events();
        let pump = Arc::clone(&dispatcher);
        tokio::spawn(async move {
            while let Ok(event) = rx.recv().await {
                if let TransportEvent::Notification { characteristic, value } = event {
                    if characteristic == lorax::REPLY {
                        pump.handle_reply(&value);
                    }
                }
            }
        });

        device.connect().await.unwrap();
        let key = KeySchedule::access_key(&LORAX_ACCESS_KEY, &device.seed());
        dispatcher
            .request_ok(Opcode::UnlockAccess, key.to_vec(), None)
            .await
            .unwrap();
        device.clear_log();
        (device, dispatcher)
    }

    fn opens(device: &SimulatedDevice) -> usize {
        device
            .log()
            .iter()
            .filter(|op| matches!(op, SimOp::Request(Opcode::Open, _)))
            .count()
    }

    #[tokio::test]
    async fn test_open_is_reused() {
        let (device, dispatcher) = unlocked().await;
        let registry = PathRegistry::new();

        let first = registry.open(&dispatcher, "/p/bat/soc").await.unwrap();
        let second = registry.open(&dispatcher, "/p/bat/soc").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(opens(&device), 1);
    }

    #[tokio::test]
    async fn test_watch_twice_leaves_one_watch() {
        let (device, dispatcher) = unlocked().await;
        let registry = PathRegistry::new();
        let interval = Duration::from_millis(250);

        registry
            .open_and_watch(&dispatcher, "/p/app/htr/temp", interval, 4)
            .await
            .unwrap();
        let id = registry
            .open_and_watch(&dispatcher, "/p/app/htr/temp", interval, 4)
            .await
            .unwrap();

        assert_eq!(device.watch_count(), 1);
        assert_eq!(registry.watch_count(), 1);
        assert_eq!(registry.route(id).as_deref(), Some("/p/app/htr/temp"));
    }

    #[tokio::test]
    async fn test_watch_requires_open() {
        let (_device, dispatcher) = unlocked().await;
        let registry = PathRegistry::new();

        let err = registry
            .watch(&dispatcher, "/p/bat/soc", Duration::from_secs(1), 4)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::Protocol(ProtocolError::NotOpen(_))
        ));
    }

    #[tokio::test]
    async fn test_close_unopened_is_noop() {
        let (device, dispatcher) = unlocked().await;
        let registry = PathRegistry::new();

        registry.close(&dispatcher, "/p/bat/soc").await.unwrap();
        registry.unwatch(&dispatcher, "/p/bat/soc").await.unwrap();
        assert!(device.log().is_empty());
    }

    #[tokio::test]
    async fn test_unwatch_closes_then_clears() {
        let (device, dispatcher) = unlocked().await;
        let registry = PathRegistry::new();

        registry
            .open_and_watch(&dispatcher, "/p/bat/soc", Duration::from_secs(1), 4)
            .await
            .unwrap();
        device.clear_log();

        registry.unwatch(&dispatcher, "/p/bat/soc").await.unwrap();
        assert_eq!(
            device.log(),
            vec![
                SimOp::Request(Opcode::Close, Some("/p/bat/soc".into())),
                SimOp::Request(Opcode::Watch, None),
            ]
        );
        assert_eq!(device.watch_count(), 0);
        assert!(!registry.is_open("/p/bat/soc"));
    }
}
