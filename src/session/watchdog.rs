//! Deviation watchdog.
//!
//! Some firmware silently stops delivering events for a watch. Each guarded
//! path is checked once per watch interval; if nothing has arrived for more
//! than twice the interval the watch is torn down and re-established.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::error::Result;

/// Repairs a stalled watch.
#[async_trait]
pub trait WatchRepair: Send + Sync {
    async fn unwatch(&self, path: &str) -> Result<()>;
    async fn rewatch(&self, path: &str) -> Result<()>;
}

struct Guard {
    last_update: Arc<parking_lot::Mutex<Instant>>,
    handle: JoinHandle<()>,
}

/// Watches the watches.
pub struct Watchdog {
    repair: Weak<dyn WatchRepair>,
    rewatch_delay: Duration,
    guards: DashMap<String, Guard>,
}

impl Watchdog {
    pub fn new(repair: Weak<dyn WatchRepair>, rewatch_delay: Duration) -> Self {
        Self {
            repair,
            rewatch_delay,
            guards: DashMap::new(),
        }
    }

    /// Start guarding a path. Guarding an already guarded path restarts it.
    pub fn guard(&self, path: &str, interval: Duration) {
        let last_update = Arc::new(parking_lot::Mutex::new(Instant::now()));
        let handle = tokio::spawn(Self::run(
            self.repair.clone(),
            path.to_string(),
            interval,
            self.rewatch_delay,
            Arc::clone(&last_update),
        ));

        if let Some(previous) = self.guards.insert(
            path.to_string(),
            Guard {
                last_update,
                handle,
            },
        ) {
            previous.handle.abort();
        }
        debug!("Guarding watch on {} ({:?})", path, interval);
    }

    /// Record an update for a path.
    pub fn touch(&self, path: &str) {
        if let Some(guard) = self.guards.get(path) {
            *guard.last_update.lock() = Instant::now();
        }
    }

    pub fn is_guarded(&self, path: &str) -> bool {
        self.guards.contains_key(path)
    }

    pub fn stop(&self, path: &str) {
        if let Some((_, guard)) = self.guards.remove(path) {
            guard.handle.abort();
        }
    }

    pub fn stop_all(&self) {
        self.guards.retain(|_, guard| {
            guard.handle.abort();
            false
        });
    }

    async fn run(
        repair: Weak<dyn WatchRepair>,
        path: String,
        interval: Duration,
        rewatch_delay: Duration,
        last_update: Arc<parking_lot::Mutex<Instant>>,
    ) {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let silent = last_update.lock().elapsed();
            if silent <= interval * 2 {
                continue;
            }

            let Some(repair) = repair.upgrade() else {
                break;
            };
            warn!("No events for {} in {:?}, re-establishing watch", path, silent);

            if let Err(e) = repair.unwatch(&path).await {
                warn!("Unwatch of {} failed: {}", path, e);
            }
            tokio::time::sleep(rewatch_delay).await;
            if let Err(e) = repair.rewatch(&path).await {
                warn!("Rewatch of {} failed: {}", path, e);
            }

            *last_update.lock() = Instant::now();
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.stop_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(&'static str, String)>>,
    }

    #[async_trait]
    impl WatchRepair for Recorder {
        async fn unwatch(&self, path: &str) -> Result<()> {
            self.calls.lock().push(("unwatch", path.to_string()));
            Ok(())
        }

        async fn rewatch(&self, path: &str) -> Result<()> {
            self.calls.lock().push(("rewatch", path.to_string()));
            Ok(())
        }
    }

    fn watchdog(recorder: &Arc<Recorder>) -> Watchdog {
        let repair: Arc<dyn WatchRepair> = recorder.clone();
        Watchdog::new(Arc::downgrade(&repair), Duration::from_millis(500))
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_watch_is_repaired_once() {
        let recorder = Arc::new(Recorder::default());
        let dog = watchdog(&recorder);
        dog.guard("/p/app/stat/id", Duration::from_secs(1));

        // Silent past 2x the interval: first check that notices is at 3s.
        tokio::time::sleep(Duration::from_millis(3600)).await;
        assert_eq!(
            *recorder.calls.lock(),
            vec![
                ("unwatch", "/p/app/stat/id".to_string()),
                ("rewatch", "/p/app/stat/id".to_string()),
            ]
        );

        // Events resume after the rewatch.
        for _ in 0..5 {
            dog.touch("/p/app/stat/id");
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        assert_eq!(recorder.calls.lock().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_watch_is_left_alone() {
        let recorder = Arc::new(Recorder::default());
        let dog = watchdog(&recorder);
        dog.guard("/p/app/stat/id", Duration::from_secs(1));

        for _ in 0..10 {
            tokio::time::sleep(Duration::from_millis(900)).await;
            dog.touch("/p/app/stat/id");
        }
        assert!(recorder.calls.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_checks() {
        let recorder = Arc::new(Recorder::default());
        let dog = watchdog(&recorder);
        dog.guard("/p/app/stat/id", Duration::from_secs(1));
        dog.stop("/p/app/stat/id");
        dog.stop("/p/app/stat/id");

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(recorder.calls.lock().is_empty());
        assert!(!dog.is_guarded("/p/app/stat/id"));
    }
}
