//! Periodic reads for values the device cannot push.
//!
//! Each named poll runs its own task: one read right away, then one read per
//! interval plus a random jitter. Suspending a poll keeps the timer alive but
//! skips the reads.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::protocol::Field;

/// Something that knows how to read a field and act on the value.
#[async_trait]
pub trait PollSource: Send + Sync {
    async fn poll(&self, field: Field);
}

struct PollTask {
    suspended: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Set of named periodic polls.
pub struct Poller {
    source: Weak<dyn PollSource>,
    jitter: Duration,
    tasks: Mutex<HashMap<String, PollTask>>,
}

impl Poller {
    pub fn new(source: Weak<dyn PollSource>, jitter: Duration) -> Self {
        Self {
            source,
            jitter,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Start (or restart) a poll under `name`.
    pub fn start(&self, name: &str, field: Field, interval: Duration) {
        let suspended = Arc::new(AtomicBool::new(false));
        let handle = tokio::spawn(Self::run(
            self.source.clone(),
            field,
            interval,
            self.jitter,
            Arc::clone(&suspended),
        ));

        let previous = self.tasks.lock().insert(
            name.to_string(),
            PollTask {
                suspended,
                handle,
            },
        );
        if let Some(previous) = previous {
            previous.handle.abort();
        }
        debug!("Polling {} ({}) every {:?}", name, field, interval);
    }

    /// Skip reads for a poll without cancelling its timer.
    pub fn suspend(&self, name: &str) {
        if let Some(task) = self.tasks.lock().get(name) {
            task.suspended.store(true, Ordering::Release);
            trace!("Suspended poll {}", name);
        }
    }

    pub fn resume(&self, name: &str) {
        if let Some(task) = self.tasks.lock().get(name) {
            task.suspended.store(false, Ordering::Release);
            trace!("Resumed poll {}", name);
        }
    }

    /// Stop a poll. Stopping a poll that never started is a no-op.
    pub fn stop(&self, name: &str) {
        if let Some(task) = self.tasks.lock().remove(name) {
            task.handle.abort();
            debug!("Stopped poll {}", name);
        }
    }

    /// Stop every poll.
    pub fn stop_all(&self) {
        for (_, task) in self.tasks.lock().drain() {
            task.handle.abort();
        }
    }

    pub fn is_polling(&self, name: &str) -> bool {
        self.tasks.lock().contains_key(name)
    }

    pub fn is_suspended(&self, name: &str) -> bool {
        self.tasks
            .lock()
            .get(name)
            .is_some_and(|t| t.suspended.load(Ordering::Acquire))
    }

    pub fn count(&self) -> usize {
        self.tasks.lock().len()
    }

    async fn run(
        source: Weak<dyn PollSource>,
        field: Field,
        interval: Duration,
        jitter: Duration,
        suspended: Arc<AtomicBool>,
    ) {
        loop {
            if !suspended.load(Ordering::Acquire) {
                let Some(source) = source.upgrade() else {
                    break;
                };
                source.poll(field).await;
            }
            tokio::time::sleep(interval + random_jitter(jitter)).await;
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop_all();
    }
}

fn random_jitter(max: Duration) -> Duration {
    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}
