//! Request/reply dispatch.
//!
//! Allocates sequence numbers, writes request frames, and resolves waiting
//! callers when the matching reply arrives on the shared reply channel.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::error::{Error, ProtocolError, Result, TransportError};
use crate::protocol::{Opcode, Reply, Request, DEFAULT_MAX_PAYLOAD};
use crate::transport::gatt::lorax;
use crate::transport::GattTransport;
use crate::types::Sequence;

/// Pause between attempts after the stack rejects an operation as busy.
const BUSY_RETRY_DELAY: Duration = Duration::from_millis(5);

/// A request waiting for its reply.
#[derive(Debug)]
pub struct PendingMessage {
    pub sequence: Sequence,
    pub opcode: Opcode,
    pub path: Option<String>,
    pub request: Vec<u8>,
    reply_tx: oneshot::Sender<Reply>,
}

/// Outbound message dispatcher.
pub struct Dispatcher {
    transport: Arc<dyn GattTransport>,
    next_seq: Mutex<Sequence>,
    pending: DashMap<u16, PendingMessage>,
    /// Held across a mutating write.
    write_lock: AsyncMutex<()>,
    max_busy_retries: u32,
    reply_timeout: Option<Duration>,
    max_payload: AtomicU16,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn GattTransport>,
        max_busy_retries: u32,
        reply_timeout: Option<Duration>,
    ) -> Self {
        Self {
            transport,
            next_seq: Mutex::new(Sequence::ZERO),
            pending: DashMap::new(),
            write_lock: AsyncMutex::new(()),
            max_busy_retries: max_busy_retries.max(1),
            reply_timeout,
            max_payload: AtomicU16::new(DEFAULT_MAX_PAYLOAD),
        }
    }

    /// Payload limit used for `READ_SHORT`.
    pub fn max_payload(&self) -> u16 {
        self.max_payload.load(Ordering::Relaxed)
    }

    pub fn set_max_payload(&self, max_payload: u16) {
        self.max_payload.store(max_payload, Ordering::Relaxed);
    }

    /// Number of requests awaiting a reply.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Allocate the next sequence number, skipping any still awaiting a reply.
    pub fn allocate_sequence(&self) -> Sequence {
        let mut next = self.next_seq.lock();
        let start = *next;
        loop {
            let candidate = *next;
            *next = candidate.next();
            if !self.pending.contains_key(&candidate.0) || *next == start {
                return candidate;
            }
        }
    }

    /// Send a request and wait for its reply.
    ///
    /// A reply carrying the error flag is returned as-is so call sites can
    /// branch on it; only transport failures become `Err`.
    pub async fn request(
        &self,
        opcode: Opcode,
        payload: Vec<u8>,
        path: Option<&str>,
    ) -> Result<Reply> {
        let sequence = self.allocate_sequence();
        let frame = Request::new(sequence, opcode, payload).encode();
        let (reply_tx, reply_rx) = oneshot::channel();

        self.pending.insert(
            sequence.0,
            PendingMessage {
                sequence,
                opcode,
                path: path.map(str::to_string),
                request: frame.clone(),
                reply_tx,
            },
        );
        trace!("-> {} seq={} path={:?}", opcode, sequence, path);

        if let Err(e) = self
            .write_characteristic(lorax::COMMAND, &frame, opcode.is_mutating())
            .await
        {
            self.pending.remove(&sequence.0);
            return Err(e);
        }

        let reply = match self.reply_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, reply_rx).await {
                Ok(reply) => reply,
                Err(_) => {
                    self.pending.remove(&sequence.0);
                    return Err(Error::ReplyTimeout {
                        opcode,
                        sequence: sequence.0,
                    });
                }
            },
            None => reply_rx.await,
        }
        .map_err(|_| Error::Disconnected)?;

        if reply.error {
            warn!("Device error for {} seq={} path={:?}", opcode, sequence, path);
        }
        Ok(reply)
    }

    /// Send a request, turning a device error flag into `Err`.
    pub async fn request_ok(
        &self,
        opcode: Opcode,
        payload: Vec<u8>,
        path: Option<&str>,
    ) -> Result<Vec<u8>> {
        let reply = self.request(opcode, payload, path).await?;
        if reply.error {
            return Err(ProtocolError::DeviceError { opcode }.into());
        }
        Ok(reply.data)
    }

    /// Route an inbound reply frame to its waiter.
    pub fn handle_reply(&self, data: &[u8]) {
        let reply = match Reply::decode(data) {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Dropping malformed reply: {}", e);
                return;
            }
        };

        match self.pending.remove(&reply.sequence.0) {
            Some((_, pending)) => {
                trace!(
                    "<- {} seq={} path={:?} error={}",
                    pending.opcode,
                    pending.sequence,
                    pending.path,
                    reply.error
                );
                // The waiter may have given up already.
                let _ = pending.reply_tx.send(reply);
            }
            None => debug!("Unmatched reply seq={}", reply.sequence),
        }
    }

    /// Write a characteristic, retrying while the transport reports busy.
    ///
    /// `exclusive` writes queue on the dispatcher write lock so at most one
    /// is on the wire at a time. The retry bound applies only to the stack
    /// rejecting a write as busy, never to waiting for the lock.
    pub async fn write_characteristic(
        &self,
        characteristic: Uuid,
        value: &[u8],
        exclusive: bool,
    ) -> Result<()> {
        let _guard = if exclusive {
            Some(self.write_lock.lock().await)
        } else {
            None
        };

        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.transport.write(characteristic, value).await {
                Err(Error::Transport(TransportError::Busy)) => {
                    if attempts >= self.max_busy_retries {
                        return Err(Error::TransportBusy { attempts });
                    }
                    trace!("Transport busy, retrying write (attempt {})", attempts);
                }
                other => return other,
            }
            tokio::time::sleep(BUSY_RETRY_DELAY).await;
        }
    }

    /// Read a characteristic, retrying while the transport reports busy.
    pub async fn read_characteristic(&self, characteristic: Uuid) -> Result<Vec<u8>> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.transport.read(characteristic).await {
                Err(Error::Transport(TransportError::Busy)) if attempts < self.max_busy_retries => {
                    tokio::time::sleep(BUSY_RETRY_DELAY).await;
                }
                Err(Error::Transport(TransportError::Busy)) => {
                    return Err(Error::TransportBusy { attempts });
                }
                other => return other,
            }
        }
    }

    /// Abandon every outstanding request. Waiters observe `Disconnected`.
    pub fn clear(&self) {
        let abandoned = self.pending.len();
        self.pending.clear();
        if abandoned > 0 {
            debug!("Abandoned {} pending requests", abandoned);
        }
    }
}
