//! Transport layer for Lorax.
//!
//! Abstracts the short-range wireless link as a set of GATT operations.
//! Platform backends implement [`GattTransport`]; the session engine never
//! talks to a radio stack directly.

pub mod gatt;
pub mod sim;

pub use sim::{SimConfig, SimOp, SimulatedDevice};

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use tokio::sync::broadcast;

/// Inbound event from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A subscribed characteristic changed value.
    Notification { characteristic: Uuid, value: Vec<u8> },
    /// The link dropped.
    Disconnected,
}

/// GATT client operations needed by the session engine.
///
/// Implementations are not required to accept overlapping writes; a write
/// issued while another is in flight may fail with
/// [`crate::error::TransportError::Busy`].
#[async_trait]
pub trait GattTransport: Send + Sync {
    /// Establish the link (including OS level pairing where needed).
    async fn connect(&self) -> Result<()>;

    /// Services advertised by the peer.
    async fn services(&self) -> Result<Vec<Uuid>>;

    /// Read a characteristic value.
    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>>;

    /// Write a characteristic value (with response).
    async fn write(&self, characteristic: Uuid, value: &[u8]) -> Result<()>;

    /// Enable notifications for a characteristic.
    async fn subscribe(&self, characteristic: Uuid) -> Result<()>;

    /// Subscribe to notifications and link events.
    fn events(&self) -> broadcast::Receiver<TransportEvent>;

    /// Tear the link down. Must be safe to call more than once.
    async fn disconnect(&self) -> Result<()>;

    /// Check if the link is up.
    fn is_connected(&self) -> bool;

    /// Transport name for logging.
    fn transport_type(&self) -> &'static str;
}
