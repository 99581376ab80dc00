//! Transport layer.
//!
//! Two interchangeable ways of getting channel readings off the device,
//! an OSC/UDP sender and a BLE GATT peripheral, behind one contract:
//! [`TransportClient`].

pub mod udp;

use crate::domain::models::Value;
use async_trait::async_trait;
use thiserror::Error;

/// Errors raised while bringing a transport up.
///
/// Send-path problems are deliberately absent: once connected, delivery is
/// best-effort and failures are logged where they occur, never surfaced to
/// the sampling path.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("could not resolve target host '{host}': {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },
    #[error("could not open UDP socket: {0}")]
    Socket(#[from] std::io::Error),
    #[error("transport is already connected")]
    AlreadyConnected,
    #[error("BLE stack rejected a command: {0}")]
    Ble(anyhow::Error),
}

/// Common contract for both senders.
///
/// `send` is fire-and-forget: calling it while not connected, or with no
/// subscriber listening, is a silent no-op.
#[async_trait]
pub trait TransportClient: Send {
    /// Bring the transport up. On error the client stays not-connected;
    /// retrying is the caller's decision.
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Best-effort delivery of one channel reading.
    async fn send(&mut self, path: &str, values: &[Value]);

    /// Whether the transport is currently able to deliver.
    fn is_connected(&self) -> bool;

    /// Release resources. Safe to call repeatedly.
    async fn close(&mut self);
}
