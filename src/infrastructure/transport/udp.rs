//! OSC-over-UDP sender.

use crate::domain::models::Value;
use crate::infrastructure::osc;
use crate::infrastructure::transport::{TransportClient, TransportError};
use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::net::{lookup_host, UdpSocket};
use tracing::{debug, info, warn};

/// Fire-and-forget OSC sender over a connectionless UDP socket.
///
/// One encoded message per datagram; a lost datagram is simply a lost
/// reading, the next send carries fresher data anyway.
pub struct OscUdpClient {
    target_host: String,
    target_port: u16,
    socket: Option<UdpSocket>,
    target: Option<SocketAddr>,
}

impl OscUdpClient {
    pub fn new(target_host: impl Into<String>, target_port: u16) -> Self {
        Self {
            target_host: target_host.into(),
            target_port,
            socket: None,
            target: None,
        }
    }
}

#[async_trait]
impl TransportClient for OscUdpClient {
    async fn connect(&mut self) -> Result<(), TransportError> {
        if self.socket.is_some() {
            return Err(TransportError::AlreadyConnected);
        }

        // Resolve first so a bad hostname leaves no socket behind
        let target = lookup_host((self.target_host.as_str(), self.target_port))
            .await
            .map_err(|e| TransportError::Resolve {
                host: self.target_host.clone(),
                source: e,
            })?
            .next()
            .ok_or_else(|| TransportError::Resolve {
                host: self.target_host.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses returned"),
            })?;

        let bind_addr = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.set_broadcast(true)?;

        info!("UDP transport ready, target {}", target);
        self.target = Some(target);
        self.socket = Some(socket);
        Ok(())
    }

    async fn send(&mut self, path: &str, values: &[Value]) {
        let (Some(socket), Some(target)) = (self.socket.as_ref(), self.target) else {
            debug!("UDP send skipped, not connected");
            return;
        };

        let datagram = osc::encode(path, values);
        match socket.send_to(&datagram, target).await {
            Ok(sent) => debug!("OSC sent: path={}, bytes={}", path, sent),
            Err(e) => warn!("OSC send failed for {}: {}", path, e),
        }
    }

    fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    async fn close(&mut self) {
        if self.socket.take().is_some() {
            info!("UDP transport closed");
        }
        self.target = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_send_without_connect_is_a_noop() {
        let mut client = OscUdpClient::new("127.0.0.1", 9000);
        assert!(!client.is_connected());
        client.send("/sensors/light", &[Value::Float(1.0)]).await;
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let mut client = OscUdpClient::new("127.0.0.1", 9000);
        client.connect().await.unwrap();
        client.close().await;
        client.close().await;
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_datagram_reaches_listener() {
        let listener = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut client = OscUdpClient::new("127.0.0.1", port);
        client.connect().await.unwrap();
        assert!(client.is_connected());

        client
            .send("/sensors/light", &[Value::Float(250.0)])
            .await;

        let mut buf = [0u8; 128];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), listener.recv_from(&mut buf))
            .await
            .expect("no datagram arrived")
            .unwrap();

        let message = osc::decode(&buf[..len]).unwrap();
        assert_eq!(message.path, "/sensors/light");
        assert_eq!(message.values, vec![Value::Float(250.0)]);

        client.close().await;
    }
}
