use std::{
    net::{Ipv4Addr, SocketAddr},
    time::Duration,
};

use async_std::{future, io, net::UdpSocket};
use async_trait::async_trait;
use tracing::debug;

use super::onion::{Envelope, Port};
use crate::error::{Error, Result};

/// Largest datagram a node will accept.
pub const MAX_DATAGRAM: usize = 64 * 1024;

/// Point-to-point delivery of opaque messages between ports.
#[async_trait]
pub trait Transport: Send + Sync {
    /// The port this node is reachable on.
    fn port(&self) -> Port;

    async fn send(&self, bytes: &[u8], port: Port) -> io::Result<()>;

    /// Waits for the next inbound message.
    async fn receive(&self) -> io::Result<(Vec<u8>, SocketAddr)>;
}

/// A UDP socket on the loopback interface.
pub struct UdpTransport {
    socket: UdpSocket,
    port: Port,
}

impl UdpTransport {
    // Binds a socket on 127.0.0.1
    // param port: The port to listen on, 0 lets the OS pick one
    pub async fn bind(port: Port) -> io::Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, port)).await?;
        let port = socket.local_addr()?.port();
        Ok(Self { socket, port })
    }
}

#[async_trait]
impl Transport for UdpTransport {
    fn port(&self) -> Port {
        self.port
    }

    async fn send(&self, bytes: &[u8], port: Port) -> io::Result<()> {
        self.socket.send_to(bytes, (Ipv4Addr::LOCALHOST, port)).await?;
        Ok(())
    }

    async fn receive(&self) -> io::Result<(Vec<u8>, SocketAddr)> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let (len, from) = self.socket.recv_from(&mut buf).await?;
        buf.truncate(len);
        Ok((buf, from))
    }
}

pub async fn send_envelope<T: Transport + ?Sized>(
    transport: &T,
    envelope: &Envelope,
    port: Port,
) -> Result<()> {
    let bytes = envelope.to_bytes()?;
    debug!(
        "sending {} to port {}: {} bytes",
        envelope.tor_header,
        port,
        bytes.len()
    );
    transport.send(&bytes, port).await?;
    Ok(())
}

pub async fn receive_envelope<T: Transport + ?Sized>(transport: &T) -> Result<Envelope> {
    let (bytes, from) = transport.receive().await?;
    debug!("received {} bytes from {}", bytes.len(), from);
    Envelope::from_bytes(&bytes)
}

/// As [`receive_envelope`], failing with [`Error::Timeout`] once `timeout` elapses.
pub async fn receive_envelope_within<T: Transport + ?Sized>(
    transport: &T,
    timeout: Duration,
) -> Result<Envelope> {
    future::timeout(timeout, receive_envelope(transport))
        .await
        .map_err(|_| Error::Timeout(timeout))?
}
