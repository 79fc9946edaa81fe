use std::{
    collections::HashMap,
    net::{Ipv4Addr, SocketAddr},
    sync::{Arc, Mutex, PoisonError},
};

use async_std::{
    channel::{self, Receiver, Sender},
    io::{self, ErrorKind},
};
use async_trait::async_trait;

use super::{io::Transport, onion::Port};

type Datagram = (Vec<u8>, Port);

/// An in-process network where every bound port owns an inbox.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    inboxes: Arc<Mutex<HashMap<Port, Sender<Datagram>>>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, port: Port) -> io::Result<MemoryTransport> {
        let mut inboxes = self.inboxes.lock().unwrap_or_else(PoisonError::into_inner);
        if inboxes.contains_key(&port) {
            return Err(io::Error::new(
                ErrorKind::AddrInUse,
                format!("port {} already bound", port),
            ));
        }

        let (sender, inbox) = channel::unbounded();
        inboxes.insert(port, sender);

        Ok(MemoryTransport {
            port,
            network: self.clone(),
            inbox,
        })
    }

    /// Shuts the inbox of the transport bound on `port`. Its pending and future
    /// receives fail once the queued datagrams are drained, which ends a node loop.
    pub fn close(&self, port: Port) {
        if let Some(sender) = self.sender(port) {
            sender.close();
        }
    }

    fn sender(&self, port: Port) -> Option<Sender<Datagram>> {
        self.inboxes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&port)
            .cloned()
    }
}

pub struct MemoryTransport {
    port: Port,
    network: MemoryNetwork,
    inbox: Receiver<Datagram>,
}

#[async_trait]
impl Transport for MemoryTransport {
    fn port(&self) -> Port {
        self.port
    }

    async fn send(&self, bytes: &[u8], port: Port) -> io::Result<()> {
        let refused = || io::Error::new(ErrorKind::ConnectionRefused, format!("nothing bound on port {}", port));
        let sender = self.network.sender(port).ok_or_else(refused)?;
        sender
            .send((bytes.to_vec(), self.port))
            .await
            .map_err(|_| refused())
    }

    async fn receive(&self) -> io::Result<(Vec<u8>, SocketAddr)> {
        let (bytes, from) = self
            .inbox
            .recv()
            .await
            .map_err(|_| io::Error::new(ErrorKind::ConnectionAborted, "network dropped"))?;
        Ok((bytes, SocketAddr::from((Ipv4Addr::LOCALHOST, from))))
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.network
            .inboxes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.port);
    }
}
