//! Transport traits for network communication
//!
//! Users implement [`Transport`] for their chosen network stack. The
//! protocol only needs connectionless, non-blocking send/receive of encoded
//! [`Envelope`]s; [`MemoryTransport`] is an in-process loopback for tests and
//! listen-server setups.

use crate::error::{Error, Result};
use crate::messages::{Envelope, PeerId};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;

/// Network address type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    /// Socket address (IP + port)
    Socket(SocketAddr),
    /// In-process peer
    Peer(PeerId),
    /// Custom address (for WebSocket, WebRTC, etc.)
    Custom(String),
}

impl From<SocketAddr> for Address {
    fn from(addr: SocketAddr) -> Self {
        Address::Socket(addr)
    }
}

impl From<PeerId> for Address {
    fn from(peer: PeerId) -> Self {
        Address::Peer(peer)
    }
}

impl From<String> for Address {
    fn from(addr: String) -> Self {
        Address::Custom(addr)
    }
}

impl From<&str> for Address {
    fn from(addr: &str) -> Self {
        Address::Custom(addr.to_string())
    }
}

/// Connectionless transport trait (e.g., UDP)
pub trait Transport: Send + Sync {
    /// Error type for this transport
    type Error: std::error::Error + Send + Sync + 'static;

    /// Send data to a target address
    fn send(&self, data: &[u8], target: &Address) -> std::result::Result<(), Self::Error>;

    /// Receive data (non-blocking)
    ///
    /// Returns `Ok(None)` if no data is available.
    fn recv(&self) -> std::result::Result<Option<(Vec<u8>, Address)>, Self::Error>;

    /// Get the local address this transport is bound to
    fn local_addr(&self) -> Option<Address>;
}

/// Encode and send one envelope
pub fn send_envelope<T, M>(transport: &T, envelope: &Envelope<M>, target: &Address) -> Result<()>
where
    T: Transport,
    M: Serialize,
{
    let bytes = envelope.encode()?;
    transport
        .send(&bytes, target)
        .map_err(|e| Error::Transport(e.to_string()))
}

/// Receive and decode one envelope, if any is pending
pub fn recv_envelope<T, M>(transport: &T) -> Result<Option<(Envelope<M>, Address)>>
where
    T: Transport,
    M: DeserializeOwned,
{
    match transport
        .recv()
        .map_err(|e| Error::Transport(e.to_string()))?
    {
        Some((bytes, source)) => Ok(Some((Envelope::decode(&bytes)?, source))),
        None => Ok(None),
    }
}

type Queue = Arc<Mutex<VecDeque<(Vec<u8>, Address)>>>;

/// In-process loopback transport
///
/// Created in connected pairs; whatever one end sends, the other receives in
/// send order.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    local: Address,
    remote: Address,
    inbox: Queue,
    outbox: Queue,
}

impl MemoryTransport {
    /// Create two connected ends
    pub fn pair(a: impl Into<Address>, b: impl Into<Address>) -> (Self, Self) {
        let a = a.into();
        let b = b.into();
        let a_to_b: Queue = Arc::default();
        let b_to_a: Queue = Arc::default();
        (
            Self {
                local: a.clone(),
                remote: b.clone(),
                inbox: b_to_a.clone(),
                outbox: a_to_b.clone(),
            },
            Self {
                local: b,
                remote: a,
                inbox: a_to_b,
                outbox: b_to_a,
            },
        )
    }

    /// Number of packets waiting to be received
    pub fn pending(&self) -> usize {
        self.inbox.lock().len()
    }
}

impl Transport for MemoryTransport {
    type Error = Error;

    fn send(&self, data: &[u8], target: &Address) -> Result<()> {
        if target != &self.remote {
            return Err(Error::Transport(format!("no route to {:?}", target)));
        }
        self.outbox
            .lock()
            .push_back((data.to_vec(), self.local.clone()));
        Ok(())
    }

    fn recv(&self) -> Result<Option<(Vec<u8>, Address)>> {
        Ok(self.inbox.lock().pop_front())
    }

    fn local_addr(&self) -> Option<Address> {
        Some(self.local.clone())
    }
}
