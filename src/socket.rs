//! Non-blocking UDP socket wrapper for the driver.
//!
//! Speaks raw encoded frames; the engine does all interpretation.  Because
//! the engine is synchronous, I/O goes through `try_send_to` /
//! `try_recv_from`, and the driver awaits readiness separately.

use std::io;
use std::net::SocketAddr;
use std::sync::OnceLock;

use tokio::net::UdpSocket;

/// Largest datagram the driver will accept.
pub const MAX_DATAGRAM: usize = 65_535;

/// A UDP socket pinned to a single peer.
///
/// All methods take `&self` so the socket can be shared between the event
/// loop (receiving) and the connection's collaborator (sending).
pub struct Socket {
    inner: UdpSocket,
    /// Pinned at startup in connect mode, or adopted from the first inbound
    /// datagram in listen mode.
    peer: OnceLock<SocketAddr>,
}

impl Socket {
    /// Bind to `local`.  Passing port 0 lets the OS choose an ephemeral one.
    pub async fn bind(local: SocketAddr) -> io::Result<Self> {
        let inner = UdpSocket::bind(local).await?;
        Ok(Self {
            inner,
            peer: OnceLock::new(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    /// Pin the peer address; later calls are no-ops.
    pub fn set_peer(&self, addr: SocketAddr) {
        let _ = self.peer.set(addr);
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer.get().copied()
    }

    /// Wait until at least one datagram can be read.
    pub async fn readable(&self) -> io::Result<()> {
        self.inner.readable().await
    }

    /// Try to send one frame to the pinned peer.
    ///
    /// A would-block counts as sent and no peer yet counts as sent: the
    /// channel is lossy by contract and retransmission covers both.
    pub fn try_send(&self, frame: &[u8]) -> io::Result<usize> {
        let Some(peer) = self.peer() else {
            return Ok(frame.len());
        };
        match self.inner.try_send_to(frame, peer) {
            Ok(n) => Ok(n),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(frame.len()),
            Err(err) => Err(err),
        }
    }

    /// Try to receive one datagram from the pinned peer.
    ///
    /// Returns `None` when the socket would block.  With no peer pinned yet,
    /// the first sender is adopted; datagrams from any other address are
    /// dropped.
    pub fn try_recv(&self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        loop {
            match self.inner.try_recv_from(buf) {
                Ok((n, addr)) => {
                    match self.peer() {
                        None => {
                            self.set_peer(addr);
                            log::info!("[driver] peer {addr} adopted");
                        }
                        Some(peer) if peer != addr => {
                            log::debug!("[driver] dropping datagram from stranger {addr}");
                            continue;
                        }
                        Some(_) => {}
                    }
                    return Ok(Some(n));
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                Err(err) => return Err(err),
            }
        }
    }
}
