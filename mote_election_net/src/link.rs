//! UDP transport for a single-hop broadcast neighborhood.
//!
//! A node's neighborhood is a static peer list; `broadcast` fans one
//! datagram out to every peer, which is the wired stand-in for link-local
//! radio broadcast. One datagram carries exactly one protocol record, so
//! [`BytesCodec`] is all the framing there is.

use std::io;
use std::net::SocketAddr;

use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use tokio::net::UdpSocket;
use tokio_util::codec::BytesCodec;
use tokio_util::udp::UdpFramed;
use tracing::warn;

/// Where a node listens and who its single-hop neighbors are.
#[derive(Clone, Debug)]
pub struct UdpLinkConfig {
    /// Local listen address.
    pub bind: SocketAddr,
    /// The neighborhood every broadcast is fanned out to.
    pub peers: Vec<SocketAddr>,
}

/// A bound broadcast endpoint.
pub struct UdpLink {
    framed: UdpFramed<BytesCodec>,
    peers: Vec<SocketAddr>,
}

impl UdpLink {
    /// Binds the configured local address.
    pub async fn bind(config: UdpLinkConfig) -> io::Result<Self> {
        let socket = UdpSocket::bind(config.bind).await?;
        Ok(Self::from_socket(socket, config.peers))
    }

    /// Wraps an already-bound socket. Useful when the port is picked by the
    /// OS and the peer lists are exchanged afterwards.
    pub fn from_socket(socket: UdpSocket, peers: Vec<SocketAddr>) -> Self {
        Self {
            framed: UdpFramed::new(socket, BytesCodec::new()),
            peers,
        }
    }

    /// The bound local address.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.framed.get_ref().local_addr()
    }

    /// Sends `payload` to every neighbor, fire-and-forget.
    ///
    /// A failed send is transient loss as far as the protocols are
    /// concerned; the timers drive the retry.
    pub async fn broadcast(&mut self, payload: Bytes) {
        for index in 0..self.peers.len() {
            let peer = self.peers[index];
            if let Err(error) = self.framed.send((payload.clone(), peer)).await {
                warn!(%peer, %error, "send failed, treating as transient loss");
            }
        }
    }

    /// The next received datagram. Receive errors are logged and skipped.
    pub async fn recv(&mut self) -> Option<(BytesMut, SocketAddr)> {
        loop {
            match self.framed.next().await? {
                Ok(frame) => return Some(frame),
                Err(error) => warn!(%error, "receive error, dropping datagram"),
            }
        }
    }
}
