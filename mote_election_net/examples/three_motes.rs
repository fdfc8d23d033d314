//! Three bully nodes electing a leader over loopback UDP.
//!
//! Run with `cargo run --example three_motes` and watch the election,
//! heartbeats and the leader crash recovery in the logs.

use std::net::SocketAddr;
use std::time::Duration;

use mote_election::bully::Bully;
use mote_election::{BullyConfig, NodeId};
use mote_election_net::{spawn_node, UdpLink};
use tokio::net::UdpSocket;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // Second-scale timers so the demo is watchable but not slow.
    let config = BullyConfig {
        election_timeout: Duration::from_secs(1),
        coordinator_timeout: Duration::from_secs(4),
        alive_interval: Duration::from_millis(1500),
        random_delay_max: Duration::from_secs(1),
        max_nodes: 10,
    };

    let mut sockets = Vec::new();
    let mut addrs: Vec<SocketAddr> = Vec::new();
    for _ in 0..3 {
        let socket = UdpSocket::bind("127.0.0.1:0").await?;
        addrs.push(socket.local_addr()?);
        sockets.push(socket);
    }

    let mut handles = Vec::new();
    for (index, socket) in sockets.into_iter().enumerate() {
        let peers = addrs
            .iter()
            .enumerate()
            .filter(|&(other, _)| other != index)
            .map(|(_, addr)| *addr)
            .collect();
        let node = NodeId::new(index as u16 + 1).expect("ids start at 1");
        let machine = Bully::new(node, config.clone());
        handles.push(spawn_node(machine, UdpLink::from_socket(socket, peers)));
    }

    tokio::time::sleep(Duration::from_secs(4)).await;
    for (index, handle) in handles.iter().enumerate() {
        info!(node = index + 1, leader = ?handle.leader(), "settled");
    }

    info!("crashing the leader, watch the re-election");
    handles.pop();
    tokio::time::sleep(Duration::from_secs(8)).await;
    for (index, handle) in handles.iter().enumerate() {
        info!(node = index + 1, leader = ?handle.leader(), "after recovery");
    }

    Ok(())
}
