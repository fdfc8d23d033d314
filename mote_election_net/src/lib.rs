#![warn(missing_docs)]
//! Tokio/UDP host for the `mote_election` protocol machines.
//!
//! The core crate's machines are sans-IO; this crate supplies the real
//! surroundings: a [`UdpLink`] that fans broadcasts out to a static
//! neighborhood of peers, and [`spawn_node`], which runs one machine per
//! task against the real clock and publishes every leader change on a
//! watch channel.
//!
//! ```no_run
//! use mote_election::bully::Bully;
//! use mote_election::{BullyConfig, NodeId};
//! use mote_election_net::{spawn_node, UdpLink, UdpLinkConfig};
//!
//! # async fn example() -> std::io::Result<()> {
//! let link = UdpLink::bind(UdpLinkConfig {
//!     bind: "127.0.0.1:9000".parse().unwrap(),
//!     peers: vec!["127.0.0.1:9001".parse().unwrap()],
//! })
//! .await?;
//! let machine = Bully::new(NodeId::new(1).unwrap(), BullyConfig::default());
//! let mut node = spawn_node(machine, link);
//! let _leader = node.leader_changed().await;
//! # Ok(())
//! # }
//! ```

mod driver;
mod link;

pub use driver::{spawn_node, NodeHandle};
pub use link::{UdpLink, UdpLinkConfig};
