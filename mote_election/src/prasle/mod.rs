//! Synchronous, self-stabilizing election of the minimum-ranked node.
//!
//! Every node repeatedly opens a receive window of length `T`, folds the
//! `(min, leader)` gossip that arrives into a tentative pair, and at the
//! window boundary adopts and re-broadcasts the pair if it improved. After
//! `K + 1` rounds (`K` at least the network diameter) the lexicographically
//! smallest `(ranking value, id)` in a connected graph has reached everyone.
//! The engine keeps opening windows forever at an idle cadence, so a
//! perturbed or rejoining network re-converges without any restart — the
//! self-stabilizing property.

mod neighbors;
mod topology;

pub use neighbors::{NeighborEntry, NeighborTable};
pub use topology::{derive_neighbors, Topology};

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::machine::startup_jitter;
use crate::wire::PrasleMessage;
use crate::{Action, Actions, Event, Machine, NodeId, PrasleConfig, TimerId};

/// Cadence of the maintenance windows once the convergence horizon has
/// passed.
const IDLE_WINDOW: Duration = Duration::from_secs(10);

/// A `(min, leader)` opinion.
///
/// The derived `Ord` is exactly the protocol's lexicographic order: compare
/// ranking values first, break ties on the smaller node id. Smaller wins.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Rank {
    /// The smallest ranking value heard of.
    pub min: u16,
    /// The node that owns it.
    pub leader: u16,
}

/// One node's round-engine instance.
pub struct Prasle {
    id: NodeId,
    config: PrasleConfig,
    /// Counts down from `K + 1`; goes negative over the maintenance phase.
    round: i32,
    rank: Rank,
    pending: Rank,
    table: NeighborTable,
    converged: bool,
    converged_round: Option<i32>,
    messages_sent: u64,
    messages_received: u64,
    startup_delay: Duration,
}

impl Prasle {
    /// A freshly booted node ranking itself by its own id.
    pub fn new(id: NodeId, config: PrasleConfig) -> Self {
        Self::with_ranking_value(id, config, id.get())
    }

    /// A freshly booted node with an externally supplied ranking value
    /// (battery level, capacity, ...). Lower ranks higher.
    pub fn with_ranking_value(id: NodeId, config: PrasleConfig, ranking_value: u16) -> Self {
        let sentinel_value = config.n_max.saturating_add(1);
        let sentinel = Rank {
            min: sentinel_value,
            leader: sentinel_value,
        };
        let table = NeighborTable::new(config.topology, config.network_size, id, sentinel);
        let round = i32::from(config.k_rounds) + 1;
        let startup_delay = Duration::from_secs(1) + startup_jitter(Duration::from_secs(1));
        Self {
            id,
            config,
            round,
            rank: Rank {
                min: sentinel_value,
                leader: id.get(),
            },
            pending: Rank {
                min: ranking_value,
                leader: id.get(),
            },
            table,
            converged: false,
            converged_round: None,
            messages_sent: 0,
            messages_received: 0,
            startup_delay,
        }
    }

    /// Overrides the random startup delay (deterministic tests, hosts with
    /// their own jitter source).
    pub fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = delay;
        self
    }

    /// The adopted `(min, leader)` opinion.
    pub fn rank(&self) -> Rank {
        self.rank
    }

    /// The remaining round budget; `<= 0` once the convergence horizon has
    /// passed.
    pub fn round(&self) -> i32 {
        self.round
    }

    /// Whether the engine has observed a full horizon without updates.
    pub fn converged(&self) -> bool {
        self.converged
    }

    /// Gossip frames sent so far.
    pub fn messages_sent(&self) -> u64 {
        self.messages_sent
    }

    /// Gossip frames received so far.
    pub fn messages_received(&self) -> u64 {
        self.messages_received
    }

    /// The cached slot for a neighbor, for observation.
    pub fn neighbor(&self, id: NodeId) -> Option<&NeighborEntry> {
        self.table.get(id)
    }

    fn on_frame(&mut self, frame: &[u8]) {
        let message = match PrasleMessage::decode(frame) {
            Ok(message) => message,
            Err(error) => {
                warn!(node = %self.id, %error, "dropping malformed frame");
                return;
            }
        };
        if message.sender == self.id {
            return;
        }
        self.messages_received += 1;
        let heard = Rank {
            min: message.min_value,
            leader: message.leader_id,
        };
        self.table.record(message.sender, heard);
        if heard < self.pending {
            debug!(
                node = %self.id,
                round = self.round,
                min = heard.min,
                leader = heard.leader,
                "heard better rank"
            );
            self.pending = heard;
        }
    }

    fn on_window_closed(&mut self, actions: &mut Actions) {
        self.round -= 1;
        let updated = self.pending < self.rank;
        if updated {
            self.rank = self.pending;
            info!(
                node = %self.id,
                round = self.round,
                min = self.rank.min,
                leader = self.rank.leader,
                "adopted better rank, disseminating"
            );
            actions.push(Action::Send(
                PrasleMessage {
                    min_value: self.rank.min,
                    leader_id: self.rank.leader,
                    sender: self.id,
                }
                .encode(),
            ));
            self.messages_sent += 1;
        } else {
            debug!(node = %self.id, round = self.round, "no update this round");
        }

        if self.round <= 0 && !self.converged && !updated && self.rank == self.pending {
            self.converged = true;
            self.converged_round = Some(self.round);
            info!(
                node = %self.id,
                leader = self.rank.leader,
                min = self.rank.min,
                round = self.round,
                sent = self.messages_sent,
                received = self.messages_received,
                "election converged"
            );
        }

        let window = if self.round <= 0 {
            IDLE_WINDOW
        } else {
            self.config.round_length
        };
        actions.push(Action::Arm {
            timer: TimerId::Round,
            after: window,
        });
    }
}

impl Machine for Prasle {
    fn start(&mut self) -> Actions {
        info!(
            node = %self.id,
            k = self.config.k_rounds,
            window_ms = self.config.round_length.as_millis() as u64,
            neighbors = self.table.len(),
            "round-engine node starting"
        );
        let mut actions = Actions::new();
        actions.push(Action::Arm {
            timer: TimerId::Startup,
            after: self.startup_delay,
        });
        actions
    }

    fn handle(&mut self, event: Event<'_>) -> Actions {
        let mut actions = Actions::new();
        match event {
            Event::Frame(frame) => self.on_frame(frame),
            Event::Timer(TimerId::Startup) => {
                debug!(node = %self.id, round = self.round, "opening first receive window");
                actions.push(Action::Arm {
                    timer: TimerId::Round,
                    after: self.config.round_length,
                });
            }
            Event::Timer(TimerId::Round) => self.on_window_closed(&mut actions),
            Event::Timer(other) => debug!(node = %self.id, timer = ?other, "ignoring unexpected timer"),
        }
        actions
    }

    fn id(&self) -> NodeId {
        self.id
    }

    fn leader(&self) -> Option<NodeId> {
        NodeId::new(self.rank.leader)
    }
}
