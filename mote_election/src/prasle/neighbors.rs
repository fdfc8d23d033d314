//! Per-neighbor cache of the last `(min, leader)` opinion heard.

use smallvec::SmallVec;

use super::topology::{derive_neighbors, Topology};
use super::Rank;
use crate::NodeId;

/// One neighbor's slot in the table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NeighborEntry {
    /// The neighbor's id, fixed by the static topology.
    pub id: NodeId,
    /// The last rank the neighbor gossiped; the sentinel until `heard`.
    pub rank: Rank,
    /// Whether any gossip from this neighbor has arrived yet.
    pub heard: bool,
}

/// The static neighbor set with its per-neighbor rank cache.
#[derive(Clone, Debug)]
pub struct NeighborTable {
    entries: SmallVec<[NeighborEntry; 8]>,
}

impl NeighborTable {
    /// Derives the table for `id` from the static topology; every cache
    /// slot starts at `sentinel`.
    pub fn new(topology: Topology, size: u16, id: NodeId, sentinel: Rank) -> Self {
        let entries = derive_neighbors(topology, size, id)
            .into_iter()
            .map(|id| NeighborEntry {
                id,
                rank: sentinel,
                heard: false,
            })
            .collect();
        Self { entries }
    }

    /// Number of neighbors.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the node is isolated.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The cached slot for `id`, if it is a neighbor.
    pub fn get(&self, id: NodeId) -> Option<&NeighborEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    /// All slots, in derivation order.
    pub fn iter(&self) -> impl Iterator<Item = &NeighborEntry> {
        self.entries.iter()
    }

    /// Caches `rank` as `sender`'s latest opinion.
    ///
    /// Returns `false` when `sender` is not a neighbor; the caller may still
    /// use the rank itself (gossip is useful wherever it came from), it just
    /// is not cached.
    pub fn record(&mut self, sender: NodeId, rank: Rank) -> bool {
        match self.entries.iter_mut().find(|entry| entry.id == sender) {
            Some(entry) => {
                entry.rank = rank;
                entry.heard = true;
                true
            }
            None => false,
        }
    }
}
