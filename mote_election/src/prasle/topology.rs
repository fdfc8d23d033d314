//! Static topology derivation.
//!
//! The round protocol never discovers neighbors at runtime; the adjacency
//! is a pure function of the chosen shape, the network size and the node's
//! own id, so every node derives the same graph at boot.

use smallvec::SmallVec;

use crate::NodeId;

/// The supported static network shapes, over node ids `1..=n`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Topology {
    /// `i` connects to `i±1`, wrapping around.
    Ring,
    /// `i` connects to `i±1` where those exist.
    Line,
    /// 2-D grid of side `⌈√n⌉` (the last row may be ragged); up, down,
    /// left, right where in-grid.
    Mesh,
    /// Every node connects to every other node.
    Clique,
}

/// Neighbor ids of `id` in a `topology` of `size` nodes.
pub fn derive_neighbors(topology: Topology, size: u16, id: NodeId) -> SmallVec<[NodeId; 8]> {
    let me = id.get();
    let mut raw: SmallVec<[u16; 8]> = SmallVec::new();
    match topology {
        Topology::Ring => {
            let n = i32::from(size);
            let i = i32::from(me);
            raw.push(((i % n) + 1) as u16);
            raw.push((((i - 2 + n) % n) + 1) as u16);
        }
        Topology::Line => {
            if me > 1 {
                raw.push(me - 1);
            }
            if me < size {
                raw.push(me + 1);
            }
        }
        Topology::Mesh => {
            let mut side = 1u16;
            while side * side < size {
                side += 1;
            }
            let row = (me - 1) / side;
            let col = (me - 1) % side;
            if row > 0 {
                raw.push((row - 1) * side + col + 1);
            }
            let down = (row + 1) * side + col + 1;
            if down <= size {
                raw.push(down);
            }
            if col > 0 {
                raw.push(row * side + col);
            }
            let right = row * side + col + 2;
            if col < side - 1 && right <= size {
                raw.push(right);
            }
        }
        Topology::Clique => {
            raw.extend(1..=size);
        }
    }
    let mut neighbors = SmallVec::new();
    for candidate in raw {
        if candidate == me {
            continue;
        }
        let Some(candidate) = NodeId::new(candidate) else {
            continue;
        };
        if !neighbors.contains(&candidate) {
            neighbors.push(candidate);
        }
    }
    neighbors
}
