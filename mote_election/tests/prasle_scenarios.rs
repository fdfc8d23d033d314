//! Convergence scenarios for the self-stabilizing round protocol.
//!
//! The simulator's bus delivers broadcasts to everyone, so these tests
//! install link filters that enforce the configured radio topology — the
//! simulated counterpart of radio range.

use std::time::Duration;

use mote_election::prasle::{Prasle, Rank, Topology};
use mote_election::sim::SimNet;
use mote_election::{NodeId, PrasleConfig};

fn id(raw: u16) -> NodeId {
    NodeId::new(raw).unwrap()
}

fn ring_adjacent(n: u16, a: NodeId, b: NodeId) -> bool {
    (a.get() % n) + 1 == b.get() || (b.get() % n) + 1 == a.get()
}

fn six_ring() -> SimNet<Prasle> {
    let config = PrasleConfig::default();
    let mut net = SimNet::new((1..=6).map(|raw| {
        Prasle::new(id(raw), config.clone())
            .with_startup_delay(Duration::from_millis(1000 + u64::from(raw) * 10))
    }));
    net.set_link_filter(|a, b| ring_adjacent(6, a, b));
    net
}

#[test]
fn six_ring_converges_to_the_minimum() {
    let mut net = six_ring();
    // K = 10 one-second rounds plus startup; 20 s covers the full horizon.
    net.run_for(Duration::from_secs(20));
    for (node, leader) in net.leaders() {
        assert_eq!(Some(id(1)), leader, "node {node} disagrees");
        let machine = net.machine(node);
        assert_eq!(Rank { min: 1, leader: 1 }, machine.rank());
        assert!(machine.converged(), "node {node} never converged");
    }
}

#[test]
fn diameter_bound_propagation_is_fast() {
    let mut net = six_ring();
    // The ring has diameter 3; a handful of rounds suffices for the
    // farthest node, well before the K-round horizon.
    net.run_for(Duration::from_secs(7));
    for (node, _) in net.leaders() {
        assert_eq!(Rank { min: 1, leader: 1 }, net.machine(node).rank());
    }
}

#[test]
fn rank_decreases_monotonically_everywhere() {
    let mut net = six_ring();
    let mut previous: Vec<(NodeId, Rank)> = net
        .leaders()
        .iter()
        .map(|&(node, _)| (node, net.machine(node).rank()))
        .collect();

    for _ in 0..200 {
        if !net.step() {
            break;
        }
        for entry in &mut previous {
            let rank = net.machine(entry.0).rank();
            assert!(rank <= entry.1, "rank went up on node {}", entry.0);
            entry.1 = rank;
        }
    }
}

#[test]
fn a_dead_link_reroutes_around_the_ring() {
    let mut net = six_ring();
    // Lose the 1 <-> 2 edge entirely; the minimum's gossip takes the long
    // way around (1 -> 6 -> 5 -> 4 -> 3 -> 2) and still wins.
    net.set_link_filter(|a, b| {
        let broken = (a.get(), b.get()) == (1, 2) || (a.get(), b.get()) == (2, 1);
        ring_adjacent(6, a, b) && !broken
    });
    net.run_for(Duration::from_secs(25));
    for (node, _) in net.leaders() {
        assert_eq!(Rank { min: 1, leader: 1 }, net.machine(node).rank());
    }
}

#[test]
fn line_topology_converges_end_to_end() {
    let config = PrasleConfig {
        topology: Topology::Line,
        ..PrasleConfig::default()
    };
    let mut net = SimNet::new((1..=6).map(|raw| {
        Prasle::new(id(raw), config.clone())
            .with_startup_delay(Duration::from_millis(1000 + u64::from(raw) * 10))
    }));
    // A line's adjacency is the ring's minus the wrap-around edge.
    net.set_link_filter(|a, b| a.get().abs_diff(b.get()) == 1);

    net.run_for(Duration::from_secs(20));
    for (node, leader) in net.leaders() {
        assert_eq!(Some(id(1)), leader, "node {node} disagrees");
        assert!(net.machine(node).converged());
    }
}

#[test]
fn clique_converges_in_a_couple_of_rounds() {
    let config = PrasleConfig {
        topology: Topology::Clique,
        ..PrasleConfig::default()
    };
    let mut net = SimNet::new((1..=6).map(|raw| {
        Prasle::new(id(raw), config.clone())
            .with_startup_delay(Duration::from_millis(1000 + u64::from(raw) * 10))
    }));

    net.run_for(Duration::from_secs(5));
    for (node, _) in net.leaders() {
        assert_eq!(Rank { min: 1, leader: 1 }, net.machine(node).rank());
    }
}

#[test]
fn neighbor_caches_reflect_the_last_gossip_heard() {
    let mut net = six_ring();
    net.run_for(Duration::from_secs(20));

    let four = net.machine(id(4));
    let three = four.neighbor(id(3)).expect("3 is a neighbor of 4");
    assert!(three.heard);
    assert_eq!(Rank { min: 1, leader: 1 }, three.rank);
    assert!(four.neighbor(id(1)).is_none());
}
