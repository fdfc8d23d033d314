//! Token circulation scenarios for the ring protocol.

use std::time::Duration;

use mote_election::ring::Ring;
use mote_election::sim::SimNet;
use mote_election::{Event, Machine, NodeId, RingConfig};

fn id(raw: u16) -> NodeId {
    NodeId::new(raw).unwrap()
}

fn ring_of_six() -> SimNet<Ring> {
    SimNet::new((1..=6).map(|raw| {
        Ring::new(id(raw), RingConfig::default())
            .with_startup_delay(Duration::from_millis(u64::from(raw) * 100))
    }))
}

#[test]
fn highest_node_bootstraps_and_wins() {
    let mut net = ring_of_six();
    net.run_for(Duration::from_secs(5));
    for (node, leader) in net.leaders() {
        assert_eq!(Some(id(6)), leader, "node {node} disagrees");
    }
}

#[test]
fn heartbeat_tokens_circulate_without_reelection() {
    let mut net = ring_of_six();
    net.run_for(Duration::from_secs(5));

    // Three alive intervals; a broken heartbeat chain would show up as a
    // bumped election sequence on the leader.
    net.run_for(Duration::from_secs(35));
    assert_eq!(1, net.machine(id(6)).sequence());
    for (_, leader) in net.leaders() {
        assert_eq!(Some(id(6)), leader);
    }
}

#[test]
fn lost_election_token_is_reinitiated() {
    let mut net = ring_of_six();
    // Swallow node 6's first broadcast entirely (one frame, five
    // deliveries): the bootstrap token vanishes on the wire.
    let mut dropped = 0;
    net.set_link_filter(move |from, _to| {
        if from == id(6) && dropped < 5 {
            dropped += 1;
            false
        } else {
            true
        }
    });

    net.run_for(Duration::from_secs(20));
    // The election timeout fired on node 6 and the rerun succeeded.
    assert_eq!(2, net.machine(id(6)).sequence());
    for (_, leader) in net.leaders() {
        assert_eq!(Some(id(6)), leader);
    }
}

/// Scenario: a node that is not the maximum initiates. The token circles,
/// accumulates the true maximum, and the initiator both adopts it and
/// announces it on the token's return.
#[test]
fn lower_initiator_adopts_the_collected_maximum() {
    let mut nodes: Vec<Ring> = (1..=6)
        .map(|raw| {
            let mut node =
                Ring::new(id(raw), RingConfig::default()).with_startup_delay(Duration::ZERO);
            node.start();
            node
        })
        .collect();

    // Node 3 starts an election off its coordinator timeout.
    let mut frames: Vec<bytes::Bytes> = nodes[2]
        .handle(Event::Timer(mote_election::TimerId::Coordinator))
        .into_iter()
        .filter_map(|action| match action {
            mote_election::Action::Send(frame) => Some(frame),
            mote_election::Action::Arm { .. } => None,
        })
        .collect();

    // Thread every emitted frame to its ring target until the network goes
    // quiet.
    let mut hops = 0;
    while let Some(frame) = frames.pop() {
        hops += 1;
        assert!(hops < 32, "token never terminated");
        let target = mote_election::wire::RingMessage::decode(&frame).unwrap().target();
        let receiver = &mut nodes[usize::from(target.get()) - 1];
        frames.extend(
            receiver
                .handle(Event::Frame(&frame))
                .into_iter()
                .filter_map(|action| match action {
                    mote_election::Action::Send(frame) => Some(frame),
                    mote_election::Action::Arm { .. } => None,
                }),
        );
    }

    // Election went 3 -> 4 -> 5 -> 6 -> 1 -> 2 -> 3 collecting 6, then the
    // announcement circled once: 6 hops election + 6 hops coordinator.
    assert_eq!(12, hops);
    for node in &nodes {
        assert_eq!(Some(id(6)), node.leader(), "node {} disagrees", node.id());
    }
}

#[test]
fn stale_frames_for_other_targets_never_disturb_the_ring() {
    let mut net = ring_of_six();
    net.run_for(Duration::from_secs(40));
    // Every frame on the bus reached all six nodes, yet only the addressed
    // successor ever acted: a single stable leader, one election total.
    assert_eq!(1, net.machine(id(6)).sequence());
    for (_, leader) in net.leaders() {
        assert_eq!(Some(id(6)), leader);
    }
}
