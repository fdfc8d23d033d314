//! Priority-based election with broadcast discovery and heartbeat failure
//! detection.
//!
//! The highest live id wins. A node that suspects the coordinator broadcasts
//! `ELECTION`; any higher-priority node silences it with `ANSWER` and the
//! silenced node waits for the winner's `COORDINATOR` announcement. The
//! coordinator proves liveness with periodic `ALIVE` heartbeats; missing
//! them for `coordinator_timeout` is the failure signal that starts the next
//! election. Two extra rules heal partitions: a coordinator that receives an
//! `ELECTION` re-announces itself, and a node that hears `ALIVE` from a
//! better coordinator adopts it directly.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::dedup::DuplicateFilter;
use crate::machine::startup_jitter;
use crate::wire::BullyMessage;
use crate::{Action, Actions, BullyConfig, Event, Machine, NodeId, TimerId};

/// Phase of the election state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BullyState {
    /// A leader is known and trusted; we monitor its heartbeats.
    Normal,
    /// We broadcast `ELECTION` and are waiting for `ANSWER`s.
    Election,
    /// A higher-priority peer silenced us; we await its `COORDINATOR`.
    WaitingCoordinator,
}

/// One node's bully protocol instance.
pub struct Bully {
    id: NodeId,
    config: BullyConfig,
    state: BullyState,
    leader: Option<NodeId>,
    sequence: u16,
    answer_seen: bool,
    filter: DuplicateFilter,
    startup_delay: Duration,
}

impl Bully {
    /// A freshly booted node with a random startup delay.
    pub fn new(id: NodeId, config: BullyConfig) -> Self {
        if !config.detector_is_sound() {
            warn!(
                node = %id,
                "coordinator timeout below twice the alive interval, healthy leaders will be deposed"
            );
        }
        let startup_delay = startup_jitter(config.random_delay_max);
        let filter = DuplicateFilter::new(config.max_nodes);
        Self {
            id,
            config,
            state: BullyState::Normal,
            leader: None,
            sequence: 0,
            answer_seen: false,
            filter,
            startup_delay,
        }
    }

    /// Overrides the random startup delay. Hosts with their own jitter
    /// source (and the deterministic tests) use this.
    pub fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = delay;
        self
    }

    /// Current phase, for observation.
    pub fn state(&self) -> BullyState {
        self.state
    }

    /// The election round counter.
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    fn arm(&self, timer: TimerId) -> Action {
        let after = match timer {
            TimerId::Startup => self.startup_delay,
            TimerId::Election => self.config.election_timeout,
            TimerId::Coordinator => self.config.coordinator_timeout,
            TimerId::Alive => self.config.alive_interval,
            TimerId::Round => Duration::ZERO,
        };
        Action::Arm { timer, after }
    }

    /// Starts a new election round unless one is already running.
    fn begin_election(&mut self, actions: &mut Actions) {
        if self.state == BullyState::Election {
            debug!(node = %self.id, "election already in progress");
            return;
        }
        self.state = BullyState::Election;
        self.sequence = self.sequence.wrapping_add(1);
        self.answer_seen = false;
        info!(node = %self.id, sequence = self.sequence, "starting election");
        actions.push(Action::Send(
            BullyMessage::Election {
                sender: self.id,
                target: None,
                sequence: self.sequence,
            }
            .encode(),
        ));
        actions.push(self.arm(TimerId::Election));
    }

    fn on_frame(&mut self, frame: &[u8], actions: &mut Actions) {
        let message = match BullyMessage::decode(frame) {
            Ok(message) => message,
            Err(error) => {
                warn!(node = %self.id, %error, "dropping malformed frame");
                return;
            }
        };
        let sender = message.sender();
        if sender == self.id {
            return;
        }

        match message {
            BullyMessage::Election {
                target, sequence, ..
            } => {
                if !self.filter.observe(sender, sequence) {
                    info!(node = %self.id, %sender, sequence, "ignoring duplicate election");
                    return;
                }
                if target.is_some_and(|t| t != self.id) || self.id < sender {
                    return;
                }
                info!(node = %self.id, initiator = %sender, "answering election from lower priority");
                actions.push(Action::Send(
                    BullyMessage::Answer {
                        sender: self.id,
                        target: Some(sender),
                        sequence,
                    }
                    .encode(),
                ));
                // Partition healing, mechanism 1: the sitting coordinator
                // re-announces so the initiator adopts it without waiting a
                // full coordinator timeout.
                if self.leader == Some(self.id) {
                    info!(node = %self.id, "re-announcing coordinator status");
                    actions.push(Action::Send(
                        BullyMessage::Coordinator {
                            sender: self.id,
                            sequence: self.sequence,
                        }
                        .encode(),
                    ));
                }
            }
            BullyMessage::Answer { target, .. } => {
                if target != Some(self.id) || self.state != BullyState::Election {
                    return;
                }
                self.answer_seen = true;
                self.state = BullyState::WaitingCoordinator;
                info!(node = %self.id, answerer = %sender, "backing down, awaiting coordinator");
                actions.push(self.arm(TimerId::Coordinator));
            }
            BullyMessage::Coordinator { .. } => {
                if sender >= self.id {
                    info!(node = %self.id, leader = %sender, "accepting coordinator");
                    self.leader = Some(sender);
                    self.state = BullyState::Normal;
                    actions.push(self.arm(TimerId::Coordinator));
                } else {
                    warn!(node = %self.id, claimant = %sender, "rejecting lower-priority coordinator");
                    self.begin_election(actions);
                }
            }
            BullyMessage::Alive { .. } => {
                let adopt = sender > self.id
                    && (self.leader.is_none()
                        || self.state == BullyState::WaitingCoordinator
                        || self.leader.is_some_and(|leader| sender > leader));
                if adopt {
                    // Partition healing, mechanism 2: passive discovery of a
                    // better coordinator through its heartbeat.
                    info!(node = %self.id, leader = %sender, "adopting coordinator heard via alive");
                    self.leader = Some(sender);
                    self.state = BullyState::Normal;
                    actions.push(self.arm(TimerId::Coordinator));
                } else if self.leader == Some(sender) {
                    debug!(node = %self.id, leader = %sender, "leader is alive");
                    actions.push(self.arm(TimerId::Coordinator));
                }
            }
        }
    }

    fn on_timer(&mut self, timer: TimerId, actions: &mut Actions) {
        match timer {
            TimerId::Startup => {
                self.begin_election(actions);
                actions.push(self.arm(TimerId::Coordinator));
                actions.push(self.arm(TimerId::Alive));
            }
            TimerId::Election => {
                if self.state != BullyState::Election && self.state != BullyState::WaitingCoordinator
                {
                    return;
                }
                if self.answer_seen {
                    debug!(node = %self.id, "election lost, awaiting coordinator announcement");
                    return;
                }
                info!(node = %self.id, "no answers received, becoming coordinator");
                self.leader = Some(self.id);
                self.state = BullyState::Normal;
                actions.push(Action::Send(
                    BullyMessage::Coordinator {
                        sender: self.id,
                        sequence: self.sequence,
                    }
                    .encode(),
                ));
                actions.push(self.arm(TimerId::Alive));
            }
            TimerId::Coordinator => {
                if self.state == BullyState::WaitingCoordinator || self.leader.is_none() {
                    info!(node = %self.id, "no coordinator announcement, starting election");
                    self.begin_election(actions);
                } else if self.leader != Some(self.id) {
                    info!(node = %self.id, leader = %self.leader.unwrap_or(self.id), "coordinator heartbeats missed, starting election");
                    self.leader = None;
                    self.begin_election(actions);
                }
                actions.push(self.arm(TimerId::Coordinator));
            }
            TimerId::Alive => {
                if self.leader == Some(self.id) {
                    actions.push(Action::Send(
                        BullyMessage::Alive {
                            sender: self.id,
                            sequence: self.sequence,
                        }
                        .encode(),
                    ));
                }
                actions.push(self.arm(TimerId::Alive));
            }
            TimerId::Round => debug!(node = %self.id, "ignoring unexpected timer"),
        }
    }
}

impl Machine for Bully {
    fn start(&mut self) -> Actions {
        info!(node = %self.id, delay_ms = self.startup_delay.as_millis() as u64, "bully node starting");
        let mut actions = Actions::new();
        actions.push(self.arm(TimerId::Startup));
        actions
    }

    fn handle(&mut self, event: Event<'_>) -> Actions {
        let mut actions = Actions::new();
        match event {
            Event::Frame(frame) => self.on_frame(frame, &mut actions),
            Event::Timer(timer) => self.on_timer(timer, &mut actions),
        }
        actions
    }

    fn id(&self) -> NodeId {
        self.id
    }

    fn leader(&self) -> Option<NodeId> {
        self.leader
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u16) -> NodeId {
        NodeId::new(raw).unwrap()
    }

    fn booted(raw: u16) -> Bully {
        let mut node =
            Bully::new(id(raw), BullyConfig::default()).with_startup_delay(Duration::ZERO);
        node.start();
        node.handle(Event::Timer(TimerId::Startup));
        node
    }

    fn sends(actions: &Actions) -> Vec<BullyMessage> {
        actions
            .iter()
            .filter_map(|action| match action {
                Action::Send(frame) => Some(BullyMessage::decode(frame).unwrap()),
                Action::Arm { .. } => None,
            })
            .collect()
    }

    #[test]
    fn boot_broadcasts_an_election() {
        let mut node = Bully::new(id(2), BullyConfig::default()).with_startup_delay(Duration::ZERO);
        node.start();
        let actions = node.handle(Event::Timer(TimerId::Startup));
        assert_eq!(
            vec![BullyMessage::Election {
                sender: id(2),
                target: None,
                sequence: 1,
            }],
            sends(&actions)
        );
        assert_eq!(BullyState::Election, node.state());
    }

    #[test]
    fn higher_priority_node_answers_an_election() {
        let mut node = booted(5);
        let frame = BullyMessage::Election {
            sender: id(2),
            target: None,
            sequence: 1,
        }
        .encode();
        let actions = node.handle(Event::Frame(&frame));
        assert_eq!(
            vec![BullyMessage::Answer {
                sender: id(5),
                target: Some(id(2)),
                sequence: 1,
            }],
            sends(&actions)
        );
    }

    #[test]
    fn lower_priority_node_stays_silent() {
        let mut node = booted(2);
        let frame = BullyMessage::Election {
            sender: id(5),
            target: None,
            sequence: 1,
        }
        .encode();
        let actions = node.handle(Event::Frame(&frame));
        assert!(sends(&actions).is_empty());
    }

    #[test]
    fn duplicate_election_is_answered_once() {
        let mut node = booted(5);
        let frame = BullyMessage::Election {
            sender: id(2),
            target: None,
            sequence: 1,
        }
        .encode();
        let first = node.handle(Event::Frame(&frame));
        assert_eq!(1, sends(&first).len());
        let second = node.handle(Event::Frame(&frame));
        assert!(second.is_empty());
    }

    #[test]
    fn answer_moves_initiator_to_waiting() {
        let mut node = booted(2);
        let frame = BullyMessage::Answer {
            sender: id(5),
            target: Some(id(2)),
            sequence: 1,
        }
        .encode();
        node.handle(Event::Frame(&frame));
        assert_eq!(BullyState::WaitingCoordinator, node.state());

        // With an answer in hand, the election timeout must not crown us.
        let actions = node.handle(Event::Timer(TimerId::Election));
        assert!(actions.is_empty());
        assert_eq!(None, node.leader());
    }

    #[test]
    fn unanswered_election_crowns_the_initiator() {
        let mut node = booted(5);
        let actions = node.handle(Event::Timer(TimerId::Election));
        assert_eq!(
            vec![BullyMessage::Coordinator {
                sender: id(5),
                sequence: 1,
            }],
            sends(&actions)
        );
        assert_eq!(Some(id(5)), node.leader());
        assert_eq!(BullyState::Normal, node.state());
    }

    #[test]
    fn coordinator_from_higher_priority_is_accepted() {
        let mut node = booted(2);
        let frame = BullyMessage::Coordinator {
            sender: id(6),
            sequence: 1,
        }
        .encode();
        node.handle(Event::Frame(&frame));
        assert_eq!(Some(id(6)), node.leader());
        assert_eq!(BullyState::Normal, node.state());
    }

    #[test]
    fn repeated_coordinator_announcement_is_idempotent() {
        let mut node = booted(2);
        let frame = BullyMessage::Coordinator {
            sender: id(6),
            sequence: 1,
        }
        .encode();
        node.handle(Event::Frame(&frame));
        let again = node.handle(Event::Frame(&frame));
        assert_eq!(Some(id(6)), node.leader());
        assert_eq!(BullyState::Normal, node.state());
        assert!(sends(&again).is_empty());
    }

    #[test]
    fn lower_priority_coordinator_is_rejected_with_an_election() {
        let mut node = booted(5);
        node.handle(Event::Timer(TimerId::Election));
        assert_eq!(Some(id(5)), node.leader());

        let frame = BullyMessage::Coordinator {
            sender: id(3),
            sequence: 9,
        }
        .encode();
        let actions = node.handle(Event::Frame(&frame));
        let sent = sends(&actions);
        assert!(matches!(sent[0], BullyMessage::Election { .. }));
        assert_eq!(BullyState::Election, node.state());
    }

    #[test]
    fn alive_from_better_coordinator_is_adopted() {
        let mut node = booted(2);
        let frame = BullyMessage::Coordinator {
            sender: id(4),
            sequence: 1,
        }
        .encode();
        node.handle(Event::Frame(&frame));
        assert_eq!(Some(id(4)), node.leader());

        let alive = BullyMessage::Alive {
            sender: id(6),
            sequence: 3,
        }
        .encode();
        node.handle(Event::Frame(&alive));
        assert_eq!(Some(id(6)), node.leader());
    }

    #[test]
    fn alive_from_a_stranger_is_ignored_in_normal_state() {
        let mut node = booted(2);
        let frame = BullyMessage::Coordinator {
            sender: id(6),
            sequence: 1,
        }
        .encode();
        node.handle(Event::Frame(&frame));

        let alive = BullyMessage::Alive {
            sender: id(4),
            sequence: 3,
        }
        .encode();
        let actions = node.handle(Event::Frame(&alive));
        assert!(actions.is_empty());
        assert_eq!(Some(id(6)), node.leader());
    }

    #[test]
    fn coordinator_timeout_clears_the_dead_leader() {
        let mut node = booted(2);
        let frame = BullyMessage::Coordinator {
            sender: id(6),
            sequence: 1,
        }
        .encode();
        node.handle(Event::Frame(&frame));

        let actions = node.handle(Event::Timer(TimerId::Coordinator));
        let sent = sends(&actions);
        assert!(matches!(sent[0], BullyMessage::Election { .. }));
        assert_eq!(None, node.leader());
        assert_eq!(BullyState::Election, node.state());
    }

    #[test]
    fn sitting_coordinator_reannounces_on_election() {
        let mut node = booted(6);
        node.handle(Event::Timer(TimerId::Election));
        assert_eq!(Some(id(6)), node.leader());

        let frame = BullyMessage::Election {
            sender: id(2),
            target: None,
            sequence: 4,
        }
        .encode();
        let actions = node.handle(Event::Frame(&frame));
        let sent = sends(&actions);
        assert_eq!(2, sent.len());
        assert!(matches!(sent[0], BullyMessage::Answer { .. }));
        assert!(matches!(sent[1], BullyMessage::Coordinator { .. }));
    }

    #[test]
    fn leader_heartbeats_on_the_alive_timer() {
        let mut node = booted(6);
        node.handle(Event::Timer(TimerId::Election));

        let actions = node.handle(Event::Timer(TimerId::Alive));
        assert_eq!(
            vec![BullyMessage::Alive {
                sender: id(6),
                sequence: 1,
            }],
            sends(&actions)
        );

        // Followers stay silent on their alive timer.
        let mut follower = booted(2);
        let actions = follower.handle(Event::Timer(TimerId::Alive));
        assert!(sends(&actions).is_empty());
    }

    #[test]
    fn malformed_and_self_frames_are_dropped() {
        let mut node = booted(3);
        assert!(node.handle(Event::Frame(&[0xff; 4])).is_empty());

        let own = BullyMessage::Alive {
            sender: id(3),
            sequence: 1,
        }
        .encode();
        assert!(node.handle(Event::Frame(&own)).is_empty());
    }
}
