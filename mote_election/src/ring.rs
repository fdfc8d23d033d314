//! Token-passing election over a fixed logical ring.
//!
//! Nodes form the ring `1 -> 2 -> ... -> N -> 1`; each one knows only its
//! successor. A single `ELECTION` token circulates and accumulates the
//! highest id; when it returns to its initiator the collected candidate is
//! the leader and a `COORDINATOR` token circulates once to announce it. The
//! leader keeps injecting an `ALIVE` token as heartbeat. Any lost token is
//! recovered by timer-driven re-initiation; a dead intermediate node
//! segments the ring, which this design deliberately does not survive.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::machine::startup_jitter;
use crate::wire::RingMessage;
use crate::{Action, Actions, Event, Machine, NodeId, RingConfig, TimerId};

/// Phase of the ring state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RingState {
    /// A leader is known (or none is expected yet).
    Normal,
    /// An election token is circulating through us.
    Election,
    /// Kept for parity with the bully machine; the ring never waits on a
    /// separate announcement phase.
    WaitingCoordinator,
}

/// One node's ring protocol instance.
pub struct Ring {
    id: NodeId,
    config: RingConfig,
    state: RingState,
    leader: Option<NodeId>,
    sequence: u16,
    successor: NodeId,
    election_in_progress: bool,
    startup_delay: Duration,
}

impl Ring {
    /// A freshly booted node; its successor is fixed by the static ring.
    pub fn new(id: NodeId, config: RingConfig) -> Self {
        let raw = if id.get() >= config.ring_size {
            1
        } else {
            id.get() + 1
        };
        let successor = NodeId::new(raw).expect("ring successor is never id 0");
        let startup_delay = startup_jitter(config.random_delay_max);
        Self {
            id,
            config,
            state: RingState::Normal,
            leader: None,
            sequence: 0,
            successor,
            election_in_progress: false,
            startup_delay,
        }
    }

    /// Overrides the random startup delay (hosts with their own jitter
    /// source, deterministic tests).
    pub fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = delay;
        self
    }

    /// Current phase, for observation.
    pub fn state(&self) -> RingState {
        self.state
    }

    /// The fixed successor this node forwards every token to.
    pub fn successor(&self) -> NodeId {
        self.successor
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

    fn begin_election(&mut self, actions: &mut Actions) {
        if self.election_in_progress {
            debug!(node = %self.id, "election already in progress");
            return;
        }
        self.state = RingState::Election;
        self.sequence = self.sequence.wrapping_add(1);
        self.election_in_progress = true;
        info!(node = %self.id, sequence = self.sequence, "starting ring election");
        actions.push(Action::Send(
            RingMessage::Election {
                initiator: self.id,
                candidate: self.id,
                sequence: self.sequence,
                target: self.successor,
            }
            .encode(),
        ));
        actions.push(self.arm(TimerId::Election));
    }

    fn on_frame(&mut self, frame: &[u8], actions: &mut Actions) {
        let message = match RingMessage::decode(frame) {
            Ok(message) => message,
            Err(error) => {
                warn!(node = %self.id, %error, "dropping malformed frame");
                return;
            }
        };
        if message.target() != self.id {
            return;
        }

        match message {
            RingMessage::Election {
                initiator,
                candidate,
                sequence,
                ..
            } => {
                if initiator == self.id {
                    // The token circled the whole ring; whatever it collected
                    // is the leader — us or a higher id further along.
                    info!(node = %self.id, leader = %candidate, "election token returned");
                    self.leader = Some(candidate);
                    self.state = RingState::Normal;
                    self.election_in_progress = false;
                    actions.push(Action::Send(
                        RingMessage::Coordinator {
                            initiator: self.id,
                            candidate,
                            sequence,
                            target: self.successor,
                        }
                        .encode(),
                    ));
                } else {
                    let forwarded = candidate.max(self.id);
                    if forwarded != candidate {
                        debug!(node = %self.id, old = %candidate, new = %forwarded, "updating candidate");
                    }
                    self.state = RingState::Election;
                    self.election_in_progress = true;
                    actions.push(Action::Send(
                        RingMessage::Election {
                            initiator,
                            candidate: forwarded,
                            sequence,
                            target: self.successor,
                        }
                        .encode(),
                    ));
                    actions.push(self.arm(TimerId::Election));
                }
            }
            RingMessage::Coordinator {
                initiator,
                candidate,
                sequence,
                ..
            } => {
                if initiator == self.id {
                    // One full circulation; everyone downstream has seen it.
                    if self.leader != Some(candidate) {
                        self.leader = Some(candidate);
                        self.state = RingState::Normal;
                    }
                    self.election_in_progress = false;
                    debug!(node = %self.id, "coordinator announcement completed the ring");
                } else {
                    info!(node = %self.id, leader = %candidate, "accepting coordinator");
                    self.leader = Some(candidate);
                    self.state = RingState::Normal;
                    self.election_in_progress = false;
                    actions.push(Action::Send(
                        RingMessage::Coordinator {
                            initiator,
                            candidate,
                            sequence,
                            target: self.successor,
                        }
                        .encode(),
                    ));
                }
            }
            RingMessage::Alive {
                initiator,
                candidate,
                sequence,
                ..
            } => {
                if initiator == self.id && self.leader == Some(self.id) {
                    debug!(node = %self.id, "alive token completed the ring");
                } else if self.leader == Some(initiator) {
                    debug!(node = %self.id, leader = %initiator, "leader is alive, forwarding");
                    actions.push(Action::Send(
                        RingMessage::Alive {
                            initiator,
                            candidate,
                            sequence,
                            target: self.successor,
                        }
                        .encode(),
                    ));
                } else {
                    warn!(node = %self.id, claimant = %initiator, "dropping alive from non-leader");
                }
            }
        }
    }

    fn on_timer(&mut self, timer: TimerId, actions: &mut Actions) {
        match timer {
            TimerId::Startup => {
                if self.id.get() == self.config.ring_size {
                    info!(node = %self.id, "highest id on the ring, starting initial election");
                    self.begin_election(actions);
                }
                actions.push(self.arm(TimerId::Coordinator));
                actions.push(self.arm(TimerId::Alive));
            }
            TimerId::Election => {
                if self.state == RingState::Election && self.election_in_progress {
                    info!(node = %self.id, "election token lost, restarting election");
                    self.election_in_progress = false;
                    self.begin_election(actions);
                }
            }
            TimerId::Coordinator => {
                if self.leader.is_none() && !self.election_in_progress {
                    info!(node = %self.id, "no leader known, starting election");
                    self.begin_election(actions);
                }
                actions.push(self.arm(TimerId::Coordinator));
            }
            TimerId::Alive => {
                if self.leader == Some(self.id) {
                    actions.push(Action::Send(
                        RingMessage::Alive {
                            initiator: self.id,
                            candidate: self.id,
                            sequence: self.sequence,
                            target: self.successor,
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

impl Machine for Ring {
    fn start(&mut self) -> Actions {
        info!(
            node = %self.id,
            successor = %self.successor,
            delay_ms = self.startup_delay.as_millis() as u64,
            "ring node starting"
        );
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
