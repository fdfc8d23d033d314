//! Named one-shot timers.
//!
//! The protocol machines never read the clock; they request timers through
//! [`Action::Arm`](crate::Action) and react to [`Event::Timer`](crate::Event)
//! when the host loop reports an expiry. [`TimerSet`] is the deadline
//! bookkeeping shared by the hosts: a timer is `{deadline, armed}`, rearming
//! overwrites the deadline, and expiries are handed out in deadline order.

use std::time::{Duration, Instant};

/// The named one-shot timers used across the three protocols.
///
/// Each machine uses the subset it needs; a timer that is never armed never
/// fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimerId {
    /// Random startup delay that desynchronizes booting peers.
    Startup,
    /// Bounds the wait for election responses (bully) or a circulating
    /// election token (ring).
    Election,
    /// Failure detector for the current coordinator.
    Coordinator,
    /// Periodic heartbeat cadence for the coordinator itself.
    Alive,
    /// Receive-window boundary of the round-based protocol.
    Round,
}

impl TimerId {
    /// Every timer, in tie-breaking order for simultaneous expiry.
    pub const ALL: [TimerId; 5] = [
        TimerId::Startup,
        TimerId::Election,
        TimerId::Coordinator,
        TimerId::Alive,
        TimerId::Round,
    ];

    fn index(self) -> usize {
        match self {
            TimerId::Startup => 0,
            TimerId::Election => 1,
            TimerId::Coordinator => 2,
            TimerId::Alive => 3,
            TimerId::Round => 4,
        }
    }
}

/// Deadline bookkeeping for one node's timers.
#[derive(Clone, Debug, Default)]
pub struct TimerSet {
    deadlines: [Option<Instant>; 5],
}

impl TimerSet {
    /// An empty set with every timer disarmed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms `timer` to fire at `deadline`, replacing any earlier deadline.
    pub fn arm(&mut self, timer: TimerId, deadline: Instant) {
        self.deadlines[timer.index()] = Some(deadline);
    }

    /// Arms `timer` to fire `after` from `now`.
    pub fn arm_after(&mut self, timer: TimerId, now: Instant, after: Duration) {
        self.arm(timer, now + after);
    }

    /// Disarms `timer`; a disarmed timer never expires.
    pub fn disarm(&mut self, timer: TimerId) {
        self.deadlines[timer.index()] = None;
    }

    /// Whether `timer` currently has a pending deadline.
    pub fn is_armed(&self, timer: TimerId) -> bool {
        self.deadlines[timer.index()].is_some()
    }

    /// The earliest pending deadline, if any timer is armed.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.iter().flatten().copied().min()
    }

    /// Removes and returns the earliest timer with `deadline <= now`.
    ///
    /// Returns one expiry per call so the caller can interleave the
    /// machine's reaction (which may rearm the very same timer) before
    /// looking for the next one. Simultaneous deadlines break ties in
    /// [`TimerId::ALL`] order.
    pub fn pop_expired(&mut self, now: Instant) -> Option<TimerId> {
        let mut best: Option<(Instant, TimerId)> = None;
        for timer in TimerId::ALL {
            if let Some(deadline) = self.deadlines[timer.index()] {
                if deadline <= now && best.map_or(true, |(d, _)| deadline < d) {
                    best = Some((deadline, timer));
                }
            }
        }
        let (_, timer) = best?;
        self.disarm(timer);
        Some(timer)
    }
}
