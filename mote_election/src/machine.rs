//! The event seam between a protocol machine and its host loop.
//!
//! A machine is a synchronous step function: the host feeds it one
//! [`Event`] at a time and carries out the [`Action`]s it returns. All
//! protocol state lives inside the machine; the host owns the clock, the
//! socket, and the [`TimerSet`](crate::TimerSet). This keeps the machines
//! deterministic — a recorded event sequence replays bit-for-bit, which is
//! what the simulation harness and the scenario tests build on.

use std::time::Duration;

use bytes::Bytes;
use rand::Rng;
use smallvec::SmallVec;

use crate::{NodeId, TimerId};

/// One input to a protocol machine.
#[derive(Clone, Copy, Debug)]
pub enum Event<'a> {
    /// A raw frame delivered by the single-hop broadcast transport.
    ///
    /// Frames arrive undecoded; the machine runs its own codec and drops
    /// anything malformed. The transport guarantees nothing: no ordering,
    /// no reliability, no duplicate suppression.
    Frame(&'a [u8]),
    /// A named timer armed earlier by this machine has expired.
    Timer(TimerId),
}

/// One output of a protocol machine, to be carried out by the host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    /// Broadcast `payload` to all single-hop neighbors, fire-and-forget.
    Send(Bytes),
    /// Arm `timer` to fire `after` from now. Arming an already-armed timer
    /// resets its deadline; timers never repeat implicitly.
    Arm { timer: TimerId, after: Duration },
}

/// The actions produced by a single event step.
pub type Actions = SmallVec<[Action; 4]>;

/// A leader-election protocol instance for one node.
///
/// Handlers are total: they may do nothing, but they never fail. Errors a
/// handler encounters (malformed frames, stale sequences, invalid
/// coordinators) are protocol inputs, dealt with by logging and by the
/// transition rules themselves.
pub trait Machine {
    /// Boots the machine. Typically arms the startup jitter timer; no
    /// traffic is sent before that timer fires.
    fn start(&mut self) -> Actions;

    /// Advances the machine by one event.
    fn handle(&mut self, event: Event<'_>) -> Actions;

    /// This node's identifier.
    fn id(&self) -> NodeId;

    /// The leader this node currently recognizes, if any.
    fn leader(&self) -> Option<NodeId>;
}

/// Uniform random delay in `[0, max)`, used to stagger booting peers.
pub(crate) fn startup_jitter(max: Duration) -> Duration {
    if max.is_zero() {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..max.as_millis() as u64))
}
