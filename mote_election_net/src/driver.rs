//! The per-node event loop: one task per machine.
//!
//! Mirrors the simulator's dispatcher, but against the real clock and a
//! real socket: a `select` over the next frame and the earliest armed
//! deadline, feeding whichever fires into the machine and carrying out the
//! returned actions.

use std::time::Instant;

use mote_election::{Action, Actions, Event, Machine, NodeId, TimerSet};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::link::UdpLink;

/// Handle to a spawned node. Dropping it stops the node.
pub struct NodeHandle {
    leader: watch::Receiver<Option<NodeId>>,
    join: JoinHandle<()>,
}

impl NodeHandle {
    /// The leader the node currently recognizes.
    pub fn leader(&self) -> Option<NodeId> {
        *self.leader.borrow()
    }

    /// Waits for the recognized leader to change and returns the new value.
    pub async fn leader_changed(&mut self) -> Option<NodeId> {
        let _ = self.leader.changed().await;
        *self.leader.borrow()
    }

    /// Stops the node task.
    pub fn abort(&self) {
        self.join.abort();
    }
}

impl Drop for NodeHandle {
    fn drop(&mut self) {
        self.join.abort();
    }
}

/// Boots `machine` on its own task, driven by `link` and the real clock.
pub fn spawn_node<M>(machine: M, link: UdpLink) -> NodeHandle
where
    M: Machine + Send + 'static,
{
    let (tx, rx) = watch::channel(machine.leader());
    let join = tokio::spawn(run_node(machine, link, tx));
    NodeHandle { leader: rx, join }
}

async fn run_node<M: Machine>(
    mut machine: M,
    mut link: UdpLink,
    leader: watch::Sender<Option<NodeId>>,
) {
    let mut timers = TimerSet::new();
    let actions = machine.start();
    perform(actions, &mut timers, &mut link).await;
    publish(&leader, machine.leader());

    loop {
        let deadline = timers.next_deadline();
        tokio::select! {
            frame = link.recv() => {
                let Some((payload, _from)) = frame else {
                    debug!(node = %machine.id(), "socket closed, stopping node");
                    break;
                };
                let actions = machine.handle(Event::Frame(payload.as_ref()));
                perform(actions, &mut timers, &mut link).await;
            }
            _ = sleep_until(deadline), if deadline.is_some() => {
                let now = Instant::now();
                while let Some(timer) = timers.pop_expired(now) {
                    let actions = machine.handle(Event::Timer(timer));
                    perform(actions, &mut timers, &mut link).await;
                }
            }
        }
        publish(&leader, machine.leader());
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    if let Some(deadline) = deadline {
        tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await;
    }
}

async fn perform(actions: Actions, timers: &mut TimerSet, link: &mut UdpLink) {
    let now = Instant::now();
    for action in actions {
        match action {
            Action::Send(payload) => link.broadcast(payload).await,
            Action::Arm { timer, after } => timers.arm_after(timer, now, after),
        }
    }
}

fn publish(leader: &watch::Sender<Option<NodeId>>, value: Option<NodeId>) {
    leader.send_if_modified(|current| {
        if *current == value {
            false
        } else {
            *current = value;
            true
        }
    });
}
