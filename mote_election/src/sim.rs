//! Deterministic in-process simulation of a broadcast network.
//!
//! Runs any number of [`Machine`]s against a virtual clock and a lossless
//! (unless told otherwise) single-hop broadcast bus. Time never passes by
//! sleeping: [`SimNet::step`] jumps straight to the earliest armed deadline
//! and fires it, and frames are delivered synchronously in node order. The
//! same machines and the same fault schedule therefore replay the exact
//! same run, which is what the scenario tests rely on.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::{Action, Actions, Event, Machine, NodeId, TimerSet};

/// Decides whether a frame from the first node reaches the second.
pub type LinkFilter = Box<dyn FnMut(NodeId, NodeId) -> bool>;

struct SimNode<M> {
    machine: M,
    timers: TimerSet,
    alive: bool,
}

/// A network of machines under a virtual clock.
pub struct SimNet<M> {
    nodes: Vec<SimNode<M>>,
    now: Instant,
    filter: Option<LinkFilter>,
}

impl<M: Machine> SimNet<M> {
    /// Boots `machines` into a fully connected broadcast network.
    pub fn new(machines: impl IntoIterator<Item = M>) -> Self {
        let mut net = Self {
            nodes: machines
                .into_iter()
                .map(|machine| SimNode {
                    machine,
                    timers: TimerSet::new(),
                    alive: true,
                })
                .collect(),
            now: Instant::now(),
            filter: None,
        };
        for index in 0..net.nodes.len() {
            let actions = net.nodes[index].machine.start();
            net.dispatch(index, actions);
        }
        net
    }

    /// The current virtual time.
    pub fn now(&self) -> Instant {
        self.now
    }

    fn index_of(&self, id: NodeId) -> usize {
        self.nodes
            .iter()
            .position(|node| node.machine.id() == id)
            .expect("no node with that id in the simulation")
    }

    /// Read access to one node's machine.
    pub fn machine(&self, id: NodeId) -> &M {
        &self.nodes[self.index_of(id)].machine
    }

    /// Crash-stops a node: its timers stop firing and its frames stop
    /// arriving. There is no recovery.
    pub fn crash(&mut self, id: NodeId) {
        let index = self.index_of(id);
        self.nodes[index].alive = false;
    }

    /// Installs a link filter consulted for every (sender, receiver) pair.
    pub fn set_link_filter(&mut self, filter: impl FnMut(NodeId, NodeId) -> bool + 'static) {
        self.filter = Some(Box::new(filter));
    }

    /// Removes the link filter; delivery becomes lossless again.
    pub fn clear_link_filter(&mut self) {
        self.filter = None;
    }

    /// Partitions the network: frames pass only between nodes sharing a
    /// group. Nodes listed in no group are isolated.
    pub fn partition(&mut self, groups: &[&[u16]]) {
        let groups: Vec<Vec<u16>> = groups.iter().map(|group| group.to_vec()).collect();
        self.set_link_filter(move |from, to| {
            groups
                .iter()
                .any(|group| group.contains(&from.get()) && group.contains(&to.get()))
        });
    }

    /// Heals all partitions and losses.
    pub fn heal(&mut self) {
        self.clear_link_filter();
    }

    /// `(id, leader)` snapshot of every live node.
    pub fn leaders(&self) -> Vec<(NodeId, Option<NodeId>)> {
        self.nodes
            .iter()
            .filter(|node| node.alive)
            .map(|node| (node.machine.id(), node.machine.leader()))
            .collect()
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.nodes
            .iter()
            .filter(|node| node.alive)
            .filter_map(|node| node.timers.next_deadline())
            .min()
    }

    /// Jumps to the earliest armed deadline and fires everything due then.
    ///
    /// Returns `false` when no live node has an armed timer left.
    pub fn step(&mut self) -> bool {
        let Some(deadline) = self.next_deadline() else {
            return false;
        };
        self.now = self.now.max(deadline);
        for index in 0..self.nodes.len() {
            if !self.nodes[index].alive {
                continue;
            }
            while let Some(timer) = self.nodes[index].timers.pop_expired(self.now) {
                let actions = self.nodes[index].machine.handle(Event::Timer(timer));
                self.dispatch(index, actions);
            }
        }
        true
    }

    /// Fires every expiry scheduled within the next `duration` of virtual
    /// time, then advances the clock to the end of that window.
    pub fn run_for(&mut self, duration: Duration) {
        let horizon = self.now + duration;
        while self.next_deadline().is_some_and(|deadline| deadline <= horizon) {
            self.step();
        }
        self.now = horizon;
    }

    fn dispatch(&mut self, origin: usize, actions: Actions) {
        let mut frames = VecDeque::new();
        self.absorb(origin, actions, &mut frames);
        while let Some((from, payload)) = frames.pop_front() {
            self.broadcast(from, &payload, &mut frames);
        }
    }

    fn absorb(&mut self, origin: usize, actions: Actions, frames: &mut VecDeque<(usize, Bytes)>) {
        for action in actions {
            match action {
                Action::Send(payload) => frames.push_back((origin, payload)),
                Action::Arm { timer, after } => {
                    self.nodes[origin].timers.arm_after(timer, self.now, after);
                }
            }
        }
    }

    fn broadcast(&mut self, from: usize, payload: &Bytes, frames: &mut VecDeque<(usize, Bytes)>) {
        let sender = self.nodes[from].machine.id();
        for to in 0..self.nodes.len() {
            if to == from || !self.nodes[to].alive {
                continue;
            }
            let receiver = self.nodes[to].machine.id();
            if let Some(filter) = self.filter.as_mut() {
                if !filter(sender, receiver) {
                    continue;
                }
            }
            let actions = self.nodes[to].machine.handle(Event::Frame(payload.as_ref()));
            self.absorb(to, actions, frames);
        }
    }
}
