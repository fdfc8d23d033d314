//! Fixed-layout record codecs for the three protocols.
//!
//! Every frame is a little-endian record of integral fields, one record per
//! datagram — the transport's datagram boundary is the only framing. The
//! decoders validate length, type byte and id fields and hand back tagged
//! variants; anything else is a [`WireError`] for the caller to log and
//! drop.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::NodeId;

/// Size of an encoded bully record.
pub const BULLY_FRAME_LEN: usize = 7;
/// Size of an encoded ring record.
pub const RING_FRAME_LEN: usize = 9;
/// Size of an encoded round-gossip record.
pub const PRASLE_FRAME_LEN: usize = 6;

const BULLY_ELECTION: u8 = 1;
const BULLY_ANSWER: u8 = 2;
const BULLY_COORDINATOR: u8 = 3;
const BULLY_ALIVE: u8 = 4;

const RING_ELECTION: u8 = 1;
const RING_COORDINATOR: u8 = 2;
const RING_ALIVE: u8 = 3;

/// Decode failure for a received frame.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WireError {
    /// The datagram length does not match the record layout.
    #[error("frame is {got} bytes, expected {want}")]
    Length {
        /// Received length.
        got: usize,
        /// Length of the fixed record.
        want: usize,
    },
    /// The type byte names no known message kind.
    #[error("unknown message type {0}")]
    UnknownType(u8),
    /// A field that must name a node carried the reserved id `0`.
    #[error("reserved node id 0 in {0} field")]
    ZeroId(&'static str),
}

fn check_len(frame: &[u8], want: usize) -> Result<(), WireError> {
    if frame.len() != want {
        return Err(WireError::Length {
            got: frame.len(),
            want,
        });
    }
    Ok(())
}

fn get_id(buf: &mut &[u8], field: &'static str) -> Result<NodeId, WireError> {
    NodeId::new(buf.get_u16_le()).ok_or(WireError::ZeroId(field))
}

/// A bully protocol record: `{type, node_id, target_id, sequence}`.
///
/// `target_id = 0` on the wire denotes broadcast and decodes to `None`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BullyMessage {
    /// "I am starting an election; answer if you outrank me."
    Election {
        /// Initiating node.
        sender: NodeId,
        /// `None` for broadcast, `Some` for a directed probe.
        target: Option<NodeId>,
        /// The initiator's election round.
        sequence: u16,
    },
    /// "I outrank you; back down." Directed at the election initiator,
    /// though carried over broadcast like everything else.
    Answer {
        /// Responding (higher-priority) node.
        sender: NodeId,
        /// The initiator being silenced.
        target: Option<NodeId>,
        /// Echo of the election round being answered.
        sequence: u16,
    },
    /// "I am the coordinator now."
    Coordinator {
        /// The self-declared coordinator.
        sender: NodeId,
        /// The election round that produced this coordinator.
        sequence: u16,
    },
    /// Periodic heartbeat proving the coordinator is alive.
    Alive {
        /// The coordinator.
        sender: NodeId,
        /// The coordinator's current election round.
        sequence: u16,
    },
}

impl BullyMessage {
    /// The node this record came from.
    pub fn sender(&self) -> NodeId {
        match *self {
            BullyMessage::Election { sender, .. }
            | BullyMessage::Answer { sender, .. }
            | BullyMessage::Coordinator { sender, .. }
            | BullyMessage::Alive { sender, .. } => sender,
        }
    }

    /// Encodes the record into its fixed 7-byte layout.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(BULLY_FRAME_LEN);
        let (kind, sender, target, sequence) = match *self {
            BullyMessage::Election {
                sender,
                target,
                sequence,
            } => (BULLY_ELECTION, sender, target, sequence),
            BullyMessage::Answer {
                sender,
                target,
                sequence,
            } => (BULLY_ANSWER, sender, target, sequence),
            BullyMessage::Coordinator { sender, sequence } => {
                (BULLY_COORDINATOR, sender, None, sequence)
            }
            BullyMessage::Alive { sender, sequence } => (BULLY_ALIVE, sender, None, sequence),
        };
        buf.put_u8(kind);
        buf.put_u16_le(sender.get());
        buf.put_u16_le(NodeId::wire_value(target));
        buf.put_u16_le(sequence);
        buf.freeze()
    }

    /// Decodes a 7-byte bully record.
    pub fn decode(frame: &[u8]) -> Result<Self, WireError> {
        check_len(frame, BULLY_FRAME_LEN)?;
        let mut buf = frame;
        let kind = buf.get_u8();
        let sender = NodeId::new(buf.get_u16_le()).ok_or(WireError::ZeroId("node_id"))?;
        let target = NodeId::new(buf.get_u16_le());
        let sequence = buf.get_u16_le();
        match kind {
            BULLY_ELECTION => Ok(BullyMessage::Election {
                sender,
                target,
                sequence,
            }),
            BULLY_ANSWER => Ok(BullyMessage::Answer {
                sender,
                target,
                sequence,
            }),
            BULLY_COORDINATOR => Ok(BullyMessage::Coordinator { sender, sequence }),
            BULLY_ALIVE => Ok(BullyMessage::Alive { sender, sequence }),
            other => Err(WireError::UnknownType(other)),
        }
    }
}

/// A ring protocol record: `{type, initiator_id, candidate_id, sequence,
/// target_node_id}`.
///
/// `target` names exactly one successor; every other node ignores the frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RingMessage {
    /// The circulating election token, accumulating the highest id seen.
    Election {
        /// Node that started this circulation.
        initiator: NodeId,
        /// Highest id collected so far.
        candidate: NodeId,
        /// The initiator's election round.
        sequence: u16,
        /// The one node that should process this frame.
        target: NodeId,
    },
    /// The leadership announcement circulating once around the ring.
    Coordinator {
        /// Node that started this circulation.
        initiator: NodeId,
        /// The elected leader.
        candidate: NodeId,
        /// Election round being announced.
        sequence: u16,
        /// The one node that should process this frame.
        target: NodeId,
    },
    /// The leader's heartbeat token.
    Alive {
        /// The leader.
        initiator: NodeId,
        /// Mirrors the leader id; kept so all records share one layout.
        candidate: NodeId,
        /// The leader's current election round.
        sequence: u16,
        /// The one node that should process this frame.
        target: NodeId,
    },
}

impl RingMessage {
    /// The node that started this token's circulation.
    pub fn initiator(&self) -> NodeId {
        match *self {
            RingMessage::Election { initiator, .. }
            | RingMessage::Coordinator { initiator, .. }
            | RingMessage::Alive { initiator, .. } => initiator,
        }
    }

    /// The successor this frame is addressed to.
    pub fn target(&self) -> NodeId {
        match *self {
            RingMessage::Election { target, .. }
            | RingMessage::Coordinator { target, .. }
            | RingMessage::Alive { target, .. } => target,
        }
    }

    /// Encodes the record into its fixed 9-byte layout.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(RING_FRAME_LEN);
        let (kind, initiator, candidate, sequence, target) = match *self {
            RingMessage::Election {
                initiator,
                candidate,
                sequence,
                target,
            } => (RING_ELECTION, initiator, candidate, sequence, target),
            RingMessage::Coordinator {
                initiator,
                candidate,
                sequence,
                target,
            } => (RING_COORDINATOR, initiator, candidate, sequence, target),
            RingMessage::Alive {
                initiator,
                candidate,
                sequence,
                target,
            } => (RING_ALIVE, initiator, candidate, sequence, target),
        };
        buf.put_u8(kind);
        buf.put_u16_le(initiator.get());
        buf.put_u16_le(candidate.get());
        buf.put_u16_le(sequence);
        buf.put_u16_le(target.get());
        buf.freeze()
    }

    /// Decodes a 9-byte ring record.
    pub fn decode(frame: &[u8]) -> Result<Self, WireError> {
        check_len(frame, RING_FRAME_LEN)?;
        let mut buf = frame;
        let kind = buf.get_u8();
        let initiator = get_id(&mut buf, "initiator_id")?;
        let candidate = get_id(&mut buf, "candidate_id")?;
        let sequence = buf.get_u16_le();
        let target = get_id(&mut buf, "target_node_id")?;
        match kind {
            RING_ELECTION => Ok(RingMessage::Election {
                initiator,
                candidate,
                sequence,
                target,
            }),
            RING_COORDINATOR => Ok(RingMessage::Coordinator {
                initiator,
                candidate,
                sequence,
                target,
            }),
            RING_ALIVE => Ok(RingMessage::Alive {
                initiator,
                candidate,
                sequence,
                target,
            }),
            other => Err(WireError::UnknownType(other)),
        }
    }
}

/// The round protocol's single gossip shape: `{min_value, leader_id,
/// sender_id}`.
///
/// There is no type byte; every frame is a `(min, leader)` opinion. The
/// `leader_id` field may carry the out-of-range sentinel, so it stays a raw
/// `u16`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PrasleMessage {
    /// The sender's current minimum ranking value.
    pub min_value: u16,
    /// The node the sender believes owns that minimum.
    pub leader_id: u16,
    /// The gossiping node.
    pub sender: NodeId,
}

impl PrasleMessage {
    /// Encodes the record into its fixed 6-byte layout.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(PRASLE_FRAME_LEN);
        buf.put_u16_le(self.min_value);
        buf.put_u16_le(self.leader_id);
        buf.put_u16_le(self.sender.get());
        buf.freeze()
    }

    /// Decodes a 6-byte gossip record.
    pub fn decode(frame: &[u8]) -> Result<Self, WireError> {
        check_len(frame, PRASLE_FRAME_LEN)?;
        let mut buf = frame;
        let min_value = buf.get_u16_le();
        let leader_id = buf.get_u16_le();
        let sender = NodeId::new(buf.get_u16_le()).ok_or(WireError::ZeroId("sender_id"))?;
        Ok(PrasleMessage {
            min_value,
            leader_id,
            sender,
        })
    }
}
