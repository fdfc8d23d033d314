use std::fmt;
use std::num::NonZeroU16;

/// Identifier of a participant node.
///
/// Ids are strictly positive; the wire value `0` is reserved to mean "no
/// known leader" (or "broadcast" in a target field) and maps to
/// `Option::<NodeId>::None` everywhere in the API. The id doubles as the
/// node's priority: bully and ring rank higher ids higher, the
/// self-stabilizing protocol ranks lower ids higher.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId(NonZeroU16);

impl NodeId {
    /// Creates a node id, rejecting the reserved value `0`.
    pub const fn new(id: u16) -> Option<Self> {
        match NonZeroU16::new(id) {
            Some(id) => Some(Self(id)),
            None => None,
        }
    }

    /// The raw id, as carried on the wire.
    pub const fn get(self) -> u16 {
        self.0.get()
    }

    /// Wire representation of an optional id (`None` encodes as `0`).
    pub(crate) fn wire_value(id: Option<Self>) -> u16 {
        id.map_or(0, Self::get)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
