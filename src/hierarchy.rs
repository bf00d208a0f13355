//! Flattened sub-sequence hierarchy with deterministic instance IDs.

use indexmap::IndexMap;

use crate::{
    core::{TimeRange, TimeTransform},
    hash::{StableHasher, combine64},
    model::{SequenceKey, SignatureId},
};

/// Identifies one instance of a sequence within a hierarchy. The same child
/// asset referenced from two sub-sections yields two distinct IDs.
///
/// IDs are structural hashes, not counters, so regenerating an unchanged
/// hierarchy reproduces them exactly.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct SequenceInstanceId(pub u64);

impl SequenceInstanceId {
    pub const ROOT: Self = Self(0);

    /// Deterministic ID for the sub-sequence instance introduced by a
    /// section, scoped under `parent`.
    pub fn from_sub_section(parent: Self, section_signature: SignatureId) -> Self {
        let mut h = StableHasher::new(parent.0);
        h.write_bytes(section_signature.0.as_bytes());
        Self(h.finish())
    }

    /// Remap an ID that is local to a child template into the parent's
    /// scope, where `instance` is the child's instance ID in the parent.
    pub fn accumulated_into(self, instance: Self) -> Self {
        if self == Self::ROOT {
            instance
        } else {
            Self(combine64(self.0, instance.0))
        }
    }
}

/// One nested sub-sequence instance.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SubSequenceNode {
    pub sequence: SequenceKey,
    pub parent: SequenceInstanceId,
    /// Maps root-space time into this instance's local time-space.
    pub root_to_local: TimeTransform,
    /// The child's authored play range, kept for tooling.
    pub play_range: TimeRange,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SequenceHierarchy {
    nodes: IndexMap<SequenceInstanceId, SubSequenceNode>,
}

impl SequenceHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node under `desired`. On the (astronomically unlikely)
    /// hash collision with a *different* node, the ID is deterministically
    /// perturbed and retried rather than dropped.
    pub fn add(&mut self, desired: SequenceInstanceId, node: SubSequenceNode) -> SequenceInstanceId {
        let mut id = desired;
        if id == SequenceInstanceId::ROOT {
            id = SequenceInstanceId(combine64(0, 0x9e37_79b9_7f4a_7c15));
        }
        loop {
            match self.nodes.get(&id) {
                None => {
                    self.nodes.insert(id, node);
                    return id;
                }
                Some(existing) if *existing == node => return id,
                Some(_) => {
                    tracing::warn!(id = id.0, "sequence instance id collision; perturbing");
                    id = SequenceInstanceId(combine64(id.0, 0x9e37_79b9_7f4a_7c15));
                }
            }
        }
    }

    pub fn node(&self, id: SequenceInstanceId) -> Option<&SubSequenceNode> {
        self.nodes.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SequenceInstanceId, &SubSequenceNode)> {
        self.nodes.iter().map(|(id, node)| (*id, node))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }
}
