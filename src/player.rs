//! The boundary to the embedding application.
//!
//! The player owns the scene graph: it locates bound objects, reads and
//! writes their animatable state, and hosts the spawn register. The
//! evaluation core only ever touches objects through this trait, which is
//! what makes the deferred-token model testable against a mock stage.

use crate::{
    core::FrameNumber,
    hierarchy::SequenceInstanceId,
    model::{BindingId, SequenceKey},
};

/// Opaque handle to one application object.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct ObjectHandle(pub u64);

/// Which object(s), in which sequence scope, a token acts upon.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Operand {
    pub sequence: SequenceInstanceId,
    pub binding: BindingId,
}

/// Time context handed to track evaluation. `time` is in the evaluated
/// track's local time-space, with any forced evaluation time already
/// applied; `root_time` is the original query time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EvaluationContext {
    pub root_time: FrameNumber,
    pub time: FrameNumber,
}

pub trait PlaybackClient {
    /// Resolve a possessable binding to live objects. `parents` carries the
    /// resolved objects of the parent binding when the possessable is
    /// parented, and is empty otherwise.
    fn locate_objects(
        &self,
        sequence: SequenceKey,
        binding: BindingId,
        parents: &[ObjectHandle],
    ) -> Vec<ObjectHandle>;

    fn is_object_valid(&self, object: ObjectHandle) -> bool;

    fn property(&self, object: ObjectHandle, property: &str) -> Option<f64>;

    fn set_property(&mut self, object: ObjectHandle, property: &str, value: f64);

    /// Global screen fade, animated by master fade tracks.
    fn fade(&self) -> f64;

    fn set_fade(&mut self, alpha: f64);

    /// Spawn register: create the object for a spawnable binding. Returns
    /// `None` when the application refuses to spawn.
    fn spawn_object(
        &mut self,
        sequence: SequenceInstanceId,
        binding: BindingId,
    ) -> Option<ObjectHandle>;

    fn destroy_spawned_object(&mut self, sequence: SequenceInstanceId, binding: BindingId);

    fn spawned_object(
        &self,
        sequence: SequenceInstanceId,
        binding: BindingId,
    ) -> Option<ObjectHandle>;

    /// A previously-active sub-sequence instance stopped evaluating; its
    /// spawned objects are candidates for cleanup.
    fn on_sequence_expired(&mut self, _sequence: SequenceInstanceId) {}
}
