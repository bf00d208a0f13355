//! The flattened, time-indexed lookup structure evaluated at runtime.
//!
//! The field is three parallel arrays: for each distinct time sub-range in
//! the whole hierarchy, the group of segment pointers to walk, and the
//! metadata (ordered entity list, active sub-sequences) used to diff frames
//! for begin/end lifecycle events.

use crate::{
    core::{FrameNumber, TimeRange},
    hierarchy::SequenceInstanceId,
    template::TrackIdentifier,
};

/// Points at one compiled segment of one track in one sequence instance.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct SegmentPointer {
    pub sequence: SequenceInstanceId,
    pub track: TrackIdentifier,
    pub segment: u32,
}

/// Identifies one track, or one section within a track, scoped by sequence
/// instance. Used both for the currently-evaluating entity sets and as the
/// ownership key for pre-animated state.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct EvaluationKey {
    pub sequence: SequenceInstanceId,
    pub track: TrackIdentifier,
    /// `None` for the track entity itself, `Some(child)` for a section.
    pub section: Option<u32>,
}

impl EvaluationKey {
    pub fn for_track(sequence: SequenceInstanceId, track: TrackIdentifier) -> Self {
        Self {
            sequence,
            track,
            section: None,
        }
    }

    pub fn for_section(sequence: SequenceInstanceId, track: TrackIdentifier, section: u32) -> Self {
        Self {
            sequence,
            track,
            section: Some(section),
        }
    }
}

/// A run of pointers sharing one evaluation-group name.
///
/// `immediate_flush` groups apply the accumulated token stack synchronously
/// when the run completes, instead of batching to the end of the frame.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FlushGroup {
    pub immediate_flush: bool,
    /// Pointers whose tracks need a one-time initialize call when their
    /// entity enters evaluation.
    pub init: Vec<SegmentPointer>,
    /// Pointers evaluated every frame the segment is active.
    pub eval: Vec<SegmentPointer>,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EvaluationGroup {
    pub flush_groups: Vec<FlushGroup>,
}

impl EvaluationGroup {
    pub fn pointers(&self) -> impl Iterator<Item = &SegmentPointer> {
        self.flush_groups
            .iter()
            .flat_map(|g| g.init.iter().chain(g.eval.iter()))
    }
}

/// Per-range bookkeeping: which entities are active (tracks strictly before
/// their own sections, in evaluation order) and which sequence instances
/// contribute. Frame-over-frame diffs of these lists drive the begin/end
/// lifecycle and sub-sequence expiry.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EvaluationMetaData {
    pub active_entities: Vec<EvaluationKey>,
    pub active_sequences: Vec<SequenceInstanceId>,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EvaluationField {
    ranges: Vec<TimeRange>,
    groups: Vec<EvaluationGroup>,
    metadata: Vec<EvaluationMetaData>,
}

impl EvaluationField {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Append one compiled entry. Entries must arrive sorted and
    /// non-overlapping; the generator guarantees this by construction.
    pub fn add(&mut self, range: TimeRange, group: EvaluationGroup, metadata: EvaluationMetaData) {
        debug_assert!(
            self.ranges
                .last()
                .is_none_or(|last| last.upper_coord() <= range.lower_coord()),
            "evaluation field ranges must be appended in order"
        );
        self.ranges.push(range);
        self.groups.push(group);
        self.metadata.push(metadata);
    }

    /// Find the entry covering `time`, if any.
    pub fn segment_index_for(&self, time: FrameNumber) -> Option<usize> {
        let coord = (time.0 as i128) * 2;
        let idx = self.ranges.partition_point(|r| r.upper_coord() <= coord);
        (idx < self.ranges.len() && self.ranges[idx].contains(time)).then_some(idx)
    }

    pub fn range(&self, index: usize) -> TimeRange {
        self.ranges[index]
    }

    pub fn group(&self, index: usize) -> &EvaluationGroup {
        &self.groups[index]
    }

    pub fn metadata(&self, index: usize) -> &EvaluationMetaData {
        &self.metadata[index]
    }

    pub fn ranges(&self) -> &[TimeRange] {
        &self.ranges
    }
}
