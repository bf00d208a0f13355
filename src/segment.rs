//! The segment compiler: turns an unordered set of prioritized time
//! intervals into a minimal, sorted, non-overlapping list of segments, each
//! listing exactly the sources active over its sub-range.
//!
//! The sweep works on the doubled-coordinate line defined by
//! [`TimeRange`](crate::core::TimeRange), so inclusive/exclusive/open bounds
//! and degenerate single-frame intervals all follow the same code path.

use crate::core::{COORD_MAX, COORD_MIN, FrameNumber, TimeRange};

/// One active payload reference inside a segment, with an optional forced
/// evaluation time (set when a gap rule holds a neighboring segment).
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct SegmentEntry {
    pub source: usize,
    pub forced_time: Option<FrameNumber>,
}

impl SegmentEntry {
    pub fn new(source: usize) -> Self {
        Self {
            source,
            forced_time: None,
        }
    }
}

/// One input interval to the compiler.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CompileSource {
    pub range: TimeRange,
    pub entry: SegmentEntry,
    pub priority: i32,
}

impl CompileSource {
    pub fn new(range: TimeRange, source: usize, priority: i32) -> Self {
        Self {
            range,
            entry: SegmentEntry::new(source),
            priority,
        }
    }
}

/// A maximal sub-range over which the active-entry set is constant.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Segment {
    pub range: TimeRange,
    pub entries: Vec<SegmentEntry>,
}

/// Compiler rules: may rewrite each raw segment's active list, and may fill
/// the empty space before/after/between segments.
pub trait SegmentBlender {
    /// Filter or reorder a segment's active entries. Called once per raw
    /// segment; emptied segments are dropped.
    fn blend(&self, _segment: &mut Segment, _sources: &[CompileSource]) {}

    /// Offer content for a gap. `previous`/`next` are the immediately
    /// neighboring compiled segments (either may be absent at the ends of
    /// the field). Returned ranges are clamped to the gap defensively.
    fn insert_empty_space(
        &self,
        _gap: TimeRange,
        _previous: Option<&Segment>,
        _next: Option<&Segment>,
    ) -> Option<Segment> {
        None
    }
}

/// Keeps every active source; overlaps evaluate together.
pub struct UnionBlender;

impl SegmentBlender for UnionBlender {}

/// Within an overlap, keeps only the highest-priority sources.
///
/// Sources tied at the winning priority are all preserved, in ascending
/// source order. The tie behavior is a deliberate choice: authored data does
/// not define a further tie-break, and inventing one (e.g. authoring order
/// wins) would silently change which section animates.
pub struct HighPassBlender;

impl SegmentBlender for HighPassBlender {
    fn blend(&self, segment: &mut Segment, sources: &[CompileSource]) {
        let priority_of = |payload: usize| {
            sources
                .iter()
                .filter(|s| s.entry.source == payload)
                .map(|s| s.priority)
                .max()
                .unwrap_or(i32::MIN)
        };

        let Some(winning) = segment
            .entries
            .iter()
            .map(|e| priority_of(e.source))
            .max()
        else {
            return;
        };
        segment.entries.retain(|e| priority_of(e.source) == winning);
    }
}

/// Fills gaps by holding a neighboring segment's content at a forced
/// evaluation time, so the field evaluates *something* at any query time.
///
/// Edge behavior: a leading gap holds the next segment (forced to the gap's
/// end), every other gap holds the previous segment (forced to the gap's
/// start). A field with no segments at all gets nothing inserted.
pub struct NearestHoldBlender;

impl SegmentBlender for NearestHoldBlender {
    fn insert_empty_space(
        &self,
        gap: TimeRange,
        previous: Option<&Segment>,
        next: Option<&Segment>,
    ) -> Option<Segment> {
        let (neighbor, forced) = match (previous, next) {
            (Some(prev), _) => (prev, gap.lower.value()?),
            (None, Some(next)) => (next, gap.upper.value()?),
            (None, None) => return None,
        };

        let entries = neighbor
            .entries
            .iter()
            .map(|e| SegmentEntry {
                source: e.source,
                forced_time: e.forced_time.or(Some(forced)),
            })
            .collect();
        Some(Segment {
            range: gap,
            entries,
        })
    }
}

/// Compile `sources` into the minimal ordered segment list, applying
/// `blender`'s overlap and gap rules.
pub fn compile_segments(sources: &[CompileSource], blender: &dyn SegmentBlender) -> Vec<Segment> {
    // One open and one close event per non-empty input, on the doubled line.
    let mut events: Vec<(i128, bool, usize)> = Vec::with_capacity(sources.len() * 2);
    for (idx, src) in sources.iter().enumerate() {
        if src.range.is_empty() {
            continue;
        }
        events.push((src.range.lower_coord(), true, idx));
        events.push((src.range.upper_coord(), false, idx));
    }
    if events.is_empty() {
        return Vec::new();
    }
    events.sort_unstable_by_key(|&(coord, open, idx)| (coord, !open, idx));

    let mut active: Vec<bool> = vec![false; sources.len()];
    let mut active_count = 0usize;
    let mut segments = Vec::new();
    let mut prev_coord: Option<i128> = None;

    let mut i = 0;
    while i < events.len() {
        let coord = events[i].0;

        if let Some(pc) = prev_coord
            && active_count > 0
            && pc < coord
        {
            segments.push(Segment {
                range: TimeRange::from_coords(pc, coord),
                entries: active_entries(&active, sources),
            });
        }

        while i < events.len() && events[i].0 == coord {
            let (_, open, idx) = events[i];
            if open {
                debug_assert!(!active[idx]);
                active[idx] = true;
                active_count += 1;
            } else {
                debug_assert!(active[idx]);
                active[idx] = false;
                active_count -= 1;
            }
            i += 1;
        }
        prev_coord = Some(coord);
    }

    for segment in &mut segments {
        blender.blend(segment, sources);
    }
    segments.retain(|s| !s.entries.is_empty());
    merge_adjoining_identical(&mut segments);

    fill_gaps(&mut segments, blender);
    segments
}

/// Collapse immediately-adjoining segments with identical active lists.
pub(crate) fn merge_adjoining_identical(segments: &mut Vec<Segment>) {
    let mut merged: Vec<Segment> = Vec::with_capacity(segments.len());
    for segment in segments.drain(..) {
        if let Some(last) = merged.last_mut()
            && last.range.adjoins(segment.range)
            && last.entries == segment.entries
        {
            last.range = last.range.hull(segment.range);
        } else {
            merged.push(segment);
        }
    }
    *segments = merged;
}

fn fill_gaps(segments: &mut Vec<Segment>, blender: &dyn SegmentBlender) {
    if segments.is_empty() {
        return;
    }

    let mut out: Vec<Segment> = Vec::with_capacity(segments.len());
    let first_lower = segments[0].range.lower_coord();
    if first_lower > COORD_MIN {
        let gap = TimeRange::from_coords(COORD_MIN, first_lower);
        push_gap(&mut out, blender.insert_empty_space(gap, None, segments.first()), gap);
    }

    for i in 0..segments.len() {
        out.push(segments[i].clone());
        let upper = segments[i].range.upper_coord();
        let next_lower = match segments.get(i + 1) {
            Some(next) => next.range.lower_coord(),
            None => COORD_MAX,
        };
        if upper < next_lower {
            let gap = TimeRange::from_coords(upper, next_lower);
            push_gap(
                &mut out,
                blender.insert_empty_space(gap, Some(&segments[i]), segments.get(i + 1)),
                gap,
            );
        }
    }

    *segments = out;
}

fn push_gap(out: &mut Vec<Segment>, inserted: Option<Segment>, gap: TimeRange) {
    let Some(mut segment) = inserted else {
        return;
    };
    // Rules must never escape the space they were asked to fill.
    segment.range = segment.range.intersect(gap);
    if segment.range.is_empty() || segment.entries.is_empty() {
        return;
    }
    out.push(segment);
}

fn active_entries(active: &[bool], sources: &[CompileSource]) -> Vec<SegmentEntry> {
    let mut entries: Vec<SegmentEntry> = Vec::new();
    for (idx, on) in active.iter().enumerate() {
        if *on {
            let entry = sources[idx].entry;
            // Duplicate references to one source collapse to a single entry.
            if !entries.contains(&entry) {
                entries.push(entry);
            }
        }
    }
    entries.sort_unstable();
    entries
}
