//! The track compiler: rows first, then the whole track.
//!
//! Sections are grouped into rows and each row is segment-compiled with the
//! high-pass rule (highest priority wins an overlap). The per-row results
//! are then fed through the segment compiler a second time as synthetic
//! intervals, so row overlaps blend under the track-level rules, and the
//! final segments are expanded back to absolute section indices.

use std::collections::BTreeMap;

use crate::{
    model::Section,
    segment::{
        CompileSource, HighPassBlender, NearestHoldBlender, Segment, SegmentEntry, UnionBlender,
        compile_segments, merge_adjoining_identical,
    },
};

/// The compiled form of one track: ordered, non-overlapping segments whose
/// entries reference the track's section indices.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TrackEvaluationField {
    pub segments: Vec<Segment>,
}

impl TrackEvaluationField {
    pub fn segment_at(&self, time: crate::core::FrameNumber) -> Option<&Segment> {
        self.segments.iter().find(|s| s.range.contains(time))
    }
}

/// Compile all of a track's sections into a [`TrackEvaluationField`].
///
/// `evaluate_nearest` switches the track-level gap rule from "leave gaps"
/// to "hold the nearest section at a forced time" (camera-cut style).
pub fn compile_track_sections(
    sections: &[Section],
    evaluate_nearest: bool,
) -> TrackEvaluationField {
    // Row index -> absolute section indices, inactive sections dropped.
    let mut rows: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
    for (idx, section) in sections.iter().enumerate() {
        if section.active && !section.range.is_empty() {
            rows.entry(section.row).or_default().push(idx);
        }
    }

    let row_count = rows.len();
    let mut row_segments: Vec<Segment> = Vec::new();
    let mut track_sources: Vec<CompileSource> = Vec::new();

    for (row_pos, (_row, members)) in rows.into_iter().enumerate() {
        let sources: Vec<CompileSource> = members
            .iter()
            .map(|&abs| CompileSource::new(sections[abs].range, abs, sections[abs].priority))
            .collect();

        for segment in compile_segments(&sources, &HighPassBlender) {
            // Earlier rows win ties in the track-level pass.
            let priority = (row_count - row_pos) as i32;
            track_sources.push(CompileSource::new(
                segment.range,
                row_segments.len(),
                priority,
            ));
            row_segments.push(segment);
        }
    }

    let compiled = if evaluate_nearest {
        compile_segments(&track_sources, &NearestHoldBlender)
    } else {
        compile_segments(&track_sources, &UnionBlender)
    };

    // Expand row-segment references back into section-level data. A forced
    // time attached at the track level is the fallback for entries that did
    // not pick one up during row compilation.
    let mut segments: Vec<Segment> = Vec::with_capacity(compiled.len());
    for segment in compiled {
        let mut entries: Vec<SegmentEntry> = Vec::new();
        for entry in &segment.entries {
            for row_entry in &row_segments[entry.source].entries {
                entries.push(SegmentEntry {
                    source: row_entry.source,
                    forced_time: row_entry.forced_time.or(entry.forced_time),
                });
            }
        }
        entries.sort_unstable();
        segments.push(Segment {
            range: segment.range,
            entries,
        });
    }

    merge_adjoining_identical(&mut segments);
    TrackEvaluationField { segments }
}
