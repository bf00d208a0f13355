//! The evaluation-template generator: walks a sequence's track hierarchy
//! and produces per-track compiled data plus the cross-track evaluation
//! field spanning every nested sub-sequence.
//!
//! Generation is incremental: tracks whose content signature already sits
//! in the template's ledger are kept as-is, newly-signed tracks are
//! compiled, and signatures that disappeared are released (removing their
//! compiled track once unreferenced). Sub-sequences contribute their
//! already-compiled fields, remapped into the parent's time-space and
//! ID-scope, rather than being recompiled inline.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use indexmap::IndexSet;

use crate::{
    core::{TimeRange, TimeTransform},
    error::{PlayfieldError, PlayfieldResult},
    field::{
        EvaluationField, EvaluationGroup, EvaluationKey, EvaluationMetaData, FlushGroup,
        SegmentPointer,
    },
    hierarchy::{SequenceInstanceId, SubSequenceNode},
    model::{
        BindingId, Section, SectionPayload, Sequence, SequenceCatalog, SequenceKey, SignatureId,
        Track, TrackKind,
    },
    segment::{CompileSource, UnionBlender, compile_segments},
    store::TemplateStore,
    template::{ChildTemplate, EvaluationTemplate, EvaluationTrack},
    track_compile::compile_track_sections,
};

/// Shared-track key under which every fade track in a sequence collapses.
const SHARED_FADE: &str = "fade";

#[derive(Clone, Debug)]
pub struct GenerationParams {
    /// Evaluation groups whose tokens are applied synchronously at the
    /// group boundary instead of batched to the end of the frame.
    pub immediate_flush_groups: BTreeSet<String>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            immediate_flush_groups: BTreeSet::from(["spawn".to_string()]),
        }
    }
}

struct SubSectionWork {
    sequence: SequenceKey,
    section_signature: SignatureId,
    root_range: TimeRange,
    root_to_local: TimeTransform,
}

/// Generate (or incrementally regenerate) the compiled template for
/// `sequence`. Sub-sequence templates are obtained from `store`, which
/// recompiles them first if their own content is stale.
#[tracing::instrument(skip_all, fields(sequence = %sequence.name))]
pub fn generate_template(
    sequence: &Sequence,
    catalog: &SequenceCatalog,
    store: &mut dyn TemplateStore,
    params: &GenerationParams,
    previous: Option<&EvaluationTemplate>,
) -> PlayfieldResult<EvaluationTemplate> {
    sequence.validate(catalog)?;

    let mut template = previous.cloned().unwrap_or_default();
    template.sequence_signature = Some(sequence.signature);
    template.hierarchy.clear();

    // Master tracks first, then per-binding tracks, in authored order.
    let authored: Vec<(&Track, Option<BindingId>)> = sequence
        .master_tracks
        .iter()
        .map(|t| (t, None))
        .chain(
            sequence
                .bindings
                .iter()
                .flat_map(|b| b.tracks.iter().map(move |t| (t, Some(b.id)))),
        )
        .collect();

    let mut current: IndexSet<SignatureId> = IndexSet::new();
    let mut sub_work: Vec<SubSectionWork> = Vec::new();

    for &(track, binding) in &authored {
        if !track.active {
            continue;
        }
        match &track.kind {
            TrackKind::SubSequence => {
                gather_sub_sections(track, &mut sub_work);
            }
            TrackKind::Fade => {
                current.insert(track.signature);
                if template.ledger.find(track.signature).is_some() {
                    continue;
                }
                if let Some(shared) = template.ledger.find_shared(SHARED_FADE) {
                    // Another fade track already owns the compiled instance.
                    template.ledger.alias(track.signature, shared);
                } else {
                    let compiled = compile_evaluation_track(track, binding);
                    let id = template.ledger.allocate(track.signature);
                    template.ledger.register_shared(SHARED_FADE, id);
                    template.tracks.insert(id, compiled);
                }
            }
            _ => {
                current.insert(track.signature);
                if template.ledger.find(track.signature).is_none() {
                    let compiled = compile_evaluation_track(track, binding);
                    let id = template.ledger.allocate(track.signature);
                    template.tracks.insert(id, compiled);
                }
            }
        }
    }

    // Release signatures that no longer exist; drop their compiled tracks
    // once the last alias is gone.
    let stale: Vec<SignatureId> = template
        .ledger
        .signatures()
        .filter(|sig| !current.contains(sig))
        .collect();
    for sig in stale {
        if let Some(dead) = template.ledger.release(sig) {
            template.tracks.shift_remove(&dead);
        }
    }

    // Expand sub-sequences: register hierarchy nodes (this sequence's
    // direct children plus the remapped descendants already flattened into
    // each child's template) and collect their field entries as external
    // contributions in root space.
    let mut external: Vec<(TimeRange, SegmentPointer)> = Vec::new();
    let mut child_templates: HashMap<SequenceKey, Arc<EvaluationTemplate>> = HashMap::new();

    for work in &sub_work {
        if work.sequence == sequence.key {
            return Err(PlayfieldError::compilation(format!(
                "sequence '{}' references itself",
                sequence.name
            )));
        }
        let child_asset = catalog.require(work.sequence)?;
        let child = store.get_compiled_template(work.sequence, catalog)?;

        let desired =
            SequenceInstanceId::from_sub_section(SequenceInstanceId::ROOT, work.section_signature);
        let instance = template.hierarchy.add(
            desired,
            SubSequenceNode {
                sequence: work.sequence,
                parent: SequenceInstanceId::ROOT,
                root_to_local: work.root_to_local,
                play_range: child_asset.playback_range,
            },
        );

        // Child-local instance IDs -> IDs in this template's scope.
        let mut remap: HashMap<SequenceInstanceId, SequenceInstanceId> = HashMap::new();
        remap.insert(SequenceInstanceId::ROOT, instance);
        for (sub_id, sub_node) in child.hierarchy.iter() {
            let parent = remap
                .get(&sub_node.parent)
                .copied()
                .unwrap_or_else(|| sub_node.parent.accumulated_into(instance));
            let actual = template.hierarchy.add(
                sub_id.accumulated_into(instance),
                SubSequenceNode {
                    sequence: sub_node.sequence,
                    parent,
                    root_to_local: sub_node.root_to_local * work.root_to_local,
                    play_range: sub_node.play_range,
                },
            );
            remap.insert(sub_id, actual);
        }

        let local_to_root = work.root_to_local.inverse();
        for idx in 0..child.field.len() {
            let root_range = local_to_root
                .apply_range(child.field.range(idx))
                .intersect(work.root_range);
            if root_range.is_empty() {
                continue;
            }
            for ptr in child.field.group(idx).pointers() {
                let sequence_id = remap
                    .get(&ptr.sequence)
                    .copied()
                    .unwrap_or_else(|| ptr.sequence.accumulated_into(instance));
                external.push((
                    root_range,
                    SegmentPointer {
                        sequence: sequence_id,
                        track: ptr.track,
                        segment: ptr.segment,
                    },
                ));
            }
        }

        child_templates.insert(work.sequence, child);
    }

    // Any remaining hierarchy nodes (grandchildren) also need their asset
    // templates available for metadata resolution below.
    let nodes: Vec<SequenceKey> = template.hierarchy.iter().map(|(_, n)| n.sequence).collect();
    for key in nodes {
        if !child_templates.contains_key(&key) {
            child_templates.insert(key, store.get_compiled_template(key, catalog)?);
        }
    }

    template.field = build_field(&template, &child_templates, external, params);
    Ok(template)
}

fn gather_sub_sections(track: &Track, out: &mut Vec<SubSectionWork>) {
    for section in &track.sections {
        if !section.active || section.range.is_empty() {
            continue;
        }
        let SectionPayload::SubSequence(sub) = &section.payload else {
            continue;
        };
        let Some(start) = section.range.lower.value() else {
            continue;
        };
        // local = (root - start) * scale + start_offset
        let scale = sub.time_scale;
        let root_to_local = TimeTransform {
            time_scale: scale,
            offset: sub.start_offset as f64 - (start.0 as f64) * scale,
        };
        out.push(SubSectionWork {
            sequence: sub.sequence,
            section_signature: section.signature,
            root_range: section.range,
            root_to_local,
        });
    }
}

fn compile_evaluation_track(track: &Track, binding: Option<BindingId>) -> EvaluationTrack {
    let field = compile_track_sections(&track.sections, track.evaluate_nearest);
    let children = track
        .sections
        .iter()
        .map(|section| child_template_for(track, section))
        .collect();

    EvaluationTrack {
        source_signature: track.signature,
        binding,
        eval_priority: track.eval_priority,
        eval_group: track.eval_group.clone(),
        completion: track.completion,
        evaluate_nearest: track.evaluate_nearest,
        needs_legacy_adapter: matches!(track.kind, TrackKind::Legacy),
        segments: field.segments,
        children,
    }
}

fn child_template_for(track: &Track, section: &Section) -> ChildTemplate {
    match (&track.kind, &section.payload) {
        (TrackKind::Property { property }, SectionPayload::Property { value }) => {
            ChildTemplate::Property {
                property: property.clone(),
                value: value.clone(),
            }
        }
        (TrackKind::Spawn, SectionPayload::Spawn) => ChildTemplate::Spawn,
        (TrackKind::Fade, SectionPayload::Fade { opacity }) => ChildTemplate::Fade {
            opacity: opacity.clone(),
        },
        _ => ChildTemplate::Legacy,
    }
}

/// Compile the cross-track field: union every owned segment and every
/// external contribution, then order and partition each resulting group.
fn build_field(
    template: &EvaluationTemplate,
    child_templates: &HashMap<SequenceKey, Arc<EvaluationTemplate>>,
    external: Vec<(TimeRange, SegmentPointer)>,
    params: &GenerationParams,
) -> EvaluationField {
    let mut table: IndexSet<SegmentPointer> = IndexSet::new();
    let mut sources: Vec<CompileSource> = Vec::new();

    for (id, track) in &template.tracks {
        for (seg_idx, segment) in track.segments.iter().enumerate() {
            if segment.range.is_empty() {
                continue;
            }
            let ptr = SegmentPointer {
                sequence: SequenceInstanceId::ROOT,
                track: *id,
                segment: seg_idx as u32,
            };
            let (src, _) = table.insert_full(ptr);
            sources.push(CompileSource::new(segment.range, src, 0));
        }
    }
    for (range, ptr) in external {
        let (src, _) = table.insert_full(ptr);
        sources.push(CompileSource::new(range, src, 0));
    }

    let resolve_track = |ptr: &SegmentPointer| -> Option<&EvaluationTrack> {
        if ptr.sequence == SequenceInstanceId::ROOT {
            template.tracks.get(&ptr.track)
        } else {
            let node = template.hierarchy.node(ptr.sequence)?;
            child_templates.get(&node.sequence)?.tracks.get(&ptr.track)
        }
    };

    let mut field = EvaluationField::new();
    for top in compile_segments(&sources, &UnionBlender) {
        // Resolve and order this range's pointers: priority descending,
        // then group name, then stable pointer order.
        let mut ptrs: Vec<(SegmentPointer, &EvaluationTrack)> = Vec::new();
        for entry in &top.entries {
            let Some(ptr) = table.get_index(entry.source).copied() else {
                continue;
            };
            match resolve_track(&ptr) {
                Some(track) => ptrs.push((ptr, track)),
                None => {
                    tracing::warn!(
                        sequence = ptr.sequence.0,
                        track = ptr.track.0,
                        "dangling segment pointer; skipped"
                    );
                }
            }
        }
        ptrs.sort_by(|(ap, at), (bp, bt)| {
            bt.eval_priority
                .cmp(&at.eval_priority)
                .then_with(|| at.eval_group.cmp(&bt.eval_group))
                .then_with(|| ap.cmp(bp))
        });

        let mut group = EvaluationGroup::default();
        let mut metadata = EvaluationMetaData::default();
        let mut current_group_name: Option<&str> = None;
        for (ptr, track) in &ptrs {
            // Flush sub-group boundaries follow group-name changes.
            if current_group_name != Some(track.eval_group.as_str()) {
                current_group_name = Some(track.eval_group.as_str());
                group.flush_groups.push(FlushGroup {
                    immediate_flush: params.immediate_flush_groups.contains(&track.eval_group),
                    init: Vec::new(),
                    eval: Vec::new(),
                });
            }
            if let Some(flush) = group.flush_groups.last_mut() {
                if track.requires_initialization() {
                    flush.init.push(*ptr);
                } else {
                    flush.eval.push(*ptr);
                }
            }

            // Track entity strictly precedes its section entities so that
            // reverse-order teardown ends sections before their track.
            metadata
                .active_entities
                .push(EvaluationKey::for_track(ptr.sequence, ptr.track));
            if let Some(segment) = track.segments.get(ptr.segment as usize) {
                for entry in &segment.entries {
                    metadata
                        .active_entities
                        .push(EvaluationKey::for_section(
                            ptr.sequence,
                            ptr.track,
                            entry.source as u32,
                        ));
                }
            }
            if !metadata.active_sequences.contains(&ptr.sequence) {
                metadata.active_sequences.push(ptr.sequence);
            }
        }

        field.add(top.range, group, metadata);
    }
    field
}
