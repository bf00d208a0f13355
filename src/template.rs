//! Compiled, runtime-facing template data: per-track segment lists, the
//! child templates they reference, and the generation ledger that keeps
//! track identifiers stable across recompilation.

use indexmap::IndexMap;

use crate::{
    binding::BindingRegistry,
    curve::Curve,
    field::{EvaluationField, EvaluationKey},
    hierarchy::{SequenceHierarchy, SequenceInstanceId},
    model::{BindingId, CompletionMode, SignatureId},
    player::{EvaluationContext, ObjectHandle, Operand, PlaybackClient},
    preanim::{AnimTypeId, CaptureScope, PreAnimatedToken},
    segment::Segment,
    tokens::{ExecutionScope, ExecutionToken, ExecutionTokens, TokenScope},
};

/// Stable integer identity of one compiled track within a template.
/// Survives recompilation as long as the originating track's content
/// signature is unchanged.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct TrackIdentifier(pub u32);

/// The compiled evaluator for one section.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ChildTemplate {
    Property { property: String, value: Curve },
    Spawn,
    Fade { opacity: Curve },
    /// Authored data this runtime cannot execute directly; evaluation skips
    /// it and surfaces the need for a legacy adapter at compile time.
    Legacy,
}

impl ChildTemplate {
    pub fn requires_initialization(&self) -> bool {
        matches!(self, Self::Spawn)
    }
}

/// The compiled form of one authored track.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EvaluationTrack {
    pub source_signature: SignatureId,
    /// Owning object binding; `None` for master tracks.
    pub binding: Option<BindingId>,
    pub eval_priority: i32,
    pub eval_group: String,
    pub completion: CompletionMode,
    pub evaluate_nearest: bool,
    pub needs_legacy_adapter: bool,
    /// Sorted, non-overlapping; entries index into `children`.
    pub segments: Vec<Segment>,
    pub children: Vec<ChildTemplate>,
}

impl EvaluationTrack {
    pub fn requires_initialization(&self) -> bool {
        self.children
            .iter()
            .any(ChildTemplate::requires_initialization)
    }

    fn scope_for(
        &self,
        instance: SequenceInstanceId,
        track: TrackIdentifier,
        child: usize,
        context: EvaluationContext,
    ) -> TokenScope {
        TokenScope {
            operand: self.binding.map(|binding| Operand {
                sequence: instance,
                binding,
            }),
            key: EvaluationKey::for_section(instance, track, child as u32),
            completion: self.completion,
            context,
        }
    }

    /// One-time setup for sections that just entered evaluation (`begun`
    /// is this frame's set of newly-active entities). Only children that
    /// require initialization produce work here.
    pub fn initialize(
        &self,
        segment: u32,
        instance: SequenceInstanceId,
        track: TrackIdentifier,
        context: EvaluationContext,
        begun: &std::collections::HashSet<EvaluationKey>,
        tokens: &mut ExecutionTokens,
    ) {
        let Some(segment) = self.segments.get(segment as usize) else {
            return;
        };
        for entry in &segment.entries {
            let key = EvaluationKey::for_section(instance, track, entry.source as u32);
            if !begun.contains(&key) {
                continue;
            }
            let Some(child) = self.children.get(entry.source) else {
                continue;
            };
            if let ChildTemplate::Spawn = child {
                let ctx = EvaluationContext {
                    root_time: context.root_time,
                    time: entry.forced_time.unwrap_or(context.time),
                };
                tokens.set_scope(self.scope_for(instance, track, entry.source, ctx));
                tokens.add(Box::new(SpawnToken));
            }
        }
        tokens.clear_scope();
    }

    /// Per-frame evaluation: sample each active child and append execution
    /// tokens. Never mutates bound state directly.
    pub fn evaluate(
        &self,
        segment: u32,
        instance: SequenceInstanceId,
        track: TrackIdentifier,
        context: EvaluationContext,
        tokens: &mut ExecutionTokens,
    ) {
        let Some(segment) = self.segments.get(segment as usize) else {
            tracing::warn!(track = track.0, segment, "segment index out of range; skipped");
            return;
        };

        for entry in &segment.entries {
            let Some(child) = self.children.get(entry.source) else {
                tracing::warn!(track = track.0, child = entry.source, "missing child template");
                continue;
            };
            let ctx = EvaluationContext {
                root_time: context.root_time,
                time: entry.forced_time.unwrap_or(context.time),
            };
            tokens.set_scope(self.scope_for(instance, track, entry.source, ctx));

            match child {
                ChildTemplate::Property { property, value } => match value.sample(ctx.time) {
                    Ok(sampled) => tokens.add(Box::new(PropertyToken {
                        property: property.clone(),
                        value: sampled,
                    })),
                    Err(err) => {
                        tracing::warn!(track = track.0, %err, "property sample failed; skipped")
                    }
                },
                ChildTemplate::Fade { opacity } => match opacity.sample(ctx.time) {
                    Ok(alpha) => tokens.add(Box::new(FadeToken { alpha })),
                    Err(err) => {
                        tracing::warn!(track = track.0, %err, "fade sample failed; skipped")
                    }
                },
                // Spawning happens in initialize; nothing to do per frame.
                ChildTemplate::Spawn => {}
                ChildTemplate::Legacy => {
                    tracing::debug!(track = track.0, "legacy child needs adapter; skipped");
                }
            }
        }
        tokens.clear_scope();
    }

    /// The entity for this track stopped evaluating.
    pub fn on_end_evaluation(
        &self,
        instance: SequenceInstanceId,
        player: &mut dyn PlaybackClient,
        bindings: &mut BindingRegistry,
    ) {
        if let Some(binding) = self.binding
            && self.children.iter().any(|c| matches!(c, ChildTemplate::Spawn))
        {
            player.destroy_spawned_object(instance, binding);
            bindings.invalidate(instance, binding);
        }
    }
}

/// Writes one property value to every object bound to the operand,
/// capturing pre-animated state on first touch.
struct PropertyToken {
    property: String,
    value: f64,
}

impl ExecutionToken for PropertyToken {
    fn execute(&self, scope: &TokenScope, exec: &mut ExecutionScope<'_>) {
        let Some(operand) = scope.operand else {
            tracing::warn!(property = %self.property, "property token without an operand");
            return;
        };

        let objects = exec
            .bindings
            .find_bound_objects(operand.sequence, operand.binding, &*exec.player);
        let capture = match scope.completion {
            CompletionMode::RestoreState => CaptureScope::Entity(scope.key),
            CompletionMode::KeepState => CaptureScope::Global,
        };

        for object in objects {
            let type_id = AnimTypeId::of(&self.property);
            let property = self.property.clone();
            exec.preanim
                .save_state(Some(object), type_id, capture, &*exec.player, |player| {
                    Box::new(RestoreProperty {
                        object,
                        property,
                        value: player.property(object, &self.property),
                    })
                });
            exec.player.set_property(object, &self.property, self.value);
        }
    }
}

struct RestoreProperty {
    object: ObjectHandle,
    property: String,
    value: Option<f64>,
}

impl PreAnimatedToken for RestoreProperty {
    fn restore(&self, player: &mut dyn PlaybackClient) {
        if let Some(value) = self.value {
            player.set_property(self.object, &self.property, value);
        }
    }
}

/// Ensures the operand's spawnable exists. Runs inside an immediate-flush
/// group so later groups observe the spawned object when resolving
/// bindings.
struct SpawnToken;

impl ExecutionToken for SpawnToken {
    fn execute(&self, scope: &TokenScope, exec: &mut ExecutionScope<'_>) {
        let Some(operand) = scope.operand else {
            tracing::warn!("spawn token without an operand");
            return;
        };
        if exec
            .player
            .spawned_object(operand.sequence, operand.binding)
            .is_none()
        {
            if exec
                .player
                .spawn_object(operand.sequence, operand.binding)
                .is_none()
            {
                tracing::warn!(instance = operand.sequence.0, "player refused to spawn");
            }
            exec.bindings.invalidate(operand.sequence, operand.binding);
        }
    }
}

/// Master screen fade. Captured against no object (a master slot).
struct FadeToken {
    alpha: f64,
}

impl ExecutionToken for FadeToken {
    fn execute(&self, scope: &TokenScope, exec: &mut ExecutionScope<'_>) {
        let capture = match scope.completion {
            CompletionMode::RestoreState => CaptureScope::Entity(scope.key),
            CompletionMode::KeepState => CaptureScope::Global,
        };
        exec.preanim
            .save_state(None, AnimTypeId::of("fade"), capture, &*exec.player, |player| {
                Box::new(RestoreFade {
                    alpha: player.fade(),
                })
            });
        exec.player.set_fade(self.alpha);
    }
}

struct RestoreFade {
    alpha: f64,
}

impl PreAnimatedToken for RestoreFade {
    fn restore(&self, player: &mut dyn PlaybackClient) {
        player.set_fade(self.alpha);
    }
}

/// Signature bookkeeping for incremental template generation.
///
/// Track identifiers are handed out once per content signature and
/// reference-counted; shared tracks alias several signatures to one
/// identifier. Identifiers of unreferenced signatures are reclaimed, never
/// reused for different content within a template's lifetime.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GenerationLedger {
    track_ids: IndexMap<SignatureId, TrackIdentifier>,
    shared_ids: IndexMap<String, TrackIdentifier>,
    references: IndexMap<TrackIdentifier, u32>,
    next_identifier: u32,
}

impl GenerationLedger {
    pub fn find(&self, signature: SignatureId) -> Option<TrackIdentifier> {
        self.track_ids.get(&signature).copied()
    }

    pub fn find_shared(&self, shared_key: &str) -> Option<TrackIdentifier> {
        self.shared_ids.get(shared_key).copied()
    }

    /// Allocate a fresh identifier for `signature`.
    pub fn allocate(&mut self, signature: SignatureId) -> TrackIdentifier {
        let id = TrackIdentifier(self.next_identifier);
        self.next_identifier += 1;
        self.track_ids.insert(signature, id);
        self.references.insert(id, 1);
        id
    }

    /// Alias an additional signature onto an existing identifier (shared
    /// tracks).
    pub fn alias(&mut self, signature: SignatureId, id: TrackIdentifier) {
        self.track_ids.insert(signature, id);
        *self.references.entry(id).or_insert(0) += 1;
    }

    pub fn register_shared(&mut self, shared_key: &str, id: TrackIdentifier) {
        self.shared_ids.insert(shared_key.to_string(), id);
    }

    /// Drop one signature's reference. Returns the identifier if it just
    /// became unreferenced and its compiled track should be removed.
    pub fn release(&mut self, signature: SignatureId) -> Option<TrackIdentifier> {
        let id = self.track_ids.shift_remove(&signature)?;
        let refs = self.references.get_mut(&id)?;
        *refs = refs.saturating_sub(1);
        if *refs > 0 {
            return None;
        }
        self.references.shift_remove(&id);
        self.shared_ids.retain(|_, shared| *shared != id);
        Some(id)
    }

    pub fn signatures(&self) -> impl Iterator<Item = SignatureId> + '_ {
        self.track_ids.keys().copied()
    }
}

/// Per-sequence compiled state: the track map, its ledger, the flattened
/// sub-sequence hierarchy, and the cross-track evaluation field.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EvaluationTemplate {
    pub sequence_signature: Option<SignatureId>,
    pub tracks: IndexMap<TrackIdentifier, EvaluationTrack>,
    pub ledger: GenerationLedger,
    pub hierarchy: SequenceHierarchy,
    pub field: EvaluationField,
}

impl EvaluationTemplate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find_track(&self, id: TrackIdentifier) -> Option<&EvaluationTrack> {
        self.tracks.get(&id)
    }

    /// Tracks compiled from data this runtime cannot execute directly.
    pub fn legacy_tracks(&self) -> impl Iterator<Item = TrackIdentifier> + '_ {
        self.tracks
            .iter()
            .filter(|(_, t)| t.needs_legacy_adapter)
            .map(|(id, _)| *id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_keeps_ids_stable_per_signature() {
        let mut ledger = GenerationLedger::default();
        let sig = SignatureId::generate();
        let id = ledger.allocate(sig);
        assert_eq!(ledger.find(sig), Some(id));

        let other = ledger.allocate(SignatureId::generate());
        assert_ne!(id, other);
    }

    #[test]
    fn release_removes_only_when_unreferenced() {
        let mut ledger = GenerationLedger::default();
        let sig_a = SignatureId::generate();
        let sig_b = SignatureId::generate();
        let id = ledger.allocate(sig_a);
        ledger.alias(sig_b, id);
        ledger.register_shared("fade", id);

        assert_eq!(ledger.release(sig_a), None);
        assert_eq!(ledger.find_shared("fade"), Some(id));
        assert_eq!(ledger.release(sig_b), Some(id));
        assert_eq!(ledger.find_shared("fade"), None);
    }

    #[test]
    fn released_signature_is_forgotten() {
        let mut ledger = GenerationLedger::default();
        let sig = SignatureId::generate();
        ledger.allocate(sig);
        ledger.release(sig);
        assert_eq!(ledger.find(sig), None);
        assert!(ledger.release(sig).is_none());
    }
}
