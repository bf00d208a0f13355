//! The root evaluation instance: owns one compiled template per active
//! sequence in the hierarchy and drives per-frame evaluation against a
//! player.
//!
//! Lifecycle per `evaluate` call: locate the field entry for the query
//! time, diff its entity list against last frame's, tear down everything
//! that left (strict reverse order, restoring pre-animated state), notify
//! expired sub-sequences, set up everything that entered, then walk the
//! entry's flush groups gathering execution tokens and applying them at
//! flush boundaries. Stale templates force re-initialization before the
//! next evaluation; a dangling pointer skips with a diagnostic rather than
//! blanking the frame.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::{
    binding::BindingRegistry,
    core::FrameNumber,
    error::{PlayfieldError, PlayfieldResult},
    field::{EvaluationKey, EvaluationMetaData, SegmentPointer},
    hierarchy::SequenceInstanceId,
    model::SequenceCatalog,
    model::SequenceKey,
    player::{EvaluationContext, PlaybackClient},
    preanim::PreAnimatedState,
    store::TemplateStore,
    template::EvaluationTemplate,
    tokens::{ExecutionScope, ExecutionTokens},
};

pub struct RootInstance {
    root: SequenceKey,
    root_template: Option<Arc<EvaluationTemplate>>,
    /// One template per active sequence instance (root + every nested
    /// sub-sequence), resolved at initialize time.
    templates: HashMap<SequenceInstanceId, Arc<EvaluationTemplate>>,
    bindings: BindingRegistry,
    preanim: PreAnimatedState,
    tokens: ExecutionTokens,
    /// Entities and sequences active as of the previous evaluation.
    active: EvaluationMetaData,
    /// Entities that entered evaluation this frame.
    begun: HashSet<EvaluationKey>,
}

impl RootInstance {
    pub fn new(root: SequenceKey) -> Self {
        Self {
            root,
            root_template: None,
            templates: HashMap::new(),
            bindings: BindingRegistry::new(),
            preanim: PreAnimatedState::new(),
            tokens: ExecutionTokens::new(),
            active: EvaluationMetaData::default(),
            begun: HashSet::new(),
        }
    }

    pub fn root(&self) -> SequenceKey {
        self.root
    }

    /// Fetch compiled templates for the root and every reachable
    /// sub-sequence, and register each instance with the binding registry.
    #[tracing::instrument(skip_all)]
    pub fn initialize(
        &mut self,
        catalog: &SequenceCatalog,
        store: &mut dyn TemplateStore,
    ) -> PlayfieldResult<()> {
        let root_tpl = store.get_compiled_template(self.root, catalog)?;

        self.templates.clear();
        self.bindings.clear();

        self.templates
            .insert(SequenceInstanceId::ROOT, root_tpl.clone());
        self.bindings
            .register_instance(SequenceInstanceId::ROOT, catalog.require(self.root)?);

        for (id, node) in root_tpl.hierarchy.iter() {
            let template = store.get_compiled_template(node.sequence, catalog)?;
            self.templates.insert(id, template);
            self.bindings
                .register_instance(id, catalog.require(node.sequence)?);
        }

        self.root_template = Some(root_tpl);
        Ok(())
    }

    /// True when any contributing sequence's content changed since
    /// [`initialize`](Self::initialize), or it never ran.
    pub fn needs_initialize(&self, catalog: &SequenceCatalog) -> bool {
        let Some(root_tpl) = &self.root_template else {
            return true;
        };
        let root_fresh = catalog
            .get(self.root)
            .is_some_and(|seq| root_tpl.sequence_signature == Some(seq.signature));
        if !root_fresh {
            return true;
        }
        root_tpl.hierarchy.iter().any(|(id, node)| {
            let fresh = self.templates.get(&id).is_some_and(|tpl| {
                catalog
                    .get(node.sequence)
                    .is_some_and(|seq| tpl.sequence_signature == Some(seq.signature))
            });
            !fresh
        })
    }

    /// Evaluate the hierarchy at `time`, applying all resulting mutations
    /// to `player`.
    #[tracing::instrument(skip_all, fields(time = time.0))]
    pub fn evaluate(
        &mut self,
        time: FrameNumber,
        catalog: &SequenceCatalog,
        store: &mut dyn TemplateStore,
        player: &mut dyn PlaybackClient,
    ) -> PlayfieldResult<()> {
        if self.needs_initialize(catalog) {
            self.initialize(catalog, store)?;
        }
        let root_tpl = self
            .root_template
            .clone()
            .ok_or_else(|| PlayfieldError::evaluation("root instance is not initialized"))?;

        let field_index = root_tpl.field.segment_index_for(time);
        let current = match field_index {
            Some(index) => root_tpl.field.metadata(index).clone(),
            // Nothing to evaluate: an empty active set still tears down.
            None => EvaluationMetaData::default(),
        };
        let previous = std::mem::replace(&mut self.active, current);

        self.run_lifecycle(&previous, player);
        self.bindings.invalidate_expired_objects(player);

        if let Some(index) = field_index {
            let group = root_tpl.field.group(index);
            for flush in &group.flush_groups {
                for ptr in &flush.init {
                    self.dispatch(ptr, time, true);
                }
                for ptr in &flush.eval {
                    self.dispatch(ptr, time, false);
                }
                if flush.immediate_flush {
                    self.apply_tokens(player);
                }
            }
        }

        self.apply_tokens(player);
        Ok(())
    }

    /// Stop evaluating: tear everything down as if evaluating an empty
    /// active set. Global (keep-state) captures survive; see
    /// [`restore_pre_animated_state`](Self::restore_pre_animated_state).
    #[tracing::instrument(skip_all)]
    pub fn finish(&mut self, player: &mut dyn PlaybackClient) {
        let previous = std::mem::take(&mut self.active);
        self.run_lifecycle(&previous, player);
    }

    /// Restore every captured value, including global-scope captures.
    pub fn restore_pre_animated_state(&mut self, player: &mut dyn PlaybackClient) {
        self.preanim.restore_all(player);
    }

    /// Tear down entities absent this frame (reverse insertion order:
    /// sections before their track, latest first), notify expired
    /// sub-sequences, then record newly-begun entities.
    fn run_lifecycle(&mut self, previous: &EvaluationMetaData, player: &mut dyn PlaybackClient) {
        let current_set: HashSet<EvaluationKey> =
            self.active.active_entities.iter().copied().collect();
        let previous_set: HashSet<EvaluationKey> =
            previous.active_entities.iter().copied().collect();

        for key in previous.active_entities.iter().rev() {
            if current_set.contains(key) {
                continue;
            }
            if key.section.is_none() {
                self.end_track_entity(key, player);
            }
            self.preanim.restore_for_entity(key, player);
        }

        for id in &previous.active_sequences {
            if *id != SequenceInstanceId::ROOT && !self.active.active_sequences.contains(id) {
                player.on_sequence_expired(*id);
            }
        }

        self.begun.clear();
        for key in &self.active.active_entities {
            if !previous_set.contains(key) {
                self.begun.insert(*key);
            }
        }
    }

    fn end_track_entity(&mut self, key: &EvaluationKey, player: &mut dyn PlaybackClient) {
        let Some(template) = self.templates.get(&key.sequence).cloned() else {
            tracing::warn!(sequence = key.sequence.0, "no template for ending entity");
            return;
        };
        let Some(track) = template.find_track(key.track) else {
            tracing::warn!(track = key.track.0, "no compiled track for ending entity");
            return;
        };
        track.on_end_evaluation(key.sequence, player, &mut self.bindings);
    }

    fn dispatch(&mut self, ptr: &SegmentPointer, root_time: FrameNumber, init: bool) {
        let Some(template) = self.templates.get(&ptr.sequence).cloned() else {
            tracing::warn!(sequence = ptr.sequence.0, "no template for pointer; skipped");
            return;
        };
        let Some(track) = template.find_track(ptr.track) else {
            tracing::warn!(track = ptr.track.0, "stale track pointer; skipped");
            return;
        };

        let local_time = if ptr.sequence == SequenceInstanceId::ROOT {
            root_time
        } else {
            let node = self
                .root_template
                .as_ref()
                .and_then(|tpl| tpl.hierarchy.node(ptr.sequence));
            match node {
                Some(node) => node.root_to_local.apply(root_time),
                None => {
                    tracing::warn!(sequence = ptr.sequence.0, "missing hierarchy node; skipped");
                    return;
                }
            }
        };

        let context = EvaluationContext {
            root_time,
            time: local_time,
        };
        if init {
            track.initialize(
                ptr.segment,
                ptr.sequence,
                ptr.track,
                context,
                &self.begun,
                &mut self.tokens,
            );
        } else {
            track.evaluate(ptr.segment, ptr.sequence, ptr.track, context, &mut self.tokens);
        }
    }

    fn apply_tokens(&mut self, player: &mut dyn PlaybackClient) {
        if self.tokens.is_empty() {
            return;
        }
        let mut exec = ExecutionScope {
            player,
            preanim: &mut self.preanim,
            bindings: &mut self.bindings,
        };
        self.tokens.apply(&mut exec);
    }
}
