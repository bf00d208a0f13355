//! The template store: hands out compiled templates, deciding staleness by
//! content signature and regenerating through the generator when needed.
//!
//! Templates are shared read-mostly (`Arc`); regeneration fully replaces
//! the stored template before anything else observes it. Freshness is
//! resolved bottom-up over the sub-sequence dependency graph with an
//! explicit stack, so deep nesting cannot overflow and a sequence that
//! (indirectly) references itself is a hard, reported error.

use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    error::{PlayfieldError, PlayfieldResult},
    generate::{GenerationParams, generate_template},
    model::{SectionPayload, SequenceCatalog, SequenceKey},
    template::EvaluationTemplate,
};

pub trait TemplateStore {
    /// Return the compiled template for `key`, recompiling it (and any
    /// stale sub-sequence first) if its content signature changed.
    fn get_compiled_template(
        &mut self,
        key: SequenceKey,
        catalog: &SequenceCatalog,
    ) -> PlayfieldResult<Arc<EvaluationTemplate>>;
}

pub struct InMemoryTemplateStore {
    params: GenerationParams,
    cache: HashMap<SequenceKey, Arc<EvaluationTemplate>>,
}

impl Default for InMemoryTemplateStore {
    fn default() -> Self {
        Self::new(GenerationParams::default())
    }
}

impl InMemoryTemplateStore {
    pub fn new(params: GenerationParams) -> Self {
        Self {
            params,
            cache: HashMap::new(),
        }
    }

    pub fn contains(&self, key: SequenceKey) -> bool {
        self.cache.contains_key(&key)
    }

    /// Drop a cached template, forcing regeneration on next access.
    pub fn evict(&mut self, key: SequenceKey) {
        self.cache.remove(&key);
    }

    fn is_stale(&self, key: SequenceKey, catalog: &SequenceCatalog) -> bool {
        match (self.cache.get(&key), catalog.get(key)) {
            (Some(template), Some(sequence)) => {
                template.sequence_signature != Some(sequence.signature)
            }
            _ => true,
        }
    }

    /// Bring `key` and everything reachable from it up to date, children
    /// before parents. A parent is regenerated when its own signature
    /// changed *or* any child was regenerated this pass, since its field
    /// embeds remapped copies of child data.
    fn ensure_fresh(
        &mut self,
        key: SequenceKey,
        catalog: &SequenceCatalog,
    ) -> PlayfieldResult<()> {
        #[derive(Clone, Copy, PartialEq)]
        enum State {
            OnStack,
            Done,
        }

        enum Phase {
            Enter(SequenceKey),
            Exit(SequenceKey),
        }

        let mut state: HashMap<SequenceKey, State> = HashMap::new();
        let mut recompiled: Vec<SequenceKey> = Vec::new();
        let mut stack = vec![Phase::Enter(key)];

        while let Some(phase) = stack.pop() {
            match phase {
                Phase::Enter(k) => {
                    if state.contains_key(&k) {
                        continue;
                    }
                    state.insert(k, State::OnStack);
                    stack.push(Phase::Exit(k));
                    for dep in sub_sequence_keys(catalog.require(k)?) {
                        match state.get(&dep) {
                            Some(State::OnStack) => {
                                return Err(PlayfieldError::compilation(format!(
                                    "sequence cycle detected through {dep:?}"
                                )));
                            }
                            Some(State::Done) => {}
                            None => stack.push(Phase::Enter(dep)),
                        }
                    }
                }
                Phase::Exit(k) => {
                    state.insert(k, State::Done);
                    let child_changed = sub_sequence_keys(catalog.require(k)?)
                        .any(|dep| recompiled.contains(&dep));
                    if self.is_stale(k, catalog) || child_changed {
                        self.regenerate(k, catalog)?;
                        recompiled.push(k);
                    }
                }
            }
        }
        Ok(())
    }

    fn regenerate(&mut self, key: SequenceKey, catalog: &SequenceCatalog) -> PlayfieldResult<()> {
        tracing::debug!(?key, "regenerating evaluation template");
        let sequence = catalog.require(key)?;
        let previous = self.cache.remove(&key);
        let params = self.params.clone();
        let template =
            generate_template(sequence, catalog, self, &params, previous.as_deref())?;
        self.cache.insert(key, Arc::new(template));
        Ok(())
    }
}

impl TemplateStore for InMemoryTemplateStore {
    fn get_compiled_template(
        &mut self,
        key: SequenceKey,
        catalog: &SequenceCatalog,
    ) -> PlayfieldResult<Arc<EvaluationTemplate>> {
        self.ensure_fresh(key, catalog)?;
        self.cache
            .get(&key)
            .cloned()
            .ok_or_else(|| PlayfieldError::compilation(format!("no template generated for {key:?}")))
    }
}

fn sub_sequence_keys(
    sequence: &crate::model::Sequence,
) -> impl Iterator<Item = SequenceKey> + '_ {
    sequence
        .master_tracks
        .iter()
        .filter(|t| t.active)
        .flat_map(|t| t.sections.iter())
        .filter(|s| s.active)
        .filter_map(|s| match &s.payload {
            SectionPayload::SubSequence(sub) => Some(sub.sequence),
            _ => None,
        })
}
