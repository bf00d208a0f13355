//! The execution token stack: deferred mutations accumulated during
//! evaluation and applied in one ordered batch afterwards.
//!
//! All reads for a frame happen while tokens are gathered, so no track ever
//! observes another track's same-frame writes. Application order is exactly
//! insertion order, which the evaluation group ordering makes deterministic.
//!
//! Token application is a threading candidate (per-thread stacks merged
//! before a single apply pass), but that is deliberately not implemented:
//! it would have to preserve this exact ordering to be observably
//! equivalent.

use crate::{
    binding::BindingRegistry,
    field::EvaluationKey,
    model::CompletionMode,
    player::{EvaluationContext, Operand, PlaybackClient},
    preanim::PreAnimatedState,
};

/// The scope captured with every token: who was evaluating, against what,
/// and how captured state completes.
#[derive(Clone, Copy, Debug)]
pub struct TokenScope {
    pub operand: Option<Operand>,
    pub key: EvaluationKey,
    pub completion: CompletionMode,
    pub context: EvaluationContext,
}

/// Everything a token may touch while executing.
pub struct ExecutionScope<'a> {
    pub player: &'a mut dyn PlaybackClient,
    pub preanim: &'a mut PreAnimatedState,
    pub bindings: &'a mut BindingRegistry,
}

pub trait ExecutionToken {
    fn execute(&self, scope: &TokenScope, exec: &mut ExecutionScope<'_>);
}

#[derive(Default)]
pub struct ExecutionTokens {
    entries: Vec<(TokenScope, Box<dyn ExecutionToken>)>,
    scope: Option<TokenScope>,
}

impl ExecutionTokens {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the current track/operand scope. Must be in place before any
    /// [`add`](Self::add) call.
    pub fn set_scope(&mut self, scope: TokenScope) {
        self.scope = Some(scope);
    }

    pub fn clear_scope(&mut self) {
        self.scope = None;
    }

    /// Append a token under the current scope. Tokens added with no scope
    /// set are dropped with a diagnostic; that is a caller bug, not a
    /// recoverable condition worth failing the frame for.
    pub fn add(&mut self, token: Box<dyn ExecutionToken>) {
        match self.scope {
            Some(scope) => self.entries.push((scope, token)),
            None => {
                tracing::warn!("execution token added with no scope set; dropped");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Execute every accumulated token in insertion order, then clear.
    pub fn apply(&mut self, exec: &mut ExecutionScope<'_>) {
        for (scope, token) in self.entries.drain(..) {
            token.execute(&scope, exec);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::FrameNumber,
        hierarchy::SequenceInstanceId,
        model::{BindingId, SequenceKey},
        player::ObjectHandle,
        template::TrackIdentifier,
    };
    use std::{cell::RefCell, rc::Rc};

    struct NullStage;

    impl PlaybackClient for NullStage {
        fn locate_objects(
            &self,
            _sequence: SequenceKey,
            _binding: BindingId,
            _parents: &[ObjectHandle],
        ) -> Vec<ObjectHandle> {
            Vec::new()
        }
        fn is_object_valid(&self, _object: ObjectHandle) -> bool {
            true
        }
        fn property(&self, _object: ObjectHandle, _property: &str) -> Option<f64> {
            None
        }
        fn set_property(&mut self, _object: ObjectHandle, _property: &str, _value: f64) {}
        fn fade(&self) -> f64 {
            0.0
        }
        fn set_fade(&mut self, _alpha: f64) {}
        fn spawn_object(
            &mut self,
            _sequence: SequenceInstanceId,
            _binding: BindingId,
        ) -> Option<ObjectHandle> {
            None
        }
        fn destroy_spawned_object(&mut self, _sequence: SequenceInstanceId, _binding: BindingId) {}
        fn spawned_object(
            &self,
            _sequence: SequenceInstanceId,
            _binding: BindingId,
        ) -> Option<ObjectHandle> {
            None
        }
    }

    struct Recording {
        tag: u32,
        log: Rc<RefCell<Vec<u32>>>,
    }

    impl ExecutionToken for Recording {
        fn execute(&self, _scope: &TokenScope, _exec: &mut ExecutionScope<'_>) {
            self.log.borrow_mut().push(self.tag);
        }
    }

    fn scope() -> TokenScope {
        TokenScope {
            operand: None,
            key: EvaluationKey::for_track(SequenceInstanceId::ROOT, TrackIdentifier(0)),
            completion: CompletionMode::RestoreState,
            context: EvaluationContext {
                root_time: FrameNumber(0),
                time: FrameNumber(0),
            },
        }
    }

    #[test]
    fn apply_runs_in_insertion_order_and_clears() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut tokens = ExecutionTokens::new();
        tokens.set_scope(scope());
        for tag in [3, 1, 2] {
            tokens.add(Box::new(Recording {
                tag,
                log: log.clone(),
            }));
        }

        let mut stage = NullStage;
        let mut preanim = PreAnimatedState::new();
        let mut bindings = BindingRegistry::new();
        let mut exec = ExecutionScope {
            player: &mut stage,
            preanim: &mut preanim,
            bindings: &mut bindings,
        };
        tokens.apply(&mut exec);

        assert_eq!(*log.borrow(), vec![3, 1, 2]);
        assert!(tokens.is_empty());
    }

    #[test]
    fn unscoped_add_is_dropped() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut tokens = ExecutionTokens::new();
        tokens.add(Box::new(Recording {
            tag: 9,
            log: log.clone(),
        }));
        assert!(tokens.is_empty());
    }
}
