//! The pre-animated state cache: remembers what objects looked like before
//! the sequencer touched them, and restores it when evaluation stops.
//!
//! One slot exists per `(object, animation type)` pair; the first writer in
//! a still-active capture scope wins and later writes are no-ops. Slots are
//! either global (restored only on full shutdown) or entity-owned
//! (ref-counted; restored when the last owning entity tears down). A slot
//! can be both at once when tracks with different completion modes animate
//! the same state, in which case entity teardown must not restore it.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::{
    field::EvaluationKey,
    hash::stable_hash64,
    player::{ObjectHandle, PlaybackClient},
};

/// Identifies one kind of animated state (e.g. one property name). Derived
/// structurally so it is stable across runs and registration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AnimTypeId(pub u64);

impl AnimTypeId {
    pub fn of(name: &str) -> Self {
        Self(stable_hash64(0x70ab_5c61, name.as_bytes()))
    }
}

/// How a capture is owned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureScope {
    /// First writer wins for the cache lifetime; restored on request only.
    Global,
    /// Owned by the capturing entity; released on its teardown.
    Entity(EvaluationKey),
}

/// Restores one piece of captured state.
pub trait PreAnimatedToken {
    fn restore(&self, player: &mut dyn PlaybackClient);
}

type SlotKey = (Option<ObjectHandle>, AnimTypeId);

struct Slot {
    token: Box<dyn PreAnimatedToken>,
    /// Capture order; restores run in reverse.
    order: u64,
    global: bool,
    owners: Vec<EvaluationKey>,
}

#[derive(Default)]
pub struct PreAnimatedState {
    slots: IndexMap<SlotKey, Slot>,
    contributions: HashMap<EvaluationKey, Vec<SlotKey>>,
    counter: u64,
}

impl PreAnimatedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Capture state for `(object, type_id)` unless already captured.
    /// `produce` is only invoked for the first writer.
    pub fn save_state(
        &mut self,
        object: Option<ObjectHandle>,
        type_id: AnimTypeId,
        scope: CaptureScope,
        player: &dyn PlaybackClient,
        produce: impl FnOnce(&dyn PlaybackClient) -> Box<dyn PreAnimatedToken>,
    ) {
        let key = (object, type_id);
        let slot = match self.slots.entry(key) {
            indexmap::map::Entry::Occupied(entry) => entry.into_mut(),
            indexmap::map::Entry::Vacant(entry) => {
                let order = self.counter;
                self.counter += 1;
                entry.insert(Slot {
                    token: produce(player),
                    order,
                    global: false,
                    owners: Vec::new(),
                })
            }
        };

        match scope {
            CaptureScope::Global => slot.global = true,
            CaptureScope::Entity(entity) => {
                if !slot.owners.contains(&entity) {
                    slot.owners.push(entity);
                    self.contributions.entry(entity).or_default().push(key);
                }
            }
        }
    }

    /// Release `entity`'s captures, restoring every slot it owned
    /// exclusively, in reverse capture order.
    pub fn restore_for_entity(&mut self, entity: &EvaluationKey, player: &mut dyn PlaybackClient) {
        let Some(keys) = self.contributions.remove(entity) else {
            return;
        };

        let mut to_restore: Vec<(u64, SlotKey)> = Vec::new();
        for key in keys {
            let Some(slot) = self.slots.get_mut(&key) else {
                continue;
            };
            slot.owners.retain(|o| o != entity);
            if slot.owners.is_empty() && !slot.global {
                to_restore.push((slot.order, key));
            }
        }

        to_restore.sort_unstable_by(|a, b| b.0.cmp(&a.0));
        for (_, key) in to_restore {
            if let Some(slot) = self.slots.shift_remove(&key) {
                slot.token.restore(player);
            }
        }
    }

    /// Restore everything, including global captures. Used on player
    /// shutdown or explicit rollback.
    pub fn restore_all(&mut self, player: &mut dyn PlaybackClient) {
        let mut slots: Vec<Slot> = self.slots.drain(..).map(|(_, slot)| slot).collect();
        self.contributions.clear();
        slots.sort_unstable_by(|a, b| b.order.cmp(&a.order));
        for slot in slots {
            slot.token.restore(player);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        hierarchy::SequenceInstanceId,
        model::{BindingId, SequenceKey},
        template::TrackIdentifier,
    };
    use std::collections::HashMap as Map;

    /// Minimal stage: one object with named f64 properties.
    #[derive(Default)]
    struct Stage {
        props: Map<(u64, String), f64>,
    }

    impl PlaybackClient for Stage {
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
        fn property(&self, object: ObjectHandle, property: &str) -> Option<f64> {
            self.props.get(&(object.0, property.to_string())).copied()
        }
        fn set_property(&mut self, object: ObjectHandle, property: &str, value: f64) {
            self.props.insert((object.0, property.to_string()), value);
        }
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

    struct RestoreProp {
        object: ObjectHandle,
        value: f64,
    }

    impl PreAnimatedToken for RestoreProp {
        fn restore(&self, player: &mut dyn PlaybackClient) {
            player.set_property(self.object, "x", self.value);
        }
    }

    fn entity(n: u32) -> EvaluationKey {
        EvaluationKey::for_track(SequenceInstanceId::ROOT, TrackIdentifier(n))
    }

    fn capture_current_x(
        state: &mut PreAnimatedState,
        stage: &Stage,
        obj: ObjectHandle,
        scope: CaptureScope,
    ) {
        state.save_state(Some(obj), AnimTypeId::of("x"), scope, stage, |p| {
            Box::new(RestoreProp {
                object: obj,
                value: p.property(obj, "x").unwrap_or_default(),
            })
        });
    }

    #[test]
    fn first_writer_wins_and_entity_restore_rolls_back() {
        let mut stage = Stage::default();
        let obj = ObjectHandle(1);
        stage.set_property(obj, "x", 10.0);

        let mut state = PreAnimatedState::new();
        capture_current_x(&mut state, &stage, obj, CaptureScope::Entity(entity(0)));
        stage.set_property(obj, "x", 99.0);
        // Second write in the same scope must not re-capture the animated value.
        capture_current_x(&mut state, &stage, obj, CaptureScope::Entity(entity(0)));

        state.restore_for_entity(&entity(0), &mut stage);
        assert_eq!(stage.property(obj, "x"), Some(10.0));
        assert!(state.is_empty());
    }

    #[test]
    fn refcounted_slot_restores_only_after_last_owner() {
        let mut stage = Stage::default();
        let obj = ObjectHandle(1);
        stage.set_property(obj, "x", 10.0);

        let mut state = PreAnimatedState::new();
        capture_current_x(&mut state, &stage, obj, CaptureScope::Entity(entity(0)));
        capture_current_x(&mut state, &stage, obj, CaptureScope::Entity(entity(1)));
        stage.set_property(obj, "x", 50.0);

        state.restore_for_entity(&entity(0), &mut stage);
        assert_eq!(stage.property(obj, "x"), Some(50.0));

        state.restore_for_entity(&entity(1), &mut stage);
        assert_eq!(stage.property(obj, "x"), Some(10.0));
    }

    #[test]
    fn global_capture_survives_entity_teardown() {
        let mut stage = Stage::default();
        let obj = ObjectHandle(1);
        stage.set_property(obj, "x", 10.0);

        let mut state = PreAnimatedState::new();
        capture_current_x(&mut state, &stage, obj, CaptureScope::Global);
        capture_current_x(&mut state, &stage, obj, CaptureScope::Entity(entity(0)));
        stage.set_property(obj, "x", 50.0);

        state.restore_for_entity(&entity(0), &mut stage);
        assert_eq!(stage.property(obj, "x"), Some(50.0), "global slot must not restore");

        state.restore_all(&mut stage);
        assert_eq!(stage.property(obj, "x"), Some(10.0));
    }

    #[test]
    fn restore_runs_in_reverse_capture_order() {
        struct PushTag {
            tag: u64,
        }
        impl PreAnimatedToken for PushTag {
            fn restore(&self, player: &mut dyn PlaybackClient) {
                let n = player.property(ObjectHandle(0), "log").unwrap_or(0.0);
                player.set_property(ObjectHandle(0), "log", n * 10.0 + self.tag as f64);
            }
        }

        let mut stage = Stage::default();
        let mut state = PreAnimatedState::new();
        for tag in 1..=3u64 {
            state.save_state(
                Some(ObjectHandle(tag)),
                AnimTypeId::of("x"),
                CaptureScope::Entity(entity(0)),
                &stage,
                |_| Box::new(PushTag { tag }),
            );
        }

        state.restore_for_entity(&entity(0), &mut stage);
        // Tokens restored 3, 2, 1 -> digits accumulate as 321.
        assert_eq!(stage.property(ObjectHandle(0), "log"), Some(321.0));
    }
}
