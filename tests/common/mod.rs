//! Shared mock stage for integration tests: a tiny scene graph with named
//! f64 properties, a spawn register, and call counters.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};

use playfield::{
    BindingId, ObjectHandle, PlaybackClient, SequenceInstanceId, SequenceKey,
};

#[derive(Default)]
pub struct MockStage {
    pub objects: HashMap<ObjectHandle, HashMap<String, f64>>,
    pub possessed: HashMap<BindingId, Vec<ObjectHandle>>,
    pub spawned: HashMap<(SequenceInstanceId, BindingId), ObjectHandle>,
    pub dead: HashSet<ObjectHandle>,
    pub fade: f64,
    pub spawn_count: u32,
    pub destroy_count: u32,
    pub expired: Vec<SequenceInstanceId>,
    next_spawn: u64,
}

impl MockStage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an object and bind it to a possessable.
    pub fn possess(&mut self, binding: BindingId, handle: ObjectHandle) {
        self.objects.entry(handle).or_default();
        self.possessed.entry(binding).or_default().push(handle);
    }

    pub fn prop(&self, handle: ObjectHandle, name: &str) -> Option<f64> {
        self.objects.get(&handle)?.get(name).copied()
    }

    pub fn set_prop(&mut self, handle: ObjectHandle, name: &str, value: f64) {
        self.objects
            .entry(handle)
            .or_default()
            .insert(name.to_string(), value);
    }
}

impl PlaybackClient for MockStage {
    fn locate_objects(
        &self,
        _sequence: SequenceKey,
        binding: BindingId,
        _parents: &[ObjectHandle],
    ) -> Vec<ObjectHandle> {
        self.possessed
            .get(&binding)
            .map(|objs| {
                objs.iter()
                    .filter(|o| !self.dead.contains(o))
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn is_object_valid(&self, object: ObjectHandle) -> bool {
        self.objects.contains_key(&object) && !self.dead.contains(&object)
    }

    fn property(&self, object: ObjectHandle, property: &str) -> Option<f64> {
        self.prop(object, property)
    }

    fn set_property(&mut self, object: ObjectHandle, property: &str, value: f64) {
        self.set_prop(object, property, value);
    }

    fn fade(&self) -> f64 {
        self.fade
    }

    fn set_fade(&mut self, alpha: f64) {
        self.fade = alpha;
    }

    fn spawn_object(
        &mut self,
        sequence: SequenceInstanceId,
        binding: BindingId,
    ) -> Option<ObjectHandle> {
        self.next_spawn += 1;
        self.spawn_count += 1;
        let handle = ObjectHandle(9000 + self.next_spawn);
        self.objects.entry(handle).or_default();
        self.spawned.insert((sequence, binding), handle);
        Some(handle)
    }

    fn destroy_spawned_object(&mut self, sequence: SequenceInstanceId, binding: BindingId) {
        if let Some(handle) = self.spawned.remove(&(sequence, binding)) {
            self.destroy_count += 1;
            self.objects.remove(&handle);
        }
    }

    fn spawned_object(
        &self,
        sequence: SequenceInstanceId,
        binding: BindingId,
    ) -> Option<ObjectHandle> {
        self.spawned.get(&(sequence, binding)).copied()
    }

    fn on_sequence_expired(&mut self, sequence: SequenceInstanceId) {
        self.expired.push(sequence);
    }
}
