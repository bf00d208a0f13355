//! Lazy object-binding resolution, cached per sequence instance.
//!
//! Possessables resolve through the player's object-location logic, using
//! the parent binding's resolved objects as context when parented.
//! Spawnables resolve through the spawn register only. Cached pointers are
//! swept for expiry every frame and re-resolved on next access; a dead
//! object is never dereferenced, only dropped.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::{
    hierarchy::SequenceInstanceId,
    model::{BindingId, BindingKind, Sequence, SequenceKey},
    player::{ObjectHandle, PlaybackClient},
};

#[derive(Clone, Debug, Default)]
struct CachedBinding {
    objects: Vec<ObjectHandle>,
    up_to_date: bool,
}

/// Binding resolution state for one sequence instance.
#[derive(Clone, Debug)]
pub struct ObjectBindingCache {
    sequence: SequenceKey,
    descriptors: IndexMap<BindingId, BindingKind>,
    /// Parent -> directly registered children, for recursive invalidation.
    children: HashMap<BindingId, Vec<BindingId>>,
    bound: HashMap<BindingId, CachedBinding>,
}

impl ObjectBindingCache {
    pub fn new(sequence: &Sequence) -> Self {
        let mut descriptors = IndexMap::new();
        let mut children: HashMap<BindingId, Vec<BindingId>> = HashMap::new();
        for binding in &sequence.bindings {
            descriptors.insert(binding.id, binding.kind);
            if let BindingKind::Possessable {
                parent: Some(parent),
            } = binding.kind
            {
                children.entry(parent).or_default().push(binding.id);
            }
        }
        Self {
            sequence: sequence.key,
            descriptors,
            children,
            bound: HashMap::new(),
        }
    }

    /// Resolve a binding to its live objects, filling the cache on first
    /// access. Unknown bindings resolve to nothing.
    pub fn find_bound_objects(
        &mut self,
        instance: SequenceInstanceId,
        binding: BindingId,
        player: &dyn PlaybackClient,
    ) -> Vec<ObjectHandle> {
        let mut chain = Vec::new();
        self.resolve(instance, binding, player, &mut chain)
    }

    fn resolve(
        &mut self,
        instance: SequenceInstanceId,
        binding: BindingId,
        player: &dyn PlaybackClient,
        chain: &mut Vec<BindingId>,
    ) -> Vec<ObjectHandle> {
        if let Some(cached) = self.bound.get(&binding)
            && cached.up_to_date
        {
            return cached.objects.clone();
        }

        if chain.contains(&binding) {
            tracing::warn!(?binding, "binding parent chain forms a cycle; resolving unparented");
            return Vec::new();
        }

        let Some(kind) = self.descriptors.get(&binding).copied() else {
            tracing::warn!(?binding, "unknown binding id");
            return Vec::new();
        };

        let objects = match kind {
            BindingKind::Spawnable => player
                .spawned_object(instance, binding)
                .into_iter()
                .collect(),
            BindingKind::Possessable { parent } => {
                let parents = match parent {
                    Some(parent) => {
                        chain.push(binding);
                        let resolved = self.resolve(instance, parent, player, chain);
                        chain.pop();
                        resolved
                    }
                    None => Vec::new(),
                };
                player.locate_objects(self.sequence, binding, &parents)
            }
        };

        self.bound.insert(
            binding,
            CachedBinding {
                objects: objects.clone(),
                up_to_date: true,
            },
        );
        objects
    }

    /// Mark a binding, and everything registered beneath it, as needing
    /// re-resolution.
    pub fn invalidate(&mut self, binding: BindingId) {
        let mut work = vec![binding];
        while let Some(id) = work.pop() {
            if let Some(cached) = self.bound.get_mut(&id) {
                cached.up_to_date = false;
            }
            if let Some(kids) = self.children.get(&id) {
                work.extend(kids.iter().copied());
            }
        }
    }

    /// Drop cached pointers whose objects have died since last evaluation.
    pub fn invalidate_expired_objects(&mut self, player: &dyn PlaybackClient) {
        let expired: Vec<BindingId> = self
            .bound
            .iter()
            .filter(|(_, cached)| {
                cached.up_to_date
                    && cached
                        .objects
                        .iter()
                        .any(|obj| !player.is_object_valid(*obj))
            })
            .map(|(id, _)| *id)
            .collect();
        for id in expired {
            tracing::debug!(?id, "bound object expired; invalidating");
            self.invalidate(id);
        }
    }
}

/// All binding caches for one evaluation instance, keyed by sequence
/// instance ID. Owned per player; never shared across instances.
#[derive(Debug, Default)]
pub struct BindingRegistry {
    caches: HashMap<SequenceInstanceId, ObjectBindingCache>,
}

impl BindingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_instance(&mut self, instance: SequenceInstanceId, sequence: &Sequence) {
        self.caches
            .insert(instance, ObjectBindingCache::new(sequence));
    }

    pub fn unregister_instance(&mut self, instance: SequenceInstanceId) {
        self.caches.remove(&instance);
    }

    pub fn clear(&mut self) {
        self.caches.clear();
    }

    pub fn find_bound_objects(
        &mut self,
        instance: SequenceInstanceId,
        binding: BindingId,
        player: &dyn PlaybackClient,
    ) -> Vec<ObjectHandle> {
        match self.caches.get_mut(&instance) {
            Some(cache) => cache.find_bound_objects(instance, binding, player),
            None => {
                tracing::warn!(instance = instance.0, "no binding cache for instance");
                Vec::new()
            }
        }
    }

    pub fn invalidate(&mut self, instance: SequenceInstanceId, binding: BindingId) {
        if let Some(cache) = self.caches.get_mut(&instance) {
            cache.invalidate(binding);
        }
    }

    pub fn invalidate_expired_objects(&mut self, player: &dyn PlaybackClient) {
        for cache in self.caches.values_mut() {
            cache.invalidate_expired_objects(player);
        }
    }
}
