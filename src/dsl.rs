//! Builders for authoring sequences in code (tests, tools, the CLI).

use crate::{
    core::TimeRange,
    curve::Curve,
    model::{
        Binding, BindingId, BindingKind, CompletionMode, Section, SectionPayload, Sequence,
        SequenceKey, SignatureId, SubSequencePayload, Track, TrackKind,
    },
};

pub struct SequenceBuilder {
    key: SequenceKey,
    name: String,
    playback_range: TimeRange,
    master_tracks: Vec<Track>,
    bindings: Vec<Binding>,
}

impl SequenceBuilder {
    pub fn new(name: impl Into<String>, playback_range: TimeRange) -> Self {
        Self {
            key: SequenceKey::generate(),
            name: name.into(),
            playback_range,
            master_tracks: Vec::new(),
            bindings: Vec::new(),
        }
    }

    pub fn key(mut self, key: SequenceKey) -> Self {
        self.key = key;
        self
    }

    pub fn track(mut self, track: Track) -> Self {
        self.master_tracks.push(track);
        self
    }

    pub fn binding(mut self, binding: Binding) -> Self {
        self.bindings.push(binding);
        self
    }

    pub fn build(self) -> Sequence {
        Sequence {
            key: self.key,
            signature: SignatureId::generate(),
            name: self.name,
            master_tracks: self.master_tracks,
            bindings: self.bindings,
            playback_range: self.playback_range,
        }
    }
}

pub struct TrackBuilder {
    name: String,
    kind: TrackKind,
    sections: Vec<Section>,
    eval_priority: i32,
    eval_group: String,
    evaluate_nearest: bool,
    completion: CompletionMode,
    active: bool,
}

impl TrackBuilder {
    fn new(name: impl Into<String>, kind: TrackKind, eval_group: &str, eval_priority: i32) -> Self {
        Self {
            name: name.into(),
            kind,
            sections: Vec::new(),
            eval_priority,
            eval_group: eval_group.to_string(),
            evaluate_nearest: false,
            completion: CompletionMode::RestoreState,
            active: true,
        }
    }

    pub fn property(name: impl Into<String>, property: impl Into<String>) -> Self {
        Self::new(
            name,
            TrackKind::Property {
                property: property.into(),
            },
            "default",
            0,
        )
    }

    /// Spawn tracks default to the immediate-flush "spawn" group, ahead of
    /// everything else, so spawned objects exist before other tracks
    /// resolve bindings.
    pub fn spawn(name: impl Into<String>) -> Self {
        Self::new(name, TrackKind::Spawn, "spawn", 100)
    }

    pub fn fade(name: impl Into<String>) -> Self {
        Self::new(name, TrackKind::Fade, "default", 0)
    }

    pub fn sub_sequence(name: impl Into<String>) -> Self {
        Self::new(name, TrackKind::SubSequence, "default", 0)
    }

    pub fn legacy(name: impl Into<String>) -> Self {
        Self::new(name, TrackKind::Legacy, "default", 0)
    }

    pub fn eval_priority(mut self, priority: i32) -> Self {
        self.eval_priority = priority;
        self
    }

    pub fn eval_group(mut self, group: impl Into<String>) -> Self {
        self.eval_group = group.into();
        self
    }

    pub fn evaluate_nearest(mut self) -> Self {
        self.evaluate_nearest = true;
        self
    }

    pub fn completion(mut self, completion: CompletionMode) -> Self {
        self.completion = completion;
        self
    }

    pub fn muted(mut self) -> Self {
        self.active = false;
        self
    }

    pub fn section(mut self, section: Section) -> Self {
        self.sections.push(section);
        self
    }

    pub fn build(self) -> Track {
        Track {
            signature: SignatureId::generate(),
            name: self.name,
            kind: self.kind,
            sections: self.sections,
            eval_priority: self.eval_priority,
            eval_group: self.eval_group,
            evaluate_nearest: self.evaluate_nearest,
            completion: self.completion,
            active: self.active,
        }
    }
}

pub struct SectionBuilder {
    range: TimeRange,
    row: u32,
    priority: i32,
    active: bool,
    payload: SectionPayload,
}

impl SectionBuilder {
    fn new(range: TimeRange, payload: SectionPayload) -> Self {
        Self {
            range,
            row: 0,
            priority: 0,
            active: true,
            payload,
        }
    }

    pub fn property(range: TimeRange, value: Curve) -> Self {
        Self::new(range, SectionPayload::Property { value })
    }

    pub fn spawn(range: TimeRange) -> Self {
        Self::new(range, SectionPayload::Spawn)
    }

    pub fn fade(range: TimeRange, opacity: Curve) -> Self {
        Self::new(range, SectionPayload::Fade { opacity })
    }

    pub fn sub_sequence(
        range: TimeRange,
        sequence: SequenceKey,
        start_offset: i64,
        time_scale: f64,
    ) -> Self {
        Self::new(
            range,
            SectionPayload::SubSequence(SubSequencePayload {
                sequence,
                start_offset,
                time_scale,
            }),
        )
    }

    pub fn legacy(range: TimeRange) -> Self {
        Self::new(range, SectionPayload::Legacy)
    }

    pub fn row(mut self, row: u32) -> Self {
        self.row = row;
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn muted(mut self) -> Self {
        self.active = false;
        self
    }

    pub fn build(self) -> Section {
        Section {
            signature: SignatureId::generate(),
            range: self.range,
            row: self.row,
            priority: self.priority,
            active: self.active,
            payload: self.payload,
        }
    }
}

pub struct BindingBuilder {
    id: BindingId,
    name: String,
    kind: BindingKind,
    tracks: Vec<Track>,
}

impl BindingBuilder {
    pub fn possessable(name: impl Into<String>) -> Self {
        Self {
            id: BindingId::generate(),
            name: name.into(),
            kind: BindingKind::Possessable { parent: None },
            tracks: Vec::new(),
        }
    }

    pub fn spawnable(name: impl Into<String>) -> Self {
        Self {
            id: BindingId::generate(),
            name: name.into(),
            kind: BindingKind::Spawnable,
            tracks: Vec::new(),
        }
    }

    pub fn id(mut self, id: BindingId) -> Self {
        self.id = id;
        self
    }

    pub fn parent(mut self, parent: BindingId) -> Self {
        self.kind = BindingKind::Possessable {
            parent: Some(parent),
        };
        self
    }

    pub fn track(mut self, track: Track) -> Self {
        self.tracks.push(track);
        self
    }

    pub fn build(self) -> Binding {
        Binding {
            id: self.id,
            name: self.name,
            kind: self.kind,
            tracks: self.tracks,
        }
    }
}
