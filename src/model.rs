//! The authoring-side object model: sequences holding tracks, tracks holding
//! time-ranged sections, and object bindings.
//!
//! Everything here is input to the compiler. Content signatures are
//! regenerated on every edit; the compiled template keys its incremental
//! bookkeeping off them, so mutation helpers must go through
//! [`Track::touch`] / [`Sequence::touch`].

use std::collections::HashMap;

use uuid::Uuid;

use crate::{
    core::TimeRange,
    curve::Curve,
    error::{PlayfieldError, PlayfieldResult},
};

/// Identity of a sequence asset in a [`SequenceCatalog`]. Stable for the
/// lifetime of the asset, unlike its content signature.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct SequenceKey(pub Uuid);

impl SequenceKey {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Content signature, regenerated whenever the owning object is edited.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct SignatureId(pub Uuid);

impl SignatureId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Identifies one object binding within a sequence.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct BindingId(pub Uuid);

impl BindingId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

/// What happens to animated state when a track stops evaluating.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CompletionMode {
    /// Capture pre-animated state per entity and restore it on teardown.
    RestoreState,
    /// Capture globally; state sticks until full player shutdown.
    KeepState,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum TrackKind {
    /// Animates one named scalar property of the bound object.
    Property { property: String },
    /// Keeps the bound spawnable alive while a section is active.
    Spawn,
    /// Master-level screen fade. Cross-cutting: all fade tracks in a
    /// sequence collapse into one shared compiled instance.
    Fade,
    /// References other sequences; sections carry the nested payload.
    SubSequence,
    /// Unsupported authored data. Compiles to a marker that requires a
    /// legacy execution adapter instead of failing the whole template.
    Legacy,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum SectionPayload {
    Property { value: Curve },
    Spawn,
    Fade { opacity: Curve },
    SubSequence(SubSequencePayload),
    Legacy,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SubSequencePayload {
    pub sequence: SequenceKey,
    /// Frame of the child sequence that lines up with this section's start.
    pub start_offset: i64,
    pub time_scale: f64,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Section {
    pub signature: SignatureId,
    pub range: TimeRange,
    pub row: u32,
    pub priority: i32,
    pub active: bool,
    pub payload: SectionPayload,
}

impl Section {
    pub fn touch(&mut self) {
        self.signature = SignatureId::generate();
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Track {
    pub signature: SignatureId,
    pub name: String,
    pub kind: TrackKind,
    pub sections: Vec<Section>,
    /// Tracks with higher evaluation priority run earlier within a frame.
    pub eval_priority: i32,
    /// Evaluation group name; group boundaries are token flush boundaries.
    pub eval_group: String,
    /// Fill gaps between sections by holding the nearest one at a forced
    /// evaluation time (camera-cut style) instead of evaluating nothing.
    pub evaluate_nearest: bool,
    pub completion: CompletionMode,
    pub active: bool,
}

impl Track {
    pub fn touch(&mut self) {
        self.signature = SignatureId::generate();
    }

    pub fn all_sections(&self) -> &[Section] {
        &self.sections
    }

    fn validate(&self, catalog: &SequenceCatalog, origin: &str) -> PlayfieldResult<()> {
        for (idx, section) in self.sections.iter().enumerate() {
            let matches = matches!(
                (&self.kind, &section.payload),
                (TrackKind::Property { .. }, SectionPayload::Property { .. })
                    | (TrackKind::Spawn, SectionPayload::Spawn)
                    | (TrackKind::Fade, SectionPayload::Fade { .. })
                    | (TrackKind::SubSequence, SectionPayload::SubSequence(_))
                    | (TrackKind::Legacy, SectionPayload::Legacy)
            );
            if !matches {
                return Err(PlayfieldError::validation(format!(
                    "{origin}: track '{}' section {idx} payload does not match track kind",
                    self.name
                )));
            }

            match &section.payload {
                SectionPayload::Property { value } => value.validate()?,
                SectionPayload::Fade { opacity } => opacity.validate()?,
                SectionPayload::SubSequence(sub) => {
                    if !(sub.time_scale > 0.0) || !sub.time_scale.is_finite() {
                        return Err(PlayfieldError::validation(format!(
                            "{origin}: track '{}' section {idx} time_scale must be > 0",
                            self.name
                        )));
                    }
                    if !catalog.contains(sub.sequence) {
                        return Err(PlayfieldError::validation(format!(
                            "{origin}: track '{}' section {idx} references a sequence not in the catalog",
                            self.name
                        )));
                    }
                    if section.range.lower.value().is_none() {
                        return Err(PlayfieldError::validation(format!(
                            "{origin}: track '{}' section {idx}: sub-sequence sections need a finite start",
                            self.name
                        )));
                    }
                }
                SectionPayload::Spawn | SectionPayload::Legacy => {}
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BindingKind {
    /// Resolved by the player's object-location logic, optionally scoped to
    /// the resolved objects of a parent binding.
    Possessable { parent: Option<BindingId> },
    /// Resolved from the spawn register only; never searched for.
    Spawnable,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Binding {
    pub id: BindingId,
    pub name: String,
    pub kind: BindingKind,
    pub tracks: Vec<Track>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Sequence {
    pub key: SequenceKey,
    pub signature: SignatureId,
    pub name: String,
    pub master_tracks: Vec<Track>,
    pub bindings: Vec<Binding>,
    pub playback_range: TimeRange,
}

impl Sequence {
    pub fn touch(&mut self) {
        self.signature = SignatureId::generate();
    }

    pub fn binding(&self, id: BindingId) -> Option<&Binding> {
        self.bindings.iter().find(|b| b.id == id)
    }

    pub fn validate(&self, catalog: &SequenceCatalog) -> PlayfieldResult<()> {
        for track in &self.master_tracks {
            track.validate(catalog, &self.name)?;
        }

        let mut seen = std::collections::HashSet::new();
        for binding in &self.bindings {
            if !seen.insert(binding.id) {
                return Err(PlayfieldError::validation(format!(
                    "{}: duplicate binding id for '{}'",
                    self.name, binding.name
                )));
            }
            if let BindingKind::Possessable {
                parent: Some(parent),
            } = binding.kind
                && self.binding(parent).is_none()
            {
                return Err(PlayfieldError::validation(format!(
                    "{}: binding '{}' has a dangling parent binding",
                    self.name, binding.name
                )));
            }
            for track in &binding.tracks {
                if matches!(track.kind, TrackKind::SubSequence) {
                    return Err(PlayfieldError::validation(format!(
                        "{}: binding '{}' carries a sub-sequence track; those are master-only",
                        self.name, binding.name
                    )));
                }
                track.validate(catalog, &self.name)?;
            }
        }
        Ok(())
    }
}

/// All sequence assets reachable by the compiler, keyed by identity.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct SequenceCatalog {
    sequences: HashMap<SequenceKey, Sequence>,
}

impl SequenceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, sequence: Sequence) {
        self.sequences.insert(sequence.key, sequence);
    }

    pub fn get(&self, key: SequenceKey) -> Option<&Sequence> {
        self.sequences.get(&key)
    }

    pub fn get_mut(&mut self, key: SequenceKey) -> Option<&mut Sequence> {
        self.sequences.get_mut(&key)
    }

    pub fn contains(&self, key: SequenceKey) -> bool {
        self.sequences.contains_key(&key)
    }

    pub fn require(&self, key: SequenceKey) -> PlayfieldResult<&Sequence> {
        self.get(key).ok_or_else(|| {
            PlayfieldError::compilation(format!("sequence {key:?} is not in the catalog"))
        })
    }

    pub fn validate(&self) -> PlayfieldResult<()> {
        for sequence in self.sequences.values() {
            sequence.validate(self)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FrameNumber;

    fn property_track(name: &str) -> Track {
        Track {
            signature: SignatureId::generate(),
            name: name.to_string(),
            kind: TrackKind::Property {
                property: "alpha".to_string(),
            },
            sections: vec![Section {
                signature: SignatureId::generate(),
                range: TimeRange::new(FrameNumber(0), FrameNumber(10)).unwrap(),
                row: 0,
                priority: 0,
                active: true,
                payload: SectionPayload::Property {
                    value: Curve::constant(1.0),
                },
            }],
            eval_priority: 0,
            eval_group: "default".to_string(),
            evaluate_nearest: false,
            completion: CompletionMode::RestoreState,
            active: true,
        }
    }

    #[test]
    fn payload_kind_mismatch_is_rejected() {
        let mut track = property_track("t");
        track.sections[0].payload = SectionPayload::Spawn;
        let seq = Sequence {
            key: SequenceKey::generate(),
            signature: SignatureId::generate(),
            name: "seq".to_string(),
            master_tracks: vec![track],
            bindings: vec![],
            playback_range: TimeRange::new(FrameNumber(0), FrameNumber(100)).unwrap(),
        };
        assert!(seq.validate(&SequenceCatalog::new()).is_err());
    }

    #[test]
    fn dangling_parent_binding_is_rejected() {
        let seq = Sequence {
            key: SequenceKey::generate(),
            signature: SignatureId::generate(),
            name: "seq".to_string(),
            master_tracks: vec![],
            bindings: vec![Binding {
                id: BindingId::generate(),
                name: "child".to_string(),
                kind: BindingKind::Possessable {
                    parent: Some(BindingId::generate()),
                },
                tracks: vec![],
            }],
            playback_range: TimeRange::new(FrameNumber(0), FrameNumber(100)).unwrap(),
        };
        assert!(seq.validate(&SequenceCatalog::new()).is_err());
    }

    #[test]
    fn touch_regenerates_signatures() {
        let mut track = property_track("t");
        let before = track.signature;
        track.touch();
        assert_ne!(before, track.signature);
    }
}
