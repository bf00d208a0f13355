//! Playfield is a sequencer evaluation engine: it compiles hierarchical
//! timelines (tracks holding time-ranged sections, possibly nesting other
//! sequences) into a flat, time-indexed evaluation field, and evaluates
//! that field each frame with deterministic ordering.
//!
//! # Pipeline overview
//!
//! 1. **Segment compile**: overlapping prioritized intervals -> minimal
//!    ordered segments ([`segment`], [`track_compile`])
//! 2. **Template generation**: the whole track hierarchy -> one
//!    [`EvaluationTemplate`] per sequence plus a cross-track
//!    [`EvaluationField`] ([`generate`], [`store`])
//! 3. **Evaluation**: field lookup -> lifecycle diff -> execution tokens,
//!    applied in one deterministic batch ([`instance`], [`tokens`])
//! 4. **Rollback**: pre-animated state captured on first touch and
//!    restored on teardown ([`preanim`])
//!
//! Evaluation never mutates bound objects directly; all writes go through
//! the token stack so every track's reads observe pre-frame state.

#![forbid(unsafe_code)]

pub mod binding;
pub mod blob;
pub mod core;
pub mod curve;
pub mod dsl;
pub mod error;
pub mod field;
pub mod generate;
pub mod hash;
pub mod hierarchy;
pub mod instance;
pub mod model;
pub mod player;
pub mod preanim;
pub mod segment;
pub mod store;
pub mod template;
pub mod tokens;
pub mod track_compile;

pub use binding::{BindingRegistry, ObjectBindingCache};
pub use core::{FrameNumber, RangeBound, TimeRange, TimeTransform};
pub use curve::{Curve, CurveKey, Ease, InterpMode};
pub use dsl::{BindingBuilder, SectionBuilder, SequenceBuilder, TrackBuilder};
pub use error::{PlayfieldError, PlayfieldResult};
pub use field::{
    EvaluationField, EvaluationGroup, EvaluationKey, EvaluationMetaData, FlushGroup,
    SegmentPointer,
};
pub use generate::{GenerationParams, generate_template};
pub use hierarchy::{SequenceHierarchy, SequenceInstanceId, SubSequenceNode};
pub use instance::RootInstance;
pub use model::{
    Binding, BindingId, BindingKind, CompletionMode, Section, SectionPayload, Sequence,
    SequenceCatalog, SequenceKey, SignatureId, SubSequencePayload, Track, TrackKind,
};
pub use player::{EvaluationContext, ObjectHandle, Operand, PlaybackClient};
pub use preanim::{AnimTypeId, CaptureScope, PreAnimatedState, PreAnimatedToken};
pub use segment::{
    CompileSource, HighPassBlender, NearestHoldBlender, Segment, SegmentBlender, SegmentEntry,
    UnionBlender, compile_segments,
};
pub use store::{InMemoryTemplateStore, TemplateStore};
pub use template::{
    ChildTemplate, EvaluationTemplate, EvaluationTrack, GenerationLedger, TrackIdentifier,
};
pub use tokens::{ExecutionScope, ExecutionToken, ExecutionTokens, TokenScope};
pub use track_compile::{TrackEvaluationField, compile_track_sections};
