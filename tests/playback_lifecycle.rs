//! Whole-pipeline playback: begin/end lifecycle balance, pre-animated
//! restore, spawn flush ordering, and evaluation determinism.

mod common;

use common::MockStage;
use playfield::{
    BindingBuilder, CompletionMode, Curve, FrameNumber, InMemoryTemplateStore, ObjectHandle,
    RootInstance, SectionBuilder, Sequence, SequenceBuilder, SequenceCatalog, TimeRange,
    TrackBuilder,
};

fn f(v: i64) -> FrameNumber {
    FrameNumber(v)
}

fn r(a: i64, b: i64) -> TimeRange {
    TimeRange::new(f(a), f(b)).unwrap()
}

fn catalog_of(sequences: impl IntoIterator<Item = Sequence>) -> SequenceCatalog {
    let mut catalog = SequenceCatalog::new();
    for sequence in sequences {
        catalog.insert(sequence);
    }
    catalog.validate().unwrap();
    catalog
}

#[test]
fn entity_active_across_frames_begins_and_ends_once() {
    let binding = BindingBuilder::spawnable("ghost")
        .track(
            TrackBuilder::spawn("spawn")
                .section(SectionBuilder::spawn(r(0, 10)).build())
                .build(),
        )
        .build();
    let root = SequenceBuilder::new("root", r(0, 20)).binding(binding).build();
    let root_key = root.key;
    let catalog = catalog_of([root]);

    let mut store = InMemoryTemplateStore::default();
    let mut stage = MockStage::new();
    let mut instance = RootInstance::new(root_key);

    instance.evaluate(f(3), &catalog, &mut store, &mut stage).unwrap();
    assert_eq!(stage.spawn_count, 1);
    assert_eq!(stage.spawned.len(), 1);

    // Still active: no second spawn.
    instance.evaluate(f(8), &catalog, &mut store, &mut stage).unwrap();
    assert_eq!(stage.spawn_count, 1);

    instance.finish(&mut stage);
    assert_eq!(stage.destroy_count, 1);
    assert!(stage.spawned.is_empty());
}

#[test]
fn restore_state_rolls_back_on_teardown_keep_state_sticks() {
    let restored = BindingBuilder::possessable("restored")
        .track(
            TrackBuilder::property("x", "x")
                .section(SectionBuilder::property(r(0, 5), Curve::constant(7.0)).build())
                .build(),
        )
        .build();
    let kept = BindingBuilder::possessable("kept")
        .track(
            TrackBuilder::property("y", "y")
                .completion(CompletionMode::KeepState)
                .section(SectionBuilder::property(r(0, 5), Curve::constant(9.0)).build())
                .build(),
        )
        .build();
    let restored_id = restored.id;
    let kept_id = kept.id;
    let root = SequenceBuilder::new("root", r(0, 20))
        .binding(restored)
        .binding(kept)
        .build();
    let root_key = root.key;
    let catalog = catalog_of([root]);

    let mut stage = MockStage::new();
    let h1 = ObjectHandle(1);
    let h2 = ObjectHandle(2);
    stage.possess(restored_id, h1);
    stage.possess(kept_id, h2);
    stage.set_prop(h1, "x", 1.0);
    stage.set_prop(h2, "y", 2.0);

    let mut store = InMemoryTemplateStore::default();
    let mut instance = RootInstance::new(root_key);

    instance.evaluate(f(2), &catalog, &mut store, &mut stage).unwrap();
    assert_eq!(stage.prop(h1, "x"), Some(7.0));
    assert_eq!(stage.prop(h2, "y"), Some(9.0));

    // Past the sections: everything tears down; only the restore-state
    // track rolls its property back.
    instance.evaluate(f(7), &catalog, &mut store, &mut stage).unwrap();
    assert_eq!(stage.prop(h1, "x"), Some(1.0));
    assert_eq!(stage.prop(h2, "y"), Some(9.0));

    instance.finish(&mut stage);
    assert_eq!(stage.prop(h2, "y"), Some(9.0));

    // Explicit full rollback restores global captures too.
    instance.restore_pre_animated_state(&mut stage);
    assert_eq!(stage.prop(h2, "y"), Some(2.0));
}

#[test]
fn spawned_object_is_visible_to_later_groups_in_the_same_frame() {
    let binding = BindingBuilder::spawnable("ghost")
        .track(
            TrackBuilder::spawn("spawn")
                .section(SectionBuilder::spawn(r(0, 10)).build())
                .build(),
        )
        .track(
            TrackBuilder::property("x", "x")
                .section(SectionBuilder::property(r(0, 10), Curve::constant(4.0)).build())
                .build(),
        )
        .build();
    let root = SequenceBuilder::new("root", r(0, 20)).binding(binding).build();
    let root_key = root.key;
    let catalog = catalog_of([root]);

    let mut store = InMemoryTemplateStore::default();
    let mut stage = MockStage::new();
    let mut instance = RootInstance::new(root_key);

    // The spawn group flushes immediately, so the property token (a later
    // group, applied at end of frame) resolves the freshly spawned object.
    instance.evaluate(f(1), &catalog, &mut store, &mut stage).unwrap();
    let spawned = *stage.spawned.values().next().expect("object spawned");
    assert_eq!(stage.prop(spawned, "x"), Some(4.0));
}

#[test]
fn nearest_hold_track_clamps_evaluation_past_its_last_section() {
    let binding = BindingBuilder::possessable("cam")
        .track(
            TrackBuilder::property("cut", "cut")
                .evaluate_nearest()
                .section(
                    SectionBuilder::property(r(0, 10), Curve::linear([(0, 0.0), (10, 10.0)]))
                        .build(),
                )
                .build(),
        )
        .build();
    let binding_id = binding.id;
    let root = SequenceBuilder::new("root", r(0, 40)).binding(binding).build();
    let root_key = root.key;
    let catalog = catalog_of([root]);

    let mut stage = MockStage::new();
    let handle = ObjectHandle(1);
    stage.possess(binding_id, handle);

    let mut store = InMemoryTemplateStore::default();
    let mut instance = RootInstance::new(root_key);

    // Query far past the section: the hold segment forces frame 10.
    instance.evaluate(f(25), &catalog, &mut store, &mut stage).unwrap();
    assert_eq!(stage.prop(handle, "cut"), Some(10.0));
}

#[test]
fn leaving_a_sub_sequence_notifies_expiry_once() {
    let child = SequenceBuilder::new("child", r(0, 10))
        .track(
            TrackBuilder::fade("fade")
                .section(SectionBuilder::fade(r(0, 10), Curve::constant(0.8)).build())
                .build(),
        )
        .build();
    let child_key = child.key;
    let root = SequenceBuilder::new("root", r(0, 40))
        .track(
            TrackBuilder::sub_sequence("shot")
                .section(SectionBuilder::sub_sequence(r(0, 10), child_key, 0, 1.0).build())
                .build(),
        )
        .build();
    let root_key = root.key;
    let catalog = catalog_of([child, root]);

    let mut store = InMemoryTemplateStore::default();
    let mut stage = MockStage::new();
    let mut instance = RootInstance::new(root_key);

    instance.evaluate(f(5), &catalog, &mut store, &mut stage).unwrap();
    assert_eq!(stage.fade, 0.8);
    assert!(stage.expired.is_empty());

    instance.evaluate(f(15), &catalog, &mut store, &mut stage).unwrap();
    assert_eq!(stage.expired.len(), 1);
    // Fade was restore-state: back to the default on teardown.
    assert_eq!(stage.fade, 0.0);

    instance.finish(&mut stage);
    assert_eq!(stage.expired.len(), 1);
}

#[test]
fn repeated_playback_reaches_the_same_state() {
    let binding = BindingBuilder::possessable("hero")
        .track(
            TrackBuilder::property("front", "x")
                .eval_priority(10)
                .section(
                    SectionBuilder::property(r(0, 20), Curve::linear([(0, 0.0), (20, 20.0)]))
                        .build(),
                )
                .build(),
        )
        .track(
            TrackBuilder::property("back", "x")
                .section(SectionBuilder::property(r(5, 15), Curve::constant(100.0)).build())
                .build(),
        )
        .build();
    let binding_id = binding.id;
    let root = SequenceBuilder::new("root", r(0, 40)).binding(binding).build();
    let root_key = root.key;
    let catalog = catalog_of([root]);

    let run = || {
        let mut store = InMemoryTemplateStore::default();
        let mut stage = MockStage::new();
        stage.possess(binding_id, ObjectHandle(1));
        stage.set_prop(ObjectHandle(1), "x", -1.0);
        let mut instance = RootInstance::new(root_key);
        let mut trace = Vec::new();
        for frame in [0, 3, 7, 12, 18, 25] {
            instance.evaluate(f(frame), &catalog, &mut store, &mut stage).unwrap();
            trace.push(stage.prop(ObjectHandle(1), "x"));
        }
        instance.finish(&mut stage);
        trace.push(stage.prop(ObjectHandle(1), "x"));
        trace
    };

    let first = run();
    let second = run();
    assert_eq!(first, second);

    // Both tracks write "x" while overlapped; the higher evaluation
    // priority runs first, so the lower-priority write lands last.
    assert_eq!(first[2], Some(100.0));
    // After teardown the original value is back.
    assert_eq!(*first.last().unwrap(), Some(-1.0));
}
