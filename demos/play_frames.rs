use std::collections::HashMap;

use playfield::{
    BindingBuilder, Curve, FrameNumber, InMemoryTemplateStore, ObjectHandle, PlaybackClient,
    RootInstance, SectionBuilder, SequenceBuilder, SequenceCatalog, SequenceInstanceId,
    SequenceKey, TimeRange, TrackBuilder,
};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let range = TimeRange::new(FrameNumber(0), FrameNumber(30))?;
    let hero = BindingBuilder::possessable("hero")
        .track(
            TrackBuilder::property("slide", "x")
                .section(
                    SectionBuilder::property(range, Curve::linear([(0, 0.0), (30, 30.0)])).build(),
                )
                .build(),
        )
        .build();
    let hero_id = hero.id;
    let sequence = SequenceBuilder::new("demo", range).binding(hero).build();
    let root = sequence.key;

    let mut catalog = SequenceCatalog::new();
    catalog.insert(sequence);

    let mut stage = Stage::default();
    stage.objects.insert(ObjectHandle(1), HashMap::new());
    stage.possessed.insert(hero_id, ObjectHandle(1));

    let mut store = InMemoryTemplateStore::default();
    let mut instance = RootInstance::new(root);
    for frame in [0i64, 1, 2, 15, 29, 35] {
        instance.evaluate(FrameNumber(frame), &catalog, &mut store, &mut stage)?;
        println!(
            "frame {frame}: x = {:?}",
            stage.property(ObjectHandle(1), "x")
        );
    }
    instance.finish(&mut stage);

    Ok(())
}

#[derive(Default)]
struct Stage {
    objects: HashMap<ObjectHandle, HashMap<String, f64>>,
    possessed: HashMap<playfield::BindingId, ObjectHandle>,
    fade: f64,
}

impl PlaybackClient for Stage {
    fn locate_objects(
        &self,
        _sequence: SequenceKey,
        binding: playfield::BindingId,
        _parents: &[ObjectHandle],
    ) -> Vec<ObjectHandle> {
        self.possessed.get(&binding).copied().into_iter().collect()
    }

    fn is_object_valid(&self, object: ObjectHandle) -> bool {
        self.objects.contains_key(&object)
    }

    fn property(&self, object: ObjectHandle, property: &str) -> Option<f64> {
        self.objects.get(&object)?.get(property).copied()
    }

    fn set_property(&mut self, object: ObjectHandle, property: &str, value: f64) {
        self.objects
            .entry(object)
            .or_default()
            .insert(property.to_string(), value);
    }

    fn fade(&self) -> f64 {
        self.fade
    }

    fn set_fade(&mut self, alpha: f64) {
        self.fade = alpha;
    }

    fn spawn_object(
        &mut self,
        _sequence: SequenceInstanceId,
        _binding: playfield::BindingId,
    ) -> Option<ObjectHandle> {
        None
    }

    fn destroy_spawned_object(
        &mut self,
        _sequence: SequenceInstanceId,
        _binding: playfield::BindingId,
    ) {
    }

    fn spawned_object(
        &self,
        _sequence: SequenceInstanceId,
        _binding: playfield::BindingId,
    ) -> Option<ObjectHandle> {
        None
    }
}
