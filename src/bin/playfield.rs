use std::{
    collections::HashMap,
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};

use playfield::{
    BindingId, FrameNumber, InMemoryTemplateStore, ObjectHandle, PlaybackClient, RootInstance,
    Sequence, SequenceCatalog, SequenceInstanceId, SequenceKey, TemplateStore,
};

#[derive(Parser, Debug)]
#[command(name = "playfield", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile a sequence catalog and print the evaluation field.
    Compile(CompileArgs),
    /// Compile and evaluate one frame against a scripted stage.
    Evaluate(EvaluateArgs),
}

#[derive(Parser, Debug)]
struct CompileArgs {
    /// Input catalog JSON.
    #[arg(long = "in")]
    in_path: PathBuf,
}

#[derive(Parser, Debug)]
struct EvaluateArgs {
    /// Input catalog JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Frame to evaluate.
    #[arg(long)]
    frame: i64,
}

/// On-disk authoring format: a root sequence plus every referenced one.
#[derive(serde::Deserialize)]
struct CatalogFile {
    root: SequenceKey,
    sequences: Vec<Sequence>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Compile(args) => cmd_compile(args),
        Command::Evaluate(args) => cmd_evaluate(args),
    }
}

fn read_catalog(path: &Path) -> anyhow::Result<(SequenceKey, SequenceCatalog)> {
    let f = File::open(path).with_context(|| format!("open catalog '{}'", path.display()))?;
    let file: CatalogFile =
        serde_json::from_reader(BufReader::new(f)).with_context(|| "parse catalog JSON")?;
    let mut catalog = SequenceCatalog::new();
    for sequence in file.sequences {
        catalog.insert(sequence);
    }
    catalog.validate()?;
    Ok((file.root, catalog))
}

fn cmd_compile(args: CompileArgs) -> anyhow::Result<()> {
    let (root, catalog) = read_catalog(&args.in_path)?;
    let mut store = InMemoryTemplateStore::default();
    let template = store.get_compiled_template(root, &catalog)?;

    println!("tracks: {}", template.tracks.len());
    println!("sub-sequences: {}", template.hierarchy.len());
    println!("field entries: {}", template.field.len());
    for index in 0..template.field.len() {
        let range = template.field.range(index);
        let group = template.field.group(index);
        let pointers: usize = group.pointers().count();
        let flushes = group
            .flush_groups
            .iter()
            .filter(|g| g.immediate_flush)
            .count();
        println!(
            "  {:?}: {} pointer(s), {} flush group(s) ({} immediate)",
            range,
            pointers,
            group.flush_groups.len(),
            flushes
        );
    }
    Ok(())
}

fn cmd_evaluate(args: EvaluateArgs) -> anyhow::Result<()> {
    let (root, catalog) = read_catalog(&args.in_path)?;
    let mut store = InMemoryTemplateStore::default();
    let mut stage = ScriptedStage::default();
    let mut instance = RootInstance::new(root);

    instance.initialize(&catalog, &mut store)?;
    instance.evaluate(FrameNumber(args.frame), &catalog, &mut store, &mut stage)?;

    let mut lines: Vec<String> = stage
        .properties
        .iter()
        .map(|((object, property), value)| format!("object {}: {property} = {value}", object.0))
        .collect();
    lines.sort();
    for line in &lines {
        println!("{line}");
    }
    if stage.fade != 0.0 {
        println!("fade = {}", stage.fade);
    }
    println!(
        "{} propert{} set, {} object(s) spawned",
        lines.len(),
        if lines.len() == 1 { "y" } else { "ies" },
        stage.spawned.len()
    );

    instance.finish(&mut stage);
    Ok(())
}

/// A stage that fabricates one object per possessable binding, so any
/// catalog can be evaluated without a real scene graph.
#[derive(Default)]
struct ScriptedStage {
    properties: HashMap<(ObjectHandle, String), f64>,
    spawned: HashMap<(SequenceInstanceId, BindingId), ObjectHandle>,
    fade: f64,
    next_spawn: u64,
}

impl PlaybackClient for ScriptedStage {
    fn locate_objects(
        &self,
        _sequence: SequenceKey,
        binding: BindingId,
        parents: &[ObjectHandle],
    ) -> Vec<ObjectHandle> {
        let base = u64::from_le_bytes(binding.0.as_bytes()[..8].try_into().unwrap_or_default());
        let parent = parents.first().map(|p| p.0).unwrap_or(0);
        vec![ObjectHandle(base.wrapping_add(parent))]
    }

    fn is_object_valid(&self, _object: ObjectHandle) -> bool {
        true
    }

    fn property(&self, object: ObjectHandle, property: &str) -> Option<f64> {
        self.properties
            .get(&(object, property.to_string()))
            .copied()
    }

    fn set_property(&mut self, object: ObjectHandle, property: &str, value: f64) {
        self.properties.insert((object, property.to_string()), value);
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
        let handle = ObjectHandle(SPAWN_BASE + self.next_spawn);
        self.spawned.insert((sequence, binding), handle);
        Some(handle)
    }

    fn destroy_spawned_object(&mut self, sequence: SequenceInstanceId, binding: BindingId) {
        self.spawned.remove(&(sequence, binding));
    }

    fn spawned_object(
        &self,
        sequence: SequenceInstanceId,
        binding: BindingId,
    ) -> Option<ObjectHandle> {
        self.spawned.get(&(sequence, binding)).copied()
    }
}

const SPAWN_BASE: u64 = 1 << 32;
