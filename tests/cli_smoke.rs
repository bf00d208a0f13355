use std::path::PathBuf;

use playfield::{
    Curve, FrameNumber, SectionBuilder, Sequence, SequenceBuilder, SequenceKey, TimeRange,
    TrackBuilder,
};

#[derive(serde::Serialize)]
struct CatalogFile {
    root: SequenceKey,
    sequences: Vec<Sequence>,
}

fn playfield_exe() -> PathBuf {
    std::env::var_os("CARGO_BIN_EXE_playfield")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let mut p = PathBuf::from("target").join("debug");
            p.push(if cfg!(windows) {
                "playfield.exe"
            } else {
                "playfield"
            });
            p
        })
}

#[test]
fn cli_compiles_and_evaluates_a_catalog() {
    let dir = PathBuf::from("target").join("cli_smoke");
    std::fs::create_dir_all(&dir).unwrap();
    let catalog_path = dir.join("catalog.json");

    let range = TimeRange::new(FrameNumber(0), FrameNumber(20)).unwrap();
    let root = SequenceBuilder::new("smoke", range)
        .track(
            TrackBuilder::fade("fade")
                .section(SectionBuilder::fade(range, Curve::linear([(0, 0.0), (20, 1.0)])).build())
                .build(),
        )
        .build();
    let file = CatalogFile {
        root: root.key,
        sequences: vec![root],
    };

    let f = std::fs::File::create(&catalog_path).unwrap();
    serde_json::to_writer_pretty(f, &file).unwrap();

    let catalog_arg = catalog_path.to_string_lossy().to_string();
    let status = std::process::Command::new(playfield_exe())
        .args(["compile", "--in", catalog_arg.as_str()])
        .status()
        .unwrap();
    assert!(status.success());

    let output = std::process::Command::new(playfield_exe())
        .args(["evaluate", "--in", catalog_arg.as_str(), "--frame", "10"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("fade = 0.5"), "stdout was: {stdout}");
}
