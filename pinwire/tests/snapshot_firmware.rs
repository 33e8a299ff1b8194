// Snapshot tests: lock generated firmware text to detect unintended changes.
//
// Uses the library API (model_from_json → pipeline::compile) directly.
// Snapshots are managed by `insta` and stored under `pinwire/tests/snapshots/`.
//
// Run `cargo insta review` after intentional output changes to update baselines.

use pinwire::codegen::CodegenOptions;
use pinwire::model::{model_from_json, Model};
use std::path::{Path, PathBuf};

fn project_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .to_path_buf()
}

fn firmware(model: &Model) -> String {
    pinwire::pipeline::compile(model, &CodegenOptions::default())
        .firmware
        .source
}

fn snapshot_demo(name: &str) {
    let path = project_root().join("demos").join(name);
    let text = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("cannot read {}: {}", path.display(), e));
    let model = model_from_json(&text)
        .unwrap_or_else(|e| panic!("invalid graph {}: {}", path.display(), e));
    let source = firmware(&model);
    let snap_name = name.replace('.', "_");
    insta::assert_snapshot!(snap_name, source);
}

// ── Demo graphs ─────────────────────────────────────────────────────────────

#[test]
fn snapshot_blink() {
    snapshot_demo("blink.json");
}

#[test]
fn snapshot_fader() {
    snapshot_demo("fader.json");
}

// ── Edge shapes ─────────────────────────────────────────────────────────────

#[test]
fn snapshot_empty_model() {
    let source = firmware(&Model::new());
    insta::assert_snapshot!("empty_model", source);
}

#[test]
fn snapshot_shared_only() {
    let model = Model::new().create_variable("threshold").unwrap();
    let source = firmware(&model);
    insta::assert_snapshot!("shared_only", source);
}
