//! CLI integration tests: run the knit-weaver binary to cover main.rs branches.
//! Uses CARGO_BIN_EXE_knit-weaver when set (e.g. by `cargo test`).

mod common;

use std::path::PathBuf;
use std::process::Command;

use common::fixtures::{ClassBuilder, encode, encode_with, entry_name, store_and_consumer};
use knit_weaver::adapters::kcls::KclsCodec;

fn bin() -> Option<PathBuf> {
    std::env::var_os("CARGO_BIN_EXE_knit-weaver")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("CARGO_BIN_EXE_knit_weaver").map(PathBuf::from))
}

fn program_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for model in store_and_consumer(&[]) {
        let path = dir.path().join("in").join(entry_name(&model.name));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, encode(&model)).unwrap();
    }
    dir
}

#[test]
fn test_cli_help_succeeds() {
    let Some(bin) = bin() else {
        eprintln!("Skipping CLI test: CARGO_BIN_EXE not set");
        return;
    };
    let out = Command::new(bin).arg("--help").output().expect("run --help");
    assert!(
        out.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("knit-weaver"));
    assert!(stdout.contains("weave"));
    assert!(stdout.contains("inspect"));
}

#[test]
fn test_cli_weave_prints_report() {
    let Some(bin) = bin() else {
        eprintln!("Skipping CLI test: CARGO_BIN_EXE not set");
        return;
    };
    let dir = program_dir();
    let out = Command::new(&bin)
        .current_dir(dir.path())
        .args(["weave", "-i", "in", "-o", "out", "--dump", "dump.json", "-j", "2"])
        .output()
        .expect("run weave");
    assert!(
        out.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&out.stderr)
    );

    let report: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(report["classes"], 3);
    assert_eq!(report["sites_rewritten"], 1);
    assert!(dir.path().join("out/app/Consumer.class").exists());
    assert!(dir.path().join("dump.json").exists());
}

#[test]
fn test_cli_weave_reads_config_file() {
    let Some(bin) = bin() else {
        eprintln!("Skipping CLI test: CARGO_BIN_EXE not set");
        return;
    };
    let dir = program_dir();
    std::fs::write(
        dir.path().join("knit.toml"),
        "inputs = [\"in\"]\noutput = \"configured\"\n",
    )
    .unwrap();
    let out = Command::new(&bin)
        .current_dir(dir.path())
        .arg("weave")
        .output()
        .expect("run weave");
    assert!(
        out.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    assert!(dir.path().join("configured/app/Store.class").exists());
}

#[test]
fn test_cli_weave_without_inputs_fails() {
    let Some(bin) = bin() else {
        eprintln!("Skipping CLI test: CARGO_BIN_EXE not set");
        return;
    };
    let dir = tempfile::tempdir().unwrap();
    let out = Command::new(&bin)
        .current_dir(dir.path())
        .arg("weave")
        .output()
        .expect("run weave");
    assert!(!out.status.success());
}

#[test]
fn test_cli_inspect_prints_class() {
    let Some(bin) = bin() else {
        eprintln!("Skipping CLI test: CARGO_BIN_EXE not set");
        return;
    };
    let dir = program_dir();
    let out = Command::new(&bin)
        .arg("inspect")
        .arg(dir.path().join("in/app/Consumer.class"))
        .output()
        .expect("run inspect");
    assert!(out.status.success());

    let json: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(json["class"]["name"], "app/Consumer");
}

#[test]
fn test_cli_inspect_detects_kcls() {
    let Some(bin) = bin() else {
        eprintln!("Skipping CLI test: CARGO_BIN_EXE not set");
        return;
    };
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Plain.class");
    let model = ClassBuilder::new("app/Plain").constructor(&[]).build();
    std::fs::write(&path, encode_with(&KclsCodec, &model)).unwrap();

    let out = Command::new(&bin).arg("inspect").arg(&path).output().expect("run inspect");
    assert!(out.status.success());
    let json: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(json["class"]["name"], "app/Plain");

    std::fs::write(&path, b"not a class").unwrap();
    let out = Command::new(&bin).arg("inspect").arg(&path).output().expect("run inspect");
    assert!(!out.status.success());
}

#[test]
fn test_cli_diff_prints_feed() {
    let Some(bin) = bin() else {
        eprintln!("Skipping CLI test: CARGO_BIN_EXE not set");
        return;
    };
    let dir = tempfile::tempdir().unwrap();
    let previous = dir.path().join("a.json");
    let current = dir.path().join("b.json");
    std::fs::write(&previous, "{}").unwrap();
    std::fs::write(
        &current,
        r#"{"app.Store": {"parent": ["java.lang.Object"], "providers": []}}"#,
    )
    .unwrap();

    let out = Command::new(&bin)
        .arg("diff")
        .arg(&previous)
        .arg(&current)
        .output()
        .expect("run diff");
    assert!(out.status.success());
    let feed: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(feed["app.Store"]["status"], "added");
}
