//! Tests that drive the built binary end to end.

use std::fs;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use tempfile::TempDir;

fn claude(name: &str) -> String {
    format!(
        r#"{{"name": "{name}", "chat_messages": [
            {{"sender": "human", "text": "Question for {name}"}},
            {{"sender": "assistant", "text": "Answer from {name}"}}
        ]}}"#
    )
}

fn write(path: &Path, body: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
}

/// The binary with no user config file in reach.
fn convert(home: &TempDir) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_chat-export-convert"));
    cmd.current_dir(home.path())
        .env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join(".config"))
        .env_remove("RUST_LOG");
    cmd
}

fn archive_entries(path: &Path) -> Vec<String> {
    let zip = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
    let mut names: Vec<String> = zip.file_names().map(str::to_string).collect();
    names.sort();
    names
}

#[test]
fn same_file_name_in_two_sources_yields_two_documents() {
    let home = TempDir::new().unwrap();
    write(&home.path().join("a/chat.json"), &claude("Alpha"));
    write(&home.path().join("b/chat.json"), &claude("Beta"));

    convert(&home)
        .args(["a", "b", "--dest", "out", "--overwrite"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Done. 2 succeeded, 0 skipped, 0 failed"));

    let first = fs::read_to_string(home.path().join("out/chat.md")).unwrap();
    let second = fs::read_to_string(home.path().join("out/chat-1.md")).unwrap();
    assert!(first.contains("Answer from Alpha"));
    assert!(second.contains("Answer from Beta"));
}

#[test]
fn sources_keep_their_own_subfolders() {
    let home = TempDir::new().unwrap();
    write(&home.path().join("a/2024/chat.json"), &claude("Alpha"));
    write(&home.path().join("b/chat.json"), &claude("Beta"));

    convert(&home)
        .args(["a", "b", "--dest", "out"])
        .assert()
        .success();

    assert!(home.path().join("out/2024/chat.md").is_file());
    assert!(home.path().join("out/chat.md").is_file());
}

#[test]
fn format_src_skips_detection() {
    let home = TempDir::new().unwrap();
    // Roles the detector does not recognize as Claude on their own.
    write(
        &home.path().join("in/legacy.json"),
        r#"{"messages": [{"role": "human", "content": "Hello from the legacy app"}]}"#,
    );

    convert(&home)
        .args(["in", "--dest", "out"])
        .assert()
        .success()
        .stderr(predicate::str::contains("0 succeeded, 1 skipped"));
    assert!(!home.path().join("out/legacy.md").exists());

    convert(&home)
        .args(["in", "--dest", "out", "--format-src", "claude"])
        .assert()
        .success();
    let doc = fs::read_to_string(home.path().join("out/legacy.md")).unwrap();
    assert!(doc.contains("Hello from the legacy app"));
}

#[test]
fn unknown_format_src_is_rejected() {
    let home = TempDir::new().unwrap();
    convert(&home)
        .args(["in", "--format-src", "gemini"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("gemini"));
}

#[test]
fn include_and_exclude_globs_filter_inputs() {
    let home = TempDir::new().unwrap();
    write(&home.path().join("in/keep.json"), &claude("Keep"));
    write(&home.path().join("in/drafts/wip.json"), &claude("Draft"));
    write(&home.path().join("in/other/note.json"), &claude("Other"));

    convert(&home)
        .args(["in", "--dest", "out", "--include", "*.json;drafts/*", "--exclude", "drafts/*"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Done. 2 succeeded"));

    assert!(home.path().join("out/keep.md").is_file());
    assert!(home.path().join("out/other/note.md").is_file());
    assert!(!home.path().join("out/drafts").exists());
}

#[test]
fn run_settings_are_included_by_default() {
    let home = TempDir::new().unwrap();
    let fixture = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/aistudio_example.json");
    fs::create_dir_all(home.path().join("in")).unwrap();
    fs::copy(fixture, home.path().join("in/studio.json")).unwrap();

    convert(&home).args(["in", "--dest", "out"]).assert().success();
    let doc = fs::read_to_string(home.path().join("out/studio.md")).unwrap();
    assert!(doc.contains("## Run settings"));

    convert(&home)
        .args(["in", "--dest", "out", "--overwrite", "--no-run-settings"])
        .assert()
        .success();
    let doc = fs::read_to_string(home.path().join("out/studio.md")).unwrap();
    assert!(!doc.contains("## Run settings"));
}

#[test]
fn archive_holds_only_this_runs_documents() {
    let home = TempDir::new().unwrap();
    write(&home.path().join("in/new.json"), &claude("New"));
    write(&home.path().join("out/old.md"), "left over from last week");

    convert(&home)
        .args(["in", "--dest", "out", "--zip", "--zip-name", "batch"])
        .assert()
        .success();

    assert_eq!(archive_entries(&home.path().join("out/batch.zip")), vec!["new.md"]);
}

#[test]
fn existing_outputs_are_left_out_of_the_archive() {
    let home = TempDir::new().unwrap();
    write(&home.path().join("in/chat.json"), &claude("Chat"));

    convert(&home).args(["in", "--dest", "out"]).assert().success();
    convert(&home)
        .args(["in", "--dest", "out", "--zip"])
        .assert()
        .success()
        .stderr(predicate::str::contains("0 succeeded, 1 skipped"));

    assert!(archive_entries(&home.path().join("out/export.zip")).is_empty());
}
