//! Integration tests for the command-line interface
//!
//! Drives the built binary through index, apply, check, verify and list.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

const SAVE: &str = concat!(
    r##"<?xml version="1.0"?><savegame><info><save name="#010" date="1543674469"/><game id="X4" version="710"/></info>"##,
    r#"<player name="Val Selton" money="999910000"></player>"#,
    r#"<components><component class="player"><inventory><ware ware="inv_remotedetonator" amount="2"/></inventory></component></components>"#,
    r#"<factions><faction id="player"><relations><relation faction="argon" relation="0.1"/></relations>"#,
    r#"<account id="[0x79]" amount="999910000"/></faction>"#,
    r#"<faction id="argon"><relations><relation faction="player" relation="0.1"/></relations></faction></factions>"#,
    r#"</savegame>"#
);

/// Helper to create a save and a patch file in a temporary directory
fn setup_test_dir(patches: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("sample.xml"), SAVE).unwrap();
    fs::write(dir.path().join("patches.json"), patches).unwrap();
    dir
}

fn run(args: &[&str], cwd: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_x4-save-patcher"))
        .args(args)
        .current_dir(cwd)
        .env("NO_COLOR", "1")
        .env_remove("X4_SAVE_DIR")
        .output()
        .expect("failed to run x4-save-patcher")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_cli_index_summary() {
    let dir = setup_test_dir("[]");
    let output = run(&["index", "sample.xml"], dir.path());

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("Name: #010"));
    assert!(text.contains("Version: 710"));
    assert!(text.contains("999910000"));
    assert!(text.contains("Val Selton"));
}

#[test]
fn test_cli_index_json() {
    let dir = setup_test_dir("[]");
    let output = run(&["index", "sample.xml", "--json"], dir.path());

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let model: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(model["credits"]["playerMoney"], "999910000");
    assert_eq!(model["inventory"]["player"]["inv_remotedetonator"], 2);
}

#[test]
fn test_cli_apply_writes_default_output_and_backup() {
    let dir = setup_test_dir(
        r#"[{"type": "SetCredits", "value": 5}, {"type": "SetFactionRelation", "factionId": "argon", "repUI": 15}]"#,
    );
    let output = run(
        &["apply", "sample.xml", "--patches", "patches.json"],
        dir.path(),
    );

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("Summary:"));
    assert!(text.contains("credits anchors updated: 1"));
    assert!(text.contains("relations updated: 2"));

    // Plain source, so plain output.
    let edited = fs::read_to_string(dir.path().join("sample.edited.xml")).unwrap();
    assert!(edited.contains(r#"<player name="Val Selton" money="5">"#));
    assert!(edited.contains(r#"<relation faction="argon" relation="0.5"/>"#));
    assert_eq!(
        fs::read_to_string(dir.path().join("sample.xml.backup.xml")).unwrap(),
        SAVE
    );
}

#[test]
fn test_cli_apply_compressed_json_report() {
    let dir = setup_test_dir(r#"[{"type": "SetModifiedFlag", "value": 1}]"#);
    let output = run(
        &[
            "apply",
            "sample.xml",
            "--patches",
            "patches.json",
            "--output",
            "edited.xml.gz",
            "--compress",
            "--no-backup",
            "--json",
        ],
        dir.path(),
    );

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["compressed"], true);
    assert_eq!(report["backupCreated"], false);
    assert_eq!(report["counts"]["modifiedFlagsUpdated"], 1);

    let bytes = fs::read(dir.path().join("edited.xml.gz")).unwrap();
    assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
    assert!(!dir.path().join("sample.xml.backup.xml").exists());
}

#[test]
fn test_cli_apply_reference_failure() {
    let dir = setup_test_dir(
        r#"[{"type": "SetFactionRelation", "factionId": "boron", "repUI": 15}]"#,
    );
    let output = run(
        &["apply", "sample.xml", "--patches", "patches.json", "--no-backup"],
        dir.path(),
    );

    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.contains("✗"));
    assert!(err.contains("boron"));
    assert!(!dir.path().join("sample.edited.xml").exists());
}

#[test]
fn test_cli_check_reports_issues() {
    let dir = setup_test_dir(
        r#"[{"type": "SetCredits", "value": 1}, {"type": "SetModifiedFlag", "value": 7}]"#,
    );
    let output = run(&["check", "--patches", "patches.json"], dir.path());

    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.contains("1 invalid patch(es)"));
    assert!(err.contains("#1"));
    assert!(err.contains("SetModifiedFlag"));
}

#[test]
fn test_cli_check_prints_merged_edits() {
    let dir = setup_test_dir(
        r#"[{"type": "SetCredits", "value": 1}, {"type": "SetCredits", "value": 9}]"#,
    );
    let output = run(&["check", "--patches", "patches.json"], dir.path());

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("2 patch(es) valid"));
    assert!(text.contains(r#""credits": 9"#));
}

#[test]
fn test_cli_verify_idempotent() {
    let dir = setup_test_dir(
        r#"[
            {"type": "SetCredits", "value": 77},
            {"type": "UnlockBlueprintWares", "wares": ["paintmod_0050"]},
            {"type": "AddInventoryItem", "ware": "inv_remotedetonator", "amount": 1}
        ]"#,
    );
    let output = run(
        &["verify", "sample.xml", "--patches", "patches.json"],
        dir.path(),
    );

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("1 cumulative patch(es) skipped"));
    assert!(text.contains("Verified"));
}

#[test]
fn test_cli_list() {
    let dir = setup_test_dir("[]");
    fs::write(dir.path().join("sample.xml.backup.xml"), SAVE).unwrap();
    fs::write(dir.path().join("notes.txt"), "not a save").unwrap();

    let output = run(&["list"], dir.path());
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("sample.xml"));
    assert!(!text.contains("backup"));
    assert!(!text.contains("notes.txt"));

    let empty = TempDir::new().unwrap();
    let output = run(&["list", empty.path().to_str().unwrap()], dir.path());
    assert!(output.status.success());
    assert!(stdout(&output).contains("No .xml or .xml.gz saves found"));
}
