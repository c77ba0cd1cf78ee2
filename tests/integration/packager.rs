//! Packager command line.

use assert_cmd::{cargo::cargo_bin_cmd, Command};
use predicates::prelude::*;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use tempfile::TempDir;

fn standalone() -> Command {
    cargo_bin_cmd!("standalone")
}

fn entries(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn help_displays() {
    standalone()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("self-extracting"));
}

#[test]
fn version_displays() {
    standalone()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("standalone"));
}

#[test]
fn missing_argument_exits_1() {
    standalone()
        .assert()
        .code(1)
        .stderr(predicate::str::contains("missing argument"));
}

#[test]
fn unknown_option_exits_1() {
    standalone().arg("--no-such-flag").assert().code(1);
}

#[test]
fn nonexistent_path_exits_1() {
    let temp = TempDir::new().unwrap();
    standalone()
        .current_dir(temp.path())
        .arg("/nonexistent/path/to/binary")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("does not exist"));
    assert!(entries(temp.path()).is_empty());
}

#[test]
fn non_executable_file_exits_1_without_artifact() {
    let temp = TempDir::new().unwrap();
    let data = temp.path().join("data.bin");
    fs::write(&data, b"\x7fELF not really").unwrap();
    fs::set_permissions(&data, fs::Permissions::from_mode(0o644)).unwrap();

    standalone()
        .current_dir(temp.path())
        .arg(&data)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("not executable"));
    assert_eq!(entries(temp.path()), vec!["data.bin"]);
}

#[test]
fn script_exits_1_without_artifact() {
    let temp = TempDir::new().unwrap();
    let script = temp.path().join("run.sh");
    fs::write(&script, "#!/bin/sh\necho hi\n").unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

    // Without `file` installed this is a tooling failure; exit 1 either way
    standalone()
        .current_dir(temp.path())
        .arg(&script)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("error:"));
    assert_eq!(entries(temp.path()), vec!["run.sh"]);
}
