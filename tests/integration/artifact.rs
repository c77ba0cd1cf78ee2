//! End to end: package a real binary, then run the artifact.

use assert_cmd::{cargo::cargo_bin_cmd, Command};
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command as StdCommand;
use tempfile::TempDir;

use crate::packable;

const ECHO: &str = "/bin/echo";

/// Package /bin/echo into `dir`, returning the artifact path, or `None`
/// when the host cannot package it.
fn package_echo(dir: &Path) -> Option<PathBuf> {
    if !packable(Path::new(ECHO)) {
        eprintln!("skipping: {ECHO} cannot be packaged on this host");
        return None;
    }
    cargo_bin_cmd!("standalone")
        .current_dir(dir)
        .arg(ECHO)
        .assert()
        .success()
        .stdout(predicate::str::contains("Created"));

    let artifact = dir.join("echo_standalone");
    assert!(artifact.is_file());
    Some(artifact)
}

fn run_artifact(artifact: &Path, cache: &Path) -> Command {
    let mut cmd = Command::new(artifact);
    cmd.env("XDG_CACHE_HOME", cache).env_remove("STANDALONE_LOG");
    cmd
}

/// The single cache entry under `cache`.
fn entry_dir(cache: &Path) -> PathBuf {
    let payloads = cache.join("standalone_payloads");
    let entries: Vec<PathBuf> = fs::read_dir(&payloads)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(entries.len(), 1, "expected one entry in {payloads:?}: {entries:?}");
    entries.into_iter().next().unwrap()
}

fn bundled_loader(entry: &Path) -> Option<PathBuf> {
    fs::read_dir(entry.join("lib"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .find(|p| p.file_name().unwrap().to_string_lossy().starts_with("ld-linux"))
}

#[test]
fn arguments_are_forwarded_verbatim() {
    let temp = TempDir::new().unwrap();
    let Some(artifact) = package_echo(temp.path()) else {
        return;
    };
    let cache = temp.path().join("cache");

    run_artifact(&artifact, &cache)
        .args(["a b", "\"quoted\"", "it's", "-x", ""])
        .assert()
        .success()
        .stdout("a b \"quoted\" it's -x \n")
        .stderr("");

    let entry = entry_dir(&cache);
    assert!(entry.file_name().unwrap().to_string_lossy().starts_with("echo-"));
    assert!(entry.join("bin/echo").is_file());
}

#[test]
fn packaging_twice_gives_the_same_cache_key() {
    let temp = TempDir::new().unwrap();
    let Some(first) = package_echo(temp.path()) else {
        return;
    };
    let first_bytes = fs::read(&first).unwrap();
    fs::remove_file(&first).unwrap();
    let second = package_echo(temp.path()).unwrap();

    assert_eq!(first_bytes, fs::read(second).unwrap());
}

#[test]
fn broken_cache_entry_is_re_extracted() {
    let temp = TempDir::new().unwrap();
    let Some(artifact) = package_echo(temp.path()) else {
        return;
    };
    let cache = temp.path().join("cache");

    run_artifact(&artifact, &cache).arg("one").assert().success();
    let entry = entry_dir(&cache);
    let Some(loader) = bundled_loader(&entry) else {
        eprintln!("skipping: no glibc loader bundled on this host");
        return;
    };

    fs::remove_file(&loader).unwrap();
    run_artifact(&artifact, &cache)
        .arg("two")
        .assert()
        .success()
        .stdout("two\n");
    assert!(loader.is_file());
    assert_eq!(entry_dir(&cache), entry);
}

#[test]
fn concurrent_first_runs_both_succeed() {
    let temp = TempDir::new().unwrap();
    let Some(artifact) = package_echo(temp.path()) else {
        return;
    };
    let cache = temp.path().join("cache");

    let handles: Vec<_> = (0..2)
        .map(|i| {
            let artifact = artifact.clone();
            let cache = cache.clone();
            std::thread::spawn(move || {
                StdCommand::new(&artifact)
                    .arg(format!("run{i}"))
                    .env("XDG_CACHE_HOME", &cache)
                    .output()
                    .unwrap()
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let out = handle.join().unwrap();
        assert!(out.status.success(), "run {i} failed: {out:?}");
        assert_eq!(String::from_utf8_lossy(&out.stdout), format!("run{i}\n"));
    }

    let entry = entry_dir(&cache);
    assert!(entry.join("bin/echo").is_file());
    if let Some(loader) = bundled_loader(&entry) {
        assert!(loader.is_file());
    }
}

#[test]
fn unusable_cache_root_exits_1() {
    let temp = TempDir::new().unwrap();
    let Some(artifact) = package_echo(temp.path()) else {
        return;
    };
    // A regular file where the cache root should be
    let cache = temp.path().join("not-a-dir");
    fs::write(&cache, b"").unwrap();
    let tmp = temp.path().join("tmp");
    fs::create_dir(&tmp).unwrap();

    run_artifact(&artifact, &cache)
        .env("TMPDIR", &tmp)
        .arg("never printed")
        .assert()
        .code(1)
        .stdout("")
        .stderr(predicate::str::contains("error:"));
}
