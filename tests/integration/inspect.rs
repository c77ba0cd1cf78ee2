//! Dependency inspection against real system binaries.

use elf_standalone::inspect::{get_library_dependencies, DependencyInspector, Ldd, Readelf};
use elf_standalone::DependencyReport;
use std::path::Path;

use crate::have;

#[test]
fn readelf_finds_libc_in_bin_sh() {
    if !have("readelf") {
        eprintln!("skipping: readelf not installed");
        return;
    }
    // /bin/sh exists on all Linux systems and is usually dynamically linked
    let deps = get_library_dependencies(Path::new("/bin/sh")).unwrap();
    if deps.is_empty() {
        eprintln!("skipping: /bin/sh is static here");
        return;
    }
    assert!(
        deps.iter().any(|d| d.contains("libc")),
        "Expected libc dependency in /bin/sh, got: {:?}",
        deps
    );
}

#[test]
fn readelf_non_elf_file_has_no_deps() {
    if !have("readelf") {
        eprintln!("skipping: readelf not installed");
        return;
    }
    // /etc/passwd is a text file, not an ELF binary
    let deps = get_library_dependencies(Path::new("/etc/passwd")).unwrap();
    assert!(deps.is_empty(), "Expected no deps, got: {:?}", deps);
}

#[test]
fn readelf_sysroot_report_matches_ldd_grammar() {
    if !have("readelf") {
        eprintln!("skipping: readelf not installed");
        return;
    }
    // The host itself as sysroot: every reported library lives under /
    let report = Readelf::new("/", Vec::new())
        .report(Path::new("/bin/sh"))
        .unwrap();
    let parsed = DependencyReport::parse(&report);

    if parsed.not_dynamic {
        return;
    }
    assert!(parsed.libraries.iter().all(|l| l.path.is_absolute()));
    assert!(parsed.virtual_entries.is_empty());
}

#[test]
fn ldd_report_resolves_to_real_files() {
    if !have("ldd") {
        eprintln!("skipping: ldd not installed");
        return;
    }
    let report = Ldd.report(Path::new("/bin/sh")).unwrap();
    let closure = DependencyReport::parse(&report).resolve();

    assert!(closure.libraries.iter().all(|l| l.path.is_file()));
    assert!(!closure.libraries.iter().any(|l| l.name.contains("vdso")));
}
