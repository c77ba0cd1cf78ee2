//! Library lookup inside a sysroot and file-name helpers.

use std::collections::VecDeque;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Symlinks followed while resolving a single path (Linux `MAXSYMLINKS`).
const MAX_SYMLINKS: usize = 40;

/// Debian/Ubuntu multiarch triples searched under `lib/` and `usr/lib/`.
const MULTIARCH_TRIPLES: &[&str] = &[
    "x86_64-linux-gnu",
    "aarch64-linux-gnu",
    "arm-linux-gnueabihf",
    "i386-linux-gnu",
    "riscv64-linux-gnu",
    "powerpc64le-linux-gnu",
    "s390x-linux-gnu",
];

/// Find a library in standard paths within a sysroot.
///
/// Searches lib64, lib, and the multiarch directories. The `extra_paths`
/// parameter lets callers add search paths relative to the sysroot
/// (e.g. `opt/vendor/lib`); they are searched last.
///
/// Returns the file behind the first hit, resolved with
/// [`resolve_in_sysroot`], or `None` if no search path holds the library.
#[must_use = "found library path should be used"]
pub fn find_library(sysroot: &Path, lib_name: &str, extra_paths: &[PathBuf]) -> Option<PathBuf> {
    let mut candidates = vec![
        Path::new("usr/lib64").join(lib_name),
        Path::new("lib64").join(lib_name),
        Path::new("usr/lib").join(lib_name),
        Path::new("lib").join(lib_name),
    ];

    for triple in MULTIARCH_TRIPLES {
        candidates.push(Path::new("usr/lib").join(triple).join(lib_name));
        candidates.push(Path::new("lib").join(triple).join(lib_name));
    }

    for extra in extra_paths {
        candidates.push(extra.join(lib_name));
    }

    candidates
        .iter()
        .filter_map(|p| resolve_in_sysroot(sysroot, p))
        .find(|p| p.is_file())
}

/// Resolve `path`, as seen from inside the image, to the file it names
/// under `sysroot`.
///
/// Symlinks are followed one at a time. Absolute link targets are re-rooted
/// at the sysroot and `..` never climbs above it, so the result never
/// points into the host filesystem. Returns `None` for missing components,
/// dangling links and link loops.
pub fn resolve_in_sysroot(sysroot: &Path, path: &Path) -> Option<PathBuf> {
    let mut pending = image_components(path);
    let mut resolved: Vec<OsString> = Vec::new();
    let mut links = 0;

    while let Some(part) = pending.pop_front() {
        if part == ".." {
            resolved.pop();
            continue;
        }

        let candidate = rooted(sysroot, &resolved).join(&part);
        let meta = fs::symlink_metadata(&candidate).ok()?;
        if !meta.file_type().is_symlink() {
            resolved.push(part);
            continue;
        }

        links += 1;
        if links > MAX_SYMLINKS {
            return None;
        }
        let target = fs::read_link(&candidate).ok()?;
        if target.has_root() {
            resolved.clear();
        }
        for c in image_components(&target).into_iter().rev() {
            pending.push_front(c);
        }
    }

    Some(rooted(sysroot, &resolved))
}

/// Path components with the root dropped and `.` elided; `..` is kept.
fn image_components(path: &Path) -> VecDeque<OsString> {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_os_string()),
            Component::ParentDir => Some(OsString::from("..")),
            Component::RootDir | Component::CurDir | Component::Prefix(_) => None,
        })
        .collect()
}

fn rooted(sysroot: &Path, parts: &[OsString]) -> PathBuf {
    parts.iter().fold(sysroot.to_path_buf(), |p, c| p.join(c))
}

/// Final path component as an owned string, lossily converted.
///
/// Returns `None` for paths without a file name (`/`, `..`).
pub fn basename(path: &Path) -> Option<String> {
    path.file_name()
        .map(OsStr::to_string_lossy)
        .map(|s| s.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_mock_sysroot(sysroot: &Path) {
        let dirs = [
            "usr/lib64",
            "lib64",
            "usr/lib",
            "lib",
            "usr/lib/aarch64-linux-gnu",
        ];
        for dir in dirs {
            fs::create_dir_all(sysroot.join(dir)).unwrap();
        }
    }

    #[test]
    fn test_find_library_lib64() {
        let temp = TempDir::new().unwrap();
        let sysroot = temp.path();
        create_mock_sysroot(sysroot);

        let lib = sysroot.join("lib64/libfoo.so.1");
        fs::write(&lib, b"\x7fELF").unwrap();

        assert_eq!(find_library(sysroot, "libfoo.so.1", &[]), Some(lib));
    }

    #[test]
    fn test_find_library_multiarch() {
        let temp = TempDir::new().unwrap();
        let sysroot = temp.path();
        create_mock_sysroot(sysroot);

        let lib = sysroot.join("usr/lib/aarch64-linux-gnu/libc.so.6");
        fs::write(&lib, b"\x7fELF").unwrap();

        assert_eq!(find_library(sysroot, "libc.so.6", &[]), Some(lib));
    }

    #[test]
    fn test_find_library_search_order() {
        let temp = TempDir::new().unwrap();
        let sysroot = temp.path();
        create_mock_sysroot(sysroot);

        // Present in both usr/lib64 and lib: usr/lib64 wins
        let preferred = sysroot.join("usr/lib64/libdup.so");
        fs::write(&preferred, b"a").unwrap();
        fs::write(sysroot.join("lib/libdup.so"), b"b").unwrap();

        assert_eq!(find_library(sysroot, "libdup.so", &[]), Some(preferred));
    }

    #[test]
    fn test_find_library_extra_paths() {
        let temp = TempDir::new().unwrap();
        let sysroot = temp.path();
        fs::create_dir_all(sysroot.join("opt/vendor/lib")).unwrap();
        let lib = sysroot.join("opt/vendor/lib/libvendor.so");
        fs::write(&lib, b"v").unwrap();

        assert_eq!(find_library(sysroot, "libvendor.so", &[]), None);
        // Absolute and relative extra paths are both rooted at the sysroot
        assert_eq!(
            find_library(sysroot, "libvendor.so", &[PathBuf::from("/opt/vendor/lib")]),
            Some(lib.clone())
        );
        assert_eq!(
            find_library(sysroot, "libvendor.so", &[PathBuf::from("opt/vendor/lib")]),
            Some(lib)
        );
    }

    #[test]
    fn test_find_library_ignores_directories() {
        let temp = TempDir::new().unwrap();
        let sysroot = temp.path();
        fs::create_dir_all(sysroot.join("lib/libweird.so")).unwrap();

        assert_eq!(find_library(sysroot, "libweird.so", &[]), None);
    }

    #[test]
    fn test_find_library_absolute_link_stays_in_sysroot() {
        let temp = TempDir::new().unwrap();
        let sysroot = temp.path();
        create_mock_sysroot(sysroot);

        // Debian-style absolute link whose target only exists in the sysroot
        let real = sysroot.join("opt/only-in-sysroot/libfoo.so.1.2.3");
        fs::create_dir_all(real.parent().unwrap()).unwrap();
        fs::write(&real, b"sysroot bytes").unwrap();
        std::os::unix::fs::symlink(
            "/opt/only-in-sysroot/libfoo.so.1.2.3",
            sysroot.join("lib/libfoo.so.1"),
        )
        .unwrap();

        assert_eq!(find_library(sysroot, "libfoo.so.1", &[]), Some(real));
    }

    #[test]
    fn test_find_library_never_reads_host_files() {
        let temp = TempDir::new().unwrap();
        let sysroot = temp.path();
        create_mock_sysroot(sysroot);

        // Target exists on the host but not in the sysroot
        std::os::unix::fs::symlink("/etc/passwd", sysroot.join("lib/libbar.so.1")).unwrap();
        std::os::unix::fs::symlink("../../../../../etc/passwd", sysroot.join("lib/libbaz.so.1"))
            .unwrap();

        assert_eq!(find_library(sysroot, "libbar.so.1", &[]), None);
        assert_eq!(find_library(sysroot, "libbaz.so.1", &[]), None);
    }

    #[test]
    fn test_resolve_in_sysroot_follows_directory_links() {
        let temp = TempDir::new().unwrap();
        let sysroot = temp.path();
        fs::create_dir_all(sysroot.join("usr/lib/x86_64-linux-gnu")).unwrap();
        let loader = sysroot.join("usr/lib/x86_64-linux-gnu/ld-linux-x86-64.so.2");
        fs::write(&loader, b"LD").unwrap();
        // merged-/usr: lib64 -> usr/lib64 is absolute, the loader link is too
        std::os::unix::fs::symlink("/usr/lib64", sysroot.join("lib64")).unwrap();
        fs::create_dir_all(sysroot.join("usr/lib64")).unwrap();
        std::os::unix::fs::symlink(
            "/lib/x86_64-linux-gnu/ld-linux-x86-64.so.2",
            sysroot.join("usr/lib64/ld-linux-x86-64.so.2"),
        )
        .unwrap();
        std::os::unix::fs::symlink("usr/lib", sysroot.join("lib")).unwrap();

        assert_eq!(
            resolve_in_sysroot(sysroot, Path::new("/lib64/ld-linux-x86-64.so.2")),
            Some(loader)
        );
    }

    #[test]
    fn test_resolve_in_sysroot_rejects_loops_and_dangling_links() {
        let temp = TempDir::new().unwrap();
        let sysroot = temp.path();
        fs::create_dir_all(sysroot.join("lib")).unwrap();
        std::os::unix::fs::symlink("libloop.b", sysroot.join("lib/libloop.a")).unwrap();
        std::os::unix::fs::symlink("libloop.a", sysroot.join("lib/libloop.b")).unwrap();
        std::os::unix::fs::symlink("libgone.so.1.0", sysroot.join("lib/libgone.so.1")).unwrap();

        assert_eq!(resolve_in_sysroot(sysroot, Path::new("lib/libloop.a")), None);
        assert_eq!(resolve_in_sysroot(sysroot, Path::new("lib/libgone.so.1")), None);
        assert_eq!(resolve_in_sysroot(sysroot, Path::new("/no/such/file")), None);
    }

    #[test]
    fn test_basename() {
        assert_eq!(basename(Path::new("/usr/bin/ls")).as_deref(), Some("ls"));
        assert_eq!(basename(Path::new("/")), None);
    }
}
