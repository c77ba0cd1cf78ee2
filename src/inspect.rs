//! External inspection tools: media type detection and dependency reports.
//!
//! The packager never reads ELF headers itself. It asks a
//! [`MediaTypeInspector`] whether a file is an executable and a
//! [`DependencyInspector`] for an `ldd`-style text report, which
//! [`crate::resolve`] then parses.
//!
//! Two dependency inspectors are provided:
//! - [`Ldd`] runs `ldd`, which executes the host dynamic linker. Accurate,
//!   but only works for binaries the host can load.
//! - [`Readelf`] walks `readelf -d` NEEDED entries inside a sysroot and
//!   renders the result in `ldd` format. Works for foreign architectures
//!   since readelf reads the ELF headers directly.

use anyhow::{bail, Context, Result};
use std::collections::{HashSet, VecDeque};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::paths::{basename, find_library, resolve_in_sysroot};

/// Media type reported for non-PIE executables (static or dynamic).
pub const MIME_EXECUTABLE: &str = "application/x-executable";

/// Media type reported for position-independent executables.
pub const MIME_PIE_EXECUTABLE: &str = "application/x-pie-executable";

/// Reports a MIME-like media type for a file.
pub trait MediaTypeInspector {
    fn media_type(&self, path: &Path) -> Result<String>;
}

/// Produces an `ldd`-style dependency report for an executable.
///
/// The report is free-form text; stdout and stderr of the underlying tool
/// are concatenated, since "not a dynamic executable" is a diagnostic.
pub trait DependencyInspector {
    fn report(&self, path: &Path) -> Result<String>;
}

/// `file --brief --mime-type`
#[derive(Debug, Default, Clone, Copy)]
pub struct FileCommand;

impl MediaTypeInspector for FileCommand {
    fn media_type(&self, path: &Path) -> Result<String> {
        let output = Command::new("file")
            .args(["--brief", "--mime-type"])
            .arg(path)
            .output()
            .context("file command not found - install file")?;

        if !output.status.success() {
            bail!(
                "file failed on {}: {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// `ldd <path>`
#[derive(Debug, Default, Clone, Copy)]
pub struct Ldd;

impl DependencyInspector for Ldd {
    fn report(&self, path: &Path) -> Result<String> {
        // ldd exits 1 for static binaries; the exit status carries no
        // information the text doesn't.
        let output = Command::new("ldd")
            .arg(path)
            .output()
            .context("ldd command not found - install libc-bin or glibc-common")?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(text)
    }
}

/// Dependency inspection through `readelf`, resolving libraries inside a
/// sysroot instead of on the host.
#[derive(Debug, Clone)]
pub struct Readelf {
    sysroot: PathBuf,
    extra_lib_paths: Vec<PathBuf>,
}

impl Readelf {
    pub fn new(sysroot: impl Into<PathBuf>, extra_lib_paths: Vec<PathBuf>) -> Self {
        Self {
            sysroot: sysroot.into(),
            extra_lib_paths,
        }
    }
}

impl DependencyInspector for Readelf {
    fn report(&self, path: &Path) -> Result<String> {
        // The recorded interpreter path, paired with the file behind it
        let interpreter = get_interpreter(path)?.map(|interp| {
            let found = resolve_in_sysroot(&self.sysroot, &interp).filter(|p| p.is_file());
            (interp.display().to_string(), found)
        });
        let deps = get_all_dependencies(&self.sysroot, path, &self.extra_lib_paths)?;
        Ok(render_ldd_report(&deps, interpreter.as_ref()))
    }
}

/// Run `readelf` with the given flag, returning stdout.
///
/// Returns `Ok(None)` for files readelf does not recognise as ELF.
fn run_readelf(flag: &str, binary_path: &Path) -> Result<Option<String>> {
    // Check file exists first for a clear error message
    if !binary_path.exists() {
        bail!("File does not exist: {}", binary_path.display());
    }

    let output = Command::new("readelf")
        .arg(flag)
        .arg(binary_path)
        .output()
        .context("readelf command not found - install binutils")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        // These are legitimate "not an ELF" cases, not errors
        if stderr.contains("Not an ELF file")
            || stderr.contains("not a dynamic executable")
            || stderr.contains("File format not recognized")
        {
            return Ok(None);
        }
        bail!(
            "readelf failed on {}: {}",
            binary_path.display(),
            stderr.trim()
        );
    }

    Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()))
}

/// Extract NEEDED library names from an ELF file using `readelf -d`.
///
/// Returns `Ok(Vec::new())` if the file is not an ELF binary.
#[must_use = "library dependencies should be processed"]
pub fn get_library_dependencies(binary_path: &Path) -> Result<Vec<String>> {
    Ok(run_readelf("-d", binary_path)?
        .map(|out| parse_readelf_needed(&out))
        .unwrap_or_default())
}

/// Read the requested program interpreter using `readelf -l`.
pub fn get_interpreter(binary_path: &Path) -> Result<Option<PathBuf>> {
    Ok(run_readelf("-l", binary_path)?.and_then(|out| parse_readelf_interpreter(&out)))
}

/// Parse `readelf -d` output to extract NEEDED library names.
///
/// Example readelf output:
/// ```text
/// Dynamic section at offset 0x2d0e0 contains 28 entries:
///   Tag        Type                         Name/Value
///  0x0000000000000001 (NEEDED)             Shared library: [libtinfo.so.6]
///  0x0000000000000001 (NEEDED)             Shared library: [libc.so.6]
/// ```
pub fn parse_readelf_needed(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| line.contains("(NEEDED)") && line.contains("Shared library:"))
        .filter_map(|line| {
            let start = line.find('[')?;
            let end = line[start..].find(']')? + start;
            Some(line[start + 1..end].to_string())
        })
        .collect()
}

/// Parse `readelf -l` output for the program interpreter.
///
/// ```text
///   INTERP         0x0000000000000318 0x0000000000000318 0x0000000000000318
///       [Requesting program interpreter: /lib64/ld-linux-x86-64.so.2]
/// ```
pub fn parse_readelf_interpreter(output: &str) -> Option<PathBuf> {
    const MARKER: &str = "Requesting program interpreter:";
    output.lines().find_map(|line| {
        let rest = &line[line.find(MARKER)? + MARKER.len()..];
        let end = rest.find(']')?;
        Some(PathBuf::from(rest[..end].trim()))
    })
}

/// Recursively collect library dependencies (including transitive),
/// breadth-first, in discovery order.
///
/// Each entry pairs the NEEDED name with its location inside the sysroot,
/// or `None` when no search path holds it.
pub fn get_all_dependencies(
    sysroot: &Path,
    binary_path: &Path,
    extra_lib_paths: &[PathBuf],
) -> Result<Vec<(String, Option<PathBuf>)>> {
    let mut all_libs = Vec::new();
    let mut seen = HashSet::new();
    let mut to_process = VecDeque::from([binary_path.to_path_buf()]);
    let mut processed = HashSet::new();

    while let Some(path) = to_process.pop_front() {
        if !processed.insert(path.clone()) {
            continue;
        }

        for lib_name in get_library_dependencies(&path)? {
            if seen.insert(lib_name.clone()) {
                // New library - find it and check its dependencies too
                let found = find_library(sysroot, &lib_name, extra_lib_paths);
                if let Some(lib_path) = &found {
                    to_process.push_back(lib_path.clone());
                }
                all_libs.push((lib_name, found));
            }
        }
    }

    Ok(all_libs)
}

/// Render resolved dependencies the way `ldd` prints them.
///
/// Found entries become `name => path` lines, so the name the loader looks
/// up survives even when `path` is a link target with another file name.
/// An interpreter that could not be found is printed by file name only:
/// its recorded absolute path names a host file, not a sysroot one.
pub fn render_ldd_report(
    deps: &[(String, Option<PathBuf>)],
    interpreter: Option<&(String, Option<PathBuf>)>,
) -> String {
    let mut out = String::new();

    if deps.is_empty() && interpreter.is_none() {
        out.push_str("\tnot a dynamic executable\n");
        return out;
    }

    for (name, path) in deps {
        // Writing to a String cannot fail
        let _ = match path {
            Some(path) => writeln!(out, "\t{} => {} (0x0000000000000000)", name, path.display()),
            None => writeln!(out, "\t{} => not found", name),
        };
    }
    match interpreter {
        Some((name, Some(path))) => {
            let _ = writeln!(out, "\t{} => {} (0x0000000000000000)", name, path.display());
        }
        Some((name, None)) => {
            let name = basename(Path::new(name)).unwrap_or_else(|| name.clone());
            let _ = writeln!(out, "\t{} => not found", name);
        }
        None => {}
    }

    out
}
