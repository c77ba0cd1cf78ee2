//! Dependency closure resolution.
//!
//! An `ldd`-style report is parsed line by line into a [`DependencyReport`]
//! using a small fixed grammar:
//!
//! ```text
//! resolved     libfoo.so.1 => /usr/lib/libfoo.so.1 (0x00007f...)
//! unresolved   libbar.so.2 => not found
//! virtual      linux-vdso.so.1 (0x00007ffd...)
//! interpreter  /lib64/ld-linux-x86-64.so.2 (0x00007f...)
//! not dynamic  not a dynamic executable | statically linked
//! ```
//!
//! Independently of the line kind, the first absolute-path token whose file
//! name contains `ld-linux` and `.so` is taken as the dynamic loader. Some
//! static-PIE binaries print the "not dynamic" marker and still name an
//! interpreter, so loader detection runs regardless.
//!
//! A resolved line names two things: the file name the loader looks up (left)
//! and the file holding the bytes (right). They usually agree, but a sysroot
//! lookup that followed `libz.so.1 -> libz.so.1.2.13` reports the target, and
//! the copy must still be staged as `libz.so.1`.
//!
//! [`DependencyReport::resolve`] then checks every path against the
//! filesystem and yields the [`Closure`] that gets staged.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{PackError, PackResult};
use crate::inspect::DependencyInspector;
use crate::paths::basename;

const NOT_DYNAMIC_MARKERS: &[&str] = &["not a dynamic executable", "statically linked"];

/// Classification of a single report line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportLine<'a> {
    Resolved { name: &'a str, path: &'a Path },
    Unresolved { name: &'a str },
    Virtual { name: &'a str },
    Interpreter(&'a Path),
    NotDynamic,
    Other,
}

impl<'a> ReportLine<'a> {
    pub fn classify(line: &'a str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Other;
        }
        if NOT_DYNAMIC_MARKERS.iter().any(|m| line.contains(m)) {
            return Self::NotDynamic;
        }

        if let Some((name, rest)) = line.split_once("=>") {
            let name = name.trim();
            let target = rest.split_whitespace().next().unwrap_or("");
            if target.starts_with('/') {
                return Self::Resolved {
                    name,
                    path: Path::new(target),
                };
            }
            // Older glibc prints the vDSO as `linux-gate.so.1 =>  (0x...)`
            if target.starts_with("(0x") {
                return Self::Virtual { name };
            }
            return Self::Unresolved { name };
        }

        let first = line.split_whitespace().next().unwrap_or("");
        let has_address = line.contains("(0x");
        if first.starts_with('/') && has_address {
            Self::Interpreter(Path::new(first))
        } else if has_address {
            Self::Virtual { name: first }
        } else {
            Self::Other
        }
    }
}

/// True if `name` is the file name of a glibc dynamic loader.
pub fn is_loader_name(name: &str) -> bool {
    name.contains("ld-linux") && name.contains(".so")
}

/// True if `token` is an absolute path naming a glibc dynamic loader.
pub fn is_loader_path(token: &str) -> bool {
    if !token.starts_with('/') {
        return false;
    }
    is_loader_name(token.rsplit('/').next().unwrap_or(token))
}

/// A file to bundle in `lib/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Library {
    /// File name inside `lib/`
    pub name: String,
    /// File whose bytes are copied
    pub path: PathBuf,
}

impl Library {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// Library staged under the file name of `path`.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            name: basename(&path).unwrap_or_default(),
            path,
        }
    }

    /// Library for a resolved line: named after the left column when it
    /// has a file name, after `path` otherwise.
    fn from_mapping(name: &str, path: &Path) -> Self {
        match basename(Path::new(name)) {
            Some(name) if !name.is_empty() => Self::new(name, path),
            _ => Self::from_path(path),
        }
    }
}

/// Structured form of a dependency report, before touching the filesystem.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyReport {
    /// Resolved libraries, deduplicated by path, in report order
    pub libraries: Vec<Library>,
    /// Names reported as `not found`
    pub unresolved: Vec<String>,
    /// Entries without an on-disk path (vDSO and friends)
    pub virtual_entries: Vec<String>,
    /// First entry matching the loader naming pattern
    pub loader: Option<Library>,
    /// The report carried a "not a dynamic executable" marker
    pub not_dynamic: bool,
}

impl DependencyReport {
    pub fn parse(text: &str) -> Self {
        let mut report = Self::default();
        let mut seen = HashSet::new();

        for line in text.lines() {
            match ReportLine::classify(line) {
                ReportLine::Resolved { name, path } => {
                    let lib = Library::from_mapping(name, path);
                    if report.loader.is_none()
                        && (is_loader_name(&lib.name) || is_loader_path(&path.to_string_lossy()))
                    {
                        report.loader = Some(lib.clone());
                    }
                    if seen.insert(path) {
                        report.libraries.push(lib);
                    }
                    continue;
                }
                ReportLine::Unresolved { name } => report.unresolved.push(name.to_string()),
                ReportLine::Virtual { name } => report.virtual_entries.push(name.to_string()),
                ReportLine::NotDynamic => report.not_dynamic = true,
                ReportLine::Interpreter(_) | ReportLine::Other => {}
            }

            if report.loader.is_none() {
                report.loader = line
                    .split_whitespace()
                    .find(|token| is_loader_path(token))
                    .map(Library::from_path);
            }
        }

        report
    }

    /// Check every reported path against the filesystem.
    ///
    /// Paths that are not regular files are skipped with a trace line.
    /// When the report is flagged "not dynamic", the library set is empty
    /// but the loader is still honoured.
    pub fn resolve(&self) -> Closure {
        let mut closure = Closure {
            confidently_static: self.not_dynamic,
            ..Closure::default()
        };

        closure.loader = match &self.loader {
            Some(loader) if loader.path.is_file() => Some(loader.clone()),
            Some(loader) => {
                closure
                    .warnings
                    .push(ResolutionWarning::LoaderMissing(loader.path.clone()));
                None
            }
            None => None,
        };

        for name in &self.unresolved {
            closure
                .warnings
                .push(ResolutionWarning::Unresolved(name.clone()));
        }

        if !self.not_dynamic {
            let mut by_name: HashMap<&str, &Path> = HashMap::new();
            for lib in &self.libraries {
                if !lib.path.is_file() || lib.name.is_empty() {
                    info!("Skipping {} (not a regular file)", lib.path.display());
                    closure.skipped.push(lib.path.clone());
                    continue;
                }
                // The loader is staged on its own
                let is_loader = closure
                    .loader
                    .as_ref()
                    .is_some_and(|l| l.name == lib.name || l.path == lib.path);
                if is_loader {
                    debug!("{} is the loader", lib.path.display());
                    continue;
                }
                if let Some(kept) = by_name.get(lib.name.as_str()) {
                    closure.warnings.push(ResolutionWarning::DuplicateName {
                        kept: kept.to_path_buf(),
                        dropped: lib.path.clone(),
                    });
                    continue;
                }
                by_name.insert(&lib.name, &lib.path);
                closure.libraries.push(lib.clone());
            }
        }

        for name in &self.virtual_entries {
            debug!("Skipping virtual entry {}", name);
        }

        if !self.not_dynamic && closure.libraries.is_empty() && closure.loader.is_none() {
            closure.warnings.push(ResolutionWarning::NothingFound);
        }

        closure
    }
}

/// The set of files to bundle next to the executable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Closure {
    /// Libraries to copy into `lib/`, unique by name
    pub libraries: Vec<Library>,
    /// Reported paths with no regular file behind them
    pub skipped: Vec<PathBuf>,
    /// Dynamic loader to copy into `lib/`
    pub loader: Option<Library>,
    /// The inspector said "not a dynamic executable"
    pub confidently_static: bool,
    pub warnings: Vec<ResolutionWarning>,
}

impl Closure {
    /// File name the loader will have once staged.
    pub fn loader_name(&self) -> Option<&str> {
        self.loader.as_ref().map(|l| l.name.as_str())
    }
}

/// Something expected was not found. Packaging continues with a degraded
/// artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionWarning {
    Unresolved(String),
    LoaderMissing(PathBuf),
    DuplicateName { kept: PathBuf, dropped: PathBuf },
    NothingFound,
}

impl fmt::Display for ResolutionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unresolved(name) => write!(f, "library {} could not be resolved", name),
            Self::LoaderMissing(path) => {
                write!(f, "loader {} is not a regular file", path.display())
            }
            Self::DuplicateName { kept, dropped } => write!(
                f,
                "{} has the same file name as {}, keeping the latter",
                dropped.display(),
                kept.display()
            ),
            Self::NothingFound => write!(
                f,
                "no libraries or loader found; the artifact will exec the binary directly"
            ),
        }
    }
}

/// Run the inspector on `binary` and resolve the closure.
pub fn resolve_dependencies(inspector: &dyn DependencyInspector, binary: &Path) -> PackResult<Closure> {
    let text = inspector.report(binary).map_err(PackError::Tooling)?;
    debug!("Dependency report for {}:\n{}", binary.display(), text.trim_end());
    Ok(DependencyReport::parse(&text).resolve())
}
