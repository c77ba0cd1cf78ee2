//! Content-addressed cache of extracted payloads.
//!
//! ```text
//! <cache-root>/standalone_payloads/<binary>-<hash>/
//!     bin/<binary>
//!     lib/<libraries...>, <loader>
//! ```
//!
//! An entry is only ever created by renaming a fully extracted private
//! directory into place, and only ever read after [`CacheEntry::is_valid`].

use std::ffi::OsString;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::format::Manifest;
use crate::stage::{BIN_DIR, LIB_DIR};

/// Directory under the cache root holding every entry.
pub const PAYLOADS_DIR: &str = "standalone_payloads";

/// Resolve the cache root from `XDG_CACHE_HOME` and the home directory.
///
/// The XDG value only counts if it is a non-empty absolute path, as the
/// base directory specification requires.
pub fn cache_root_from(xdg_cache_home: Option<OsString>, home: Option<PathBuf>) -> Option<PathBuf> {
    xdg_cache_home
        .map(PathBuf::from)
        .filter(|p| p.is_absolute())
        .or_else(|| home.map(|h| h.join(".cache")))
}

/// Cache root for the current user.
pub fn cache_root() -> Option<PathBuf> {
    cache_root_from(std::env::var_os("XDG_CACHE_HOME"), dirs::home_dir())
}

/// True if `path` is a regular file with any execute bit set.
pub fn is_executable_file(path: &Path) -> bool {
    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// One cache entry, addressed by binary name and archive hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    dir: PathBuf,
    binary: String,
    loader: Option<String>,
}

impl CacheEntry {
    pub fn new(cache_root: &Path, manifest: &Manifest) -> Self {
        Self {
            dir: cache_root
                .join(PAYLOADS_DIR)
                .join(format!("{}-{}", manifest.binary, manifest.hash)),
            binary: manifest.binary.clone(),
            loader: manifest.loader.clone().filter(|l| !l.is_empty()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Name of the entry directory, `<binary>-<hash>`.
    pub fn name(&self) -> String {
        self.dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// `<cache-root>/standalone_payloads`
    pub fn payloads_dir(&self) -> &Path {
        self.dir.parent().unwrap_or(&self.dir)
    }

    pub fn binary_path(&self) -> PathBuf {
        self.dir.join(BIN_DIR).join(&self.binary)
    }

    pub fn lib_dir(&self) -> PathBuf {
        self.dir.join(LIB_DIR)
    }

    /// Where the loader lives once extracted, if one was bundled.
    pub fn loader_path(&self) -> Option<PathBuf> {
        self.loader.as_ref().map(|l| self.lib_dir().join(l))
    }

    /// An entry is usable iff the binary is present and executable, and
    /// the loader (when one was bundled) is present.
    pub fn is_valid(&self) -> bool {
        is_executable_file(&self.binary_path())
            && self.loader_path().map_or(true, |l| l.is_file())
    }
}
