//! Error types for packaging and for the embedded bootstrap.
//!
//! Packaging failures are `PackError`, artifact run-time failures are
//! `BootstrapError`. Problems that only degrade the artifact (a library
//! that could not be resolved, a missing loader) are not errors at all:
//! see [`crate::resolve::ResolutionWarning`].

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for packaging operations
pub type PackResult<T> = Result<T, PackError>;

/// Result type alias for bootstrap operations
pub type BootstrapResult<T> = Result<T, BootstrapError>;

/// Bad packager input. Always reported before any side effect.
#[derive(Error, Debug)]
pub enum InputError {
    #[error("missing argument: path to an executable")]
    MissingArgument,

    #[error("file does not exist: {}", .0.display())]
    NotFound(PathBuf),

    #[error("file is not executable: {}", .0.display())]
    NotExecutable(PathBuf),

    #[error("not an ELF executable: {} (media type: {media_type})", path.display())]
    NotElf { path: PathBuf, media_type: String },
}

/// Fatal errors raised while building an artifact
#[derive(Error, Debug)]
pub enum PackError {
    #[error(transparent)]
    Input(#[from] InputError),

    /// An external collaborator (`file`, `ldd`, `readelf`) or the archive
    /// codec failed.
    #[error("tooling failure: {0:#}")]
    Tooling(anyhow::Error),

    #[error("content hash of the archive is empty")]
    EmptyHash,

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl PackError {
    /// Wrap an IO error with a short description of what was being done
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Fatal errors raised by the bootstrap embedded in an artifact
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("failed to locate the running executable: {0}")]
    CurrentExe(#[source] std::io::Error),

    #[error("failed to read payload footer: {0}")]
    Footer(#[from] FormatError),

    #[error("no cache directory: neither XDG_CACHE_HOME nor HOME is usable")]
    NoCacheRoot,

    #[error("no viable extraction directory: {0}")]
    TempDir(#[source] std::io::Error),

    #[error("failed to extract payload into {}: {source}", dir.display())]
    Extraction {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("payload is corrupt: expected sha256 {expected}, got {actual}")]
    PayloadHashMismatch { expected: String, actual: String },

    #[error("failed to publish cache entry {}: {source} (extracted files kept in {})", entry.display(), temp.display())]
    Publish {
        entry: PathBuf,
        temp: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cached program is not executable: {}", .0.display())]
    NotExecutable(PathBuf),

    #[error("failed to execute {}: {source}", program.display())]
    Exec {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors decoding the footer and manifest of an artifact
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("file too small to contain a footer")]
    Truncated,

    #[error("invalid magic: expected ELFSTAND")]
    InvalidMagic,

    #[error("unsupported format version: {0}")]
    UnsupportedVersion(u32),

    #[error("footer offsets point outside the file")]
    BadOffsets,
}

impl FormatError {
    /// The file carries no trailer or could not be read, as opposed to a
    /// trailer that is present but damaged.
    ///
    /// A real artifact has to be readable to locate its payload, so an
    /// unreadable executable is never one.
    pub fn is_not_an_artifact(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Truncated | Self::InvalidMagic)
    }
}
