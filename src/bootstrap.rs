//! Run-time side of an artifact: make sure the payload is extracted, then
//! hand over to [`crate::launch`].
//!
//! ```text
//! CACHE_CHECK ──valid──────────────────────────────┐
//!      │                                           v
//!      └─invalid─> EXTRACT (private temp dir) ─> PUBLISH (rename) ─> LAUNCH
//! ```
//!
//! No locks are taken. Concurrent first runs each extract into their own
//! temporary directory; publishing is a single `rename`, so readers see
//! either no entry or a complete one. The loser of a publish race discards
//! its copy and uses the winner's.

use std::convert::Infallible;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

use crate::archive::{sha256_hex, unpack};
use crate::cache::{cache_root, CacheEntry};
use crate::error::{BootstrapError, BootstrapResult};
use crate::format::Trailer;
use crate::launch::LaunchPlan;

/// How the cache entry came to be usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// A valid entry was already there
    Hit,
    /// This process extracted and published the entry
    Extracted,
    /// Another process published a valid entry while this one extracted
    PublishedByOther,
}

/// The payload of one artifact and the cache entry it maps to.
#[derive(Debug)]
pub struct Bootstrap {
    exe: PathBuf,
    trailer: Trailer,
    entry: CacheEntry,
}

impl Bootstrap {
    pub fn new(exe: impl Into<PathBuf>, trailer: Trailer, cache_root: &Path) -> Self {
        let entry = CacheEntry::new(cache_root, &trailer.manifest);
        Self {
            exe: exe.into(),
            trailer,
            entry,
        }
    }

    pub fn entry(&self) -> &CacheEntry {
        &self.entry
    }

    /// Reuse the cache entry if it is valid, otherwise extract and publish.
    pub fn ensure_cached(&self) -> BootstrapResult<CacheOutcome> {
        if self.entry.is_valid() {
            debug!("Cache hit: {}", self.entry.dir().display());
            return Ok(CacheOutcome::Hit);
        }

        debug!("Cache miss: {}", self.entry.dir().display());
        let temp = self.extraction_dir()?;
        self.extract_into(temp.path())?;
        self.publish(temp)
    }

    /// Private directory to extract into. Created next to the entry so the
    /// publishing rename stays on one filesystem; falls back to the system
    /// temporary directory.
    fn extraction_dir(&self) -> BootstrapResult<TempDir> {
        let prefix = format!(".{}.", self.entry.name());
        let payloads = self.entry.payloads_dir();

        let near_entry = fs::create_dir_all(payloads).and_then(|()| {
            tempfile::Builder::new()
                .prefix(&prefix)
                .tempdir_in(payloads)
        });
        match near_entry {
            Ok(dir) => Ok(dir),
            Err(e) => {
                debug!("Cannot extract under {}: {}", payloads.display(), e);
                tempfile::Builder::new()
                    .prefix(&prefix)
                    .tempdir()
                    .map_err(BootstrapError::TempDir)
            }
        }
    }

    fn payload_reader(&self) -> io::Result<io::Take<File>> {
        let footer = &self.trailer.footer;
        let mut file = File::open(&self.exe)?;
        file.seek(SeekFrom::Start(footer.payload_offset))?;
        Ok(file.take(footer.payload_size))
    }

    /// Verify the payload against the recorded hash and unpack it into `dest`.
    pub fn extract_into(&self, dest: &Path) -> BootstrapResult<()> {
        let extraction = |source| BootstrapError::Extraction {
            dir: dest.to_path_buf(),
            source,
        };

        let actual = self
            .payload_reader()
            .and_then(sha256_hex)
            .map_err(extraction)?;
        let expected = &self.trailer.manifest.hash;
        if &actual != expected {
            return Err(BootstrapError::PayloadHashMismatch {
                expected: expected.clone(),
                actual,
            });
        }

        let reader = self.payload_reader().map_err(extraction)?;
        unpack(reader, dest).map_err(extraction)?;
        debug!("Extracted payload into {}", dest.display());
        Ok(())
    }

    /// Move an extracted tree into place as the cache entry.
    ///
    /// On a failed rename the temporary directory is left on disk and
    /// named in the error; on every other path it is removed.
    pub fn publish(&self, temp: TempDir) -> BootstrapResult<CacheOutcome> {
        let dir = self.entry.dir();

        if self.entry.is_valid() {
            debug!("{} was published concurrently", dir.display());
            return Ok(CacheOutcome::PublishedByOther);
        }

        match fs::remove_dir_all(dir) {
            Ok(()) => debug!("Removed stale entry {}", dir.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => debug!("Cannot remove stale entry {}: {}", dir.display(), e),
        }

        let renamed = fs::create_dir_all(self.entry.payloads_dir())
            .and_then(|()| fs::rename(temp.path(), dir));
        match renamed {
            Ok(()) => {
                // The path no longer exists; nothing left to clean up
                let _ = temp.keep();
                debug!("Published {}", dir.display());
                Ok(CacheOutcome::Extracted)
            }
            Err(_) if self.entry.is_valid() => {
                debug!("{} was published concurrently", dir.display());
                Ok(CacheOutcome::PublishedByOther)
            }
            Err(source) => Err(BootstrapError::Publish {
                entry: dir.to_path_buf(),
                temp: temp.keep(),
                source,
            }),
        }
    }
}

/// Artifact entry point: populate the cache, then replace this process
/// with the bundled program. Only returns on failure.
pub fn run(exe: &Path, trailer: Trailer, args: Vec<OsString>) -> BootstrapResult<Infallible> {
    let root = cache_root().ok_or(BootstrapError::NoCacheRoot)?;
    let bootstrap = Bootstrap::new(exe, trailer, &root);
    let outcome = bootstrap.ensure_cached()?;
    debug!("Cache entry ready ({:?})", outcome);

    let plan = LaunchPlan::for_entry(
        bootstrap.entry(),
        args,
        std::env::var_os("LD_LIBRARY_PATH"),
    )?;
    Err(plan.exec())
}
