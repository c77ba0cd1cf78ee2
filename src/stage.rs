//! Staging tree: the executable and its closure laid out as `bin/` + `lib/`.
//!
//! The tree lives in a fresh temporary directory that is removed when the
//! [`StagingTree`] is dropped, whether packaging succeeded or not.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::info;

use crate::error::{PackError, PackResult};
use crate::paths::basename;
use crate::resolve::{Closure, Library};

pub const BIN_DIR: &str = "bin";
pub const LIB_DIR: &str = "lib";

/// Make a file executable (chmod 755).
pub fn make_executable(path: &Path) -> std::io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms)
}

/// Copy `src` into `dest_dir` under its own file name, following symlinks.
///
/// Returns the destination path.
pub fn copy_into(src: &Path, dest_dir: &Path) -> PackResult<PathBuf> {
    let name = src.file_name().ok_or_else(|| {
        PackError::io(
            format!("{} has no file name", src.display()),
            std::io::ErrorKind::InvalidInput.into(),
        )
    })?;
    let dest = dest_dir.join(name);
    copy_file(src, &dest)?;
    Ok(dest)
}

/// Copy a library's bytes into `lib_dir` under the library's name.
pub fn copy_library(lib: &Library, lib_dir: &Path) -> PackResult<PathBuf> {
    let dest = lib_dir.join(&lib.name);
    copy_file(&lib.path, &dest)?;
    Ok(dest)
}

fn copy_file(src: &Path, dest: &Path) -> PackResult<()> {
    fs::copy(src, dest).map_err(|e| {
        PackError::io(
            format!("copying {} to {}", src.display(), dest.display()),
            e,
        )
    })?;
    Ok(())
}

/// Ephemeral directory holding `bin/<binary>` and `lib/<libraries...>`.
#[derive(Debug)]
pub struct StagingTree {
    dir: TempDir,
    binary_name: String,
    loader_name: Option<String>,
}

impl StagingTree {
    /// Create the tree and copy the executable, every library of the
    /// closure, and the loader into it.
    pub fn create(binary: &Path, closure: &Closure) -> PackResult<Self> {
        let dir = tempfile::Builder::new()
            .prefix("standalone-staging.")
            .tempdir()
            .map_err(|e| PackError::io("creating staging directory", e))?;

        let bin_dir = dir.path().join(BIN_DIR);
        let lib_dir = dir.path().join(LIB_DIR);
        for d in [&bin_dir, &lib_dir] {
            fs::create_dir(d).map_err(|e| PackError::io(format!("creating {}", d.display()), e))?;
        }

        let staged = copy_into(binary, &bin_dir)?;
        make_executable(&staged)
            .map_err(|e| PackError::io(format!("chmod {}", staged.display()), e))?;
        let binary_name = basename(&staged).unwrap_or_default();
        info!("Copying binary {}", binary.display());

        for lib in &closure.libraries {
            info!("Copying library {}", lib.path.display());
            copy_library(lib, &lib_dir)?;
        }

        let loader_name = match &closure.loader {
            Some(loader) => {
                info!("Copying loader {}", loader.path.display());
                let staged = copy_library(loader, &lib_dir)?;
                // The bootstrap execs the loader directly
                make_executable(&staged)
                    .map_err(|e| PackError::io(format!("chmod {}", staged.display()), e))?;
                Some(loader.name.clone())
            }
            None => None,
        };

        Ok(Self {
            dir,
            binary_name,
            loader_name,
        })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn binary_name(&self) -> &str {
        &self.binary_name
    }

    pub fn loader_name(&self) -> Option<&str> {
        self.loader_name.as_deref()
    }
}
