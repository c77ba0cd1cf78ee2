//! Replace the bootstrap process with the bundled program.
//!
//! With a bundled loader the command line becomes
//! `lib/<loader> --library-path lib/ bin/<binary> ARGS...`, so the host's
//! own loader (possibly for another architecture, possibly absent) is
//! never involved. Without one the binary is exec'd directly.
//!
//! Either way `LD_LIBRARY_PATH` gets the bundled `lib/` prepended to
//! whatever was inherited.

use std::ffi::{OsStr, OsString};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

use crate::cache::{is_executable_file, CacheEntry};
use crate::error::{BootstrapError, BootstrapResult};

pub const LIBRARY_PATH_VAR: &str = "LD_LIBRARY_PATH";

/// Which exec branch a [`LaunchPlan`] takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    ViaLoader,
    Direct,
}

/// `<lib_dir>` followed by the inherited search path, if non-empty.
pub fn library_path(lib_dir: &Path, inherited: Option<&OsStr>) -> OsString {
    let mut value = lib_dir.as_os_str().to_os_string();
    if let Some(inherited) = inherited.filter(|v| !v.is_empty()) {
        value.push(":");
        value.push(inherited);
    }
    value
}

/// Program, argument vector and library search path for the final exec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    mode: LaunchMode,
    program: PathBuf,
    args: Vec<OsString>,
    library_path: OsString,
}

impl LaunchPlan {
    /// Decide how to start the program cached in `entry`.
    ///
    /// `forwarded` are the artifact's own arguments (without argv[0]),
    /// passed through untouched.
    pub fn for_entry(
        entry: &CacheEntry,
        forwarded: impl IntoIterator<Item = OsString>,
        inherited_library_path: Option<OsString>,
    ) -> BootstrapResult<Self> {
        let lib_dir = entry.lib_dir();
        let binary = entry.binary_path();
        let library_path = library_path(&lib_dir, inherited_library_path.as_deref());

        if let Some(loader) = entry.loader_path().filter(|l| is_executable_file(l)) {
            let mut args = vec![
                OsString::from("--library-path"),
                lib_dir.into_os_string(),
                binary.into_os_string(),
            ];
            args.extend(forwarded);
            return Ok(Self {
                mode: LaunchMode::ViaLoader,
                program: loader,
                args,
                library_path,
            });
        }

        if !is_executable_file(&binary) {
            return Err(BootstrapError::NotExecutable(binary));
        }
        Ok(Self {
            mode: LaunchMode::Direct,
            program: binary,
            args: forwarded.into_iter().collect(),
            library_path,
        })
    }

    pub fn mode(&self) -> LaunchMode {
        self.mode
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    pub fn library_path(&self) -> &OsStr {
        &self.library_path
    }

    /// Replace the current process image. Returns only if exec failed.
    pub fn exec(self) -> BootstrapError {
        debug!("exec {:?} {:?}", self.program, self.args);
        let source = Command::new(&self.program)
            .args(&self.args)
            .env(LIBRARY_PATH_VAR, &self.library_path)
            .exec();
        BootstrapError::Exec {
            program: self.program,
            source,
        }
    }
}
