//! Self-extracting bundles of ELF executables.
//!
//! The packager resolves an executable's shared-library closure and its
//! dynamic loader (via `ldd`, or `readelf` inside a sysroot), stages them
//! as `bin/` + `lib/`, archives that tree deterministically and appends it
//! to a bootstrap stub. The stub, on every run, reuses or atomically
//! populates a content-addressed cache entry and execs the program through
//! the bundled loader.

pub mod archive;
pub mod assemble;
pub mod bootstrap;
pub mod cache;
pub mod cli;
pub mod error;
pub mod format;
pub mod inspect;
pub mod launch;
pub mod packager;
pub mod paths;
pub mod resolve;
pub mod stage;
pub mod validate;

pub use error::{BootstrapError, InputError, PackError};
pub use packager::{PackSummary, Packager};
pub use resolve::{Closure, DependencyReport, Library, ResolutionWarning};
