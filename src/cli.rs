//! Packager command line, defined with clap derive.
//!
//! Only the packager parses arguments. A produced artifact forwards its
//! whole argument vector to the bundled program untouched.

use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Bundle an ELF executable with its shared libraries and dynamic loader
/// into one self-extracting file.
///
/// The result, `<name>_standalone`, runs on hosts that lack those
/// libraries. On first run it extracts itself into
/// `$XDG_CACHE_HOME/standalone_payloads/` (or `~/.cache/...`) and reuses
/// that copy afterwards.
#[derive(Parser, Debug)]
#[command(name = "standalone")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Executable to package
    #[arg(value_name = "EXECUTABLE")]
    pub executable: Option<PathBuf>,

    /// Output path [default: ./<name>_standalone]
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Bootstrap stub to embed [default: this executable]
    ///
    /// Use a build of this tool for the target architecture when the
    /// artifact will run on a different CPU.
    #[arg(long, value_name = "PATH", env = "STANDALONE_STUB")]
    pub stub: Option<PathBuf>,

    /// Resolve libraries with readelf inside this root instead of running ldd
    #[arg(long, value_name = "DIR")]
    pub sysroot: Option<PathBuf>,

    /// Extra library directory inside the sysroot (repeatable)
    #[arg(long = "lib-path", value_name = "DIR", requires = "sysroot")]
    pub lib_paths: Vec<PathBuf>,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, conflicts_with = "quiet")]
    pub verbose: u8,

    /// Only print warnings and errors
    #[arg(short, long)]
    pub quiet: bool,
}

impl Cli {
    /// Default log filter for the chosen verbosity.
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            return "warn";
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}
