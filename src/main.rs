//! standalone - package an ELF executable with its libraries and loader
//!
//! One binary, two roles. When the running executable carries a payload
//! footer it is an artifact and acts as the bootstrap; otherwise it is the
//! packager.

use clap::Parser;
use elf_standalone::cli::Cli;
use elf_standalone::error::{BootstrapError, InputError, PackResult};
use elf_standalone::format::{read_trailer, Trailer};
use elf_standalone::inspect::{DependencyInspector, FileCommand, Ldd, Readelf};
use elf_standalone::packager::{default_output, Packager};
use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Environment variable enabling bootstrap tracing on stderr.
const BOOTSTRAP_LOG_VAR: &str = "STANDALONE_LOG";

fn main() -> ExitCode {
    let exe = match env::current_exe() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("error: {}", BootstrapError::CurrentExe(e));
            return ExitCode::FAILURE;
        }
    };

    match read_trailer(&exe) {
        Ok(trailer) => bootstrap(&exe, trailer),
        // No trailer, or not even readable: this is the packager
        Err(e) if e.is_not_an_artifact() => package(exe),
        Err(e) => {
            eprintln!("error: {}", BootstrapError::Footer(e));
            ExitCode::FAILURE
        }
    }
}

fn bootstrap(exe: &Path, trailer: Trailer) -> ExitCode {
    // Silent unless asked: the wrapped program owns stdout and stderr
    let filter =
        EnvFilter::try_from_env(BOOTSTRAP_LOG_VAR).unwrap_or_else(|_| EnvFilter::new("off"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let args = env::args_os().skip(1).collect();
    match elf_standalone::bootstrap::run(exe, trailer, args) {
        Ok(never) => match never {},
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn package(exe: PathBuf) -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // Usage errors exit 1 like every other input error; --help and
            // --version are not errors.
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stdout)
        .with_target(false)
        .without_time()
        .init();

    match run(cli, exe) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, exe: PathBuf) -> PackResult<()> {
    let executable = cli.executable.ok_or(InputError::MissingArgument)?;
    let output = match cli.output {
        Some(path) => path,
        None => default_output(&executable)?,
    };
    let stub = cli.stub.unwrap_or(exe);
    debug!("Using stub {}", stub.display());

    let deps: Box<dyn DependencyInspector> = match cli.sysroot {
        Some(sysroot) => {
            debug!("Resolving with readelf inside {}", sysroot.display());
            Box::new(Readelf::new(sysroot, cli.lib_paths))
        }
        None => Box::new(Ldd),
    };

    Packager::new(&FileCommand, deps.as_ref()).pack(&executable, &stub, &output)?;
    Ok(())
}
