//! Packager: executable in, `<name>_standalone` out.

use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::archive::create_archive;
use crate::assemble::assemble;
use crate::error::{InputError, PackResult};
use crate::format::Manifest;
use crate::inspect::{DependencyInspector, MediaTypeInspector};
use crate::paths::basename;
use crate::resolve::{resolve_dependencies, ResolutionWarning};
use crate::stage::StagingTree;
use crate::validate::validate_executable;

/// Suffix appended to the executable's name to form the artifact name.
pub const ARTIFACT_SUFFIX: &str = "_standalone";

/// `<basename>_standalone`, relative to the current directory.
pub fn default_output(executable: &Path) -> PackResult<PathBuf> {
    let name = basename(executable)
        .ok_or_else(|| InputError::NotFound(executable.to_path_buf()))?;
    Ok(PathBuf::from(format!("{name}{ARTIFACT_SUFFIX}")))
}

/// What a successful packaging run produced.
#[derive(Debug, Clone)]
pub struct PackSummary {
    pub output: PathBuf,
    pub manifest: Manifest,
    pub libraries: usize,
    pub total_size: u64,
    pub warnings: Vec<ResolutionWarning>,
}

/// Builds artifacts using the given inspection tools.
pub struct Packager<'a> {
    media: &'a dyn MediaTypeInspector,
    deps: &'a dyn DependencyInspector,
}

impl<'a> Packager<'a> {
    pub fn new(media: &'a dyn MediaTypeInspector, deps: &'a dyn DependencyInspector) -> Self {
        Self { media, deps }
    }

    /// Validate `executable`, bundle its closure and write the artifact
    /// to `output`, with `stub` as the bootstrap.
    ///
    /// The staging directory is removed on every return path.
    pub fn pack(&self, executable: &Path, stub: &Path, output: &Path) -> PackResult<PackSummary> {
        let media_type = validate_executable(executable, self.media)?;
        info!("Packaging {} ({})", executable.display(), media_type);

        info!("Resolving dependencies");
        let closure = resolve_dependencies(self.deps, executable)?;
        if closure.confidently_static {
            info!("Not a dynamic executable, bundling the binary alone");
        }
        for warning in &closure.warnings {
            warn!("{}", warning);
        }
        match &closure.loader {
            Some(loader) => info!("Found loader {}", loader.path.display()),
            None => info!("No loader found"),
        }

        let staging = StagingTree::create(executable, &closure)?;

        info!("Creating archive");
        let blob = create_archive(staging.root(), &staging.root().join("payload.tar.gz"))?;
        info!("Archive is {} bytes, sha256 {}", blob.size, blob.hash);

        let manifest = Manifest {
            binary: staging.binary_name().to_string(),
            loader: staging.loader_name().map(str::to_string),
            hash: blob.hash.clone(),
        };
        let assembled = assemble(stub, &blob, &manifest, output)?;
        info!(
            "Created {} ({} bytes)",
            assembled.path.display(),
            assembled.total_size
        );

        Ok(PackSummary {
            output: assembled.path,
            manifest,
            libraries: closure.libraries.len(),
            total_size: assembled.total_size,
            warnings: closure.warnings,
        })
    }
}
