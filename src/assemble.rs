//! Artifact assembly: stub + archive + manifest + footer.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::archive::ArchiveBlob;
use crate::error::{PackError, PackResult};
use crate::format::{read_footer, Footer, Manifest, FOOTER_SIZE};

/// Sizes of the sections written by [`assemble`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledInfo {
    pub path: PathBuf,
    pub stub_size: u64,
    pub payload_size: u64,
    pub manifest_size: u64,
    pub total_size: u64,
}

/// Open the stub and return a reader over its executable part.
///
/// A stub that is itself an artifact contributes only its leading
/// `stub_size` bytes, never its payload.
fn open_stub(stub: &Path) -> io::Result<(io::Take<File>, u64)> {
    let mut file = File::open(stub)?;
    let len = match read_footer(&mut file) {
        Ok(footer) => {
            debug!("{} carries a payload, using its stub only", stub.display());
            footer.stub_size
        }
        Err(_) => file.metadata()?.len(),
    };
    file.seek(SeekFrom::Start(0))?;
    Ok((file.take(len), len))
}

fn io_err(output: &Path) -> impl Fn(io::Error) -> PackError + '_ {
    move |e| PackError::io(format!("writing {}", output.display()), e)
}

/// Write the artifact to `output`.
///
/// The file is assembled under a temporary name next to `output` and only
/// renamed into place once complete and executable.
pub fn assemble(
    stub: &Path,
    blob: &ArchiveBlob,
    manifest: &Manifest,
    output: &Path,
) -> PackResult<AssembledInfo> {
    let dir = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(io_err(output))?;

    let (mut stub_reader, stub_size) = open_stub(stub)
        .map_err(|e| PackError::io(format!("reading stub {}", stub.display()), e))?;
    let copied = io::copy(&mut stub_reader, tmp.as_file_mut()).map_err(io_err(output))?;
    if copied != stub_size {
        return Err(PackError::io(
            format!("reading stub {}", stub.display()),
            io::ErrorKind::UnexpectedEof.into(),
        ));
    }

    let mut payload = File::open(&blob.path)
        .map_err(|e| PackError::io(format!("reading {}", blob.path.display()), e))?;
    let payload_size = io::copy(&mut payload, tmp.as_file_mut()).map_err(io_err(output))?;

    let manifest_json = manifest
        .to_json()
        .map_err(|e| PackError::Tooling(e.into()))?;
    tmp.write_all(&manifest_json).map_err(io_err(output))?;

    let footer = Footer {
        stub_size,
        payload_offset: stub_size,
        payload_size,
        manifest_offset: stub_size + payload_size,
        manifest_size: manifest_json.len() as u64,
    };
    tmp.write_all(&footer.to_bytes()).map_err(io_err(output))?;
    tmp.as_file().sync_all().map_err(io_err(output))?;

    fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o755)).map_err(io_err(output))?;
    tmp.persist(output).map_err(|e| io_err(output)(e.error))?;

    Ok(AssembledInfo {
        path: output.to_path_buf(),
        stub_size,
        payload_size,
        manifest_size: footer.manifest_size,
        total_size: footer.manifest_offset + footer.manifest_size + FOOTER_SIZE as u64,
    })
}
