//! Deterministic archive of a staging tree, and its content hash.
//!
//! Entries are written in sorted order with zeroed ownership and
//! timestamps, and gzip is written without a header mtime, so archiving
//! the same files twice produces byte-identical output. Paths are relative
//! to the staging root (`bin/<name>`, `lib/<name>`).

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::{Compression, GzBuilder};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tar::{Builder, EntryType, Header};

use crate::error::{PackError, PackResult};
use crate::stage::{BIN_DIR, LIB_DIR};

/// A finished archive on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveBlob {
    pub path: PathBuf,
    pub size: u64,
    /// Lowercase hex SHA-256 of the archive bytes
    pub hash: String,
}

fn create_deterministic_tar<W: Write>(writer: W) -> Builder<GzEncoder<W>> {
    let encoder = GzBuilder::new()
        .mtime(0)
        .operating_system(255)
        .write(writer, Compression::best());

    let mut tar = Builder::new(encoder);
    tar.mode(tar::HeaderMode::Deterministic);
    tar
}

fn base_header(entry_type: EntryType, size: u64, mode: u32) -> Header {
    let mut header = Header::new_gnu();
    header.set_entry_type(entry_type);
    header.set_size(size);
    header.set_mode(mode);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mtime(0);
    header
}

/// Sorted regular files directly inside `dir`.
fn sorted_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Write the `bin/` and `lib/` subtrees of `root` as tar.gz into `writer`.
pub fn write_archive<W: Write>(root: &Path, writer: W) -> Result<W> {
    let mut tar = create_deterministic_tar(writer);

    for subtree in [BIN_DIR, LIB_DIR] {
        let mut header = base_header(EntryType::Directory, 0, 0o755);
        tar.append_data(&mut header, format!("{subtree}/"), io::empty())
            .with_context(|| format!("writing {subtree}/ to tar"))?;

        let dir = root.join(subtree);
        if !dir.is_dir() {
            continue;
        }
        for path in sorted_files(&dir)? {
            let name = path
                .file_name()
                .context("staged file has no name")?
                .to_string_lossy()
                .into_owned();
            let meta = fs::metadata(&path)?;
            let mode = if meta.permissions().mode() & 0o111 != 0 {
                0o755
            } else {
                0o644
            };

            let mut header = base_header(EntryType::Regular, meta.len(), mode);
            let file = File::open(&path).with_context(|| format!("opening {}", path.display()))?;
            tar.append_data(&mut header, format!("{subtree}/{name}"), file)
                .with_context(|| format!("writing {subtree}/{name} to tar"))?;
        }
    }

    let encoder = tar.into_inner().context("finalizing tar archive")?;
    encoder.finish().context("compressing gzip stream")
}

/// Hex-encoded SHA-256 of everything `reader` yields.
pub fn sha256_hex<R: Read>(mut reader: R) -> io::Result<String> {
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Archive the staging tree at `root` into the file `out` and hash it.
pub fn create_archive(root: &Path, out: &Path) -> PackResult<ArchiveBlob> {
    let file = File::create(out)
        .map_err(|e| PackError::io(format!("creating {}", out.display()), e))?;
    let writer = write_archive(root, BufWriter::new(file)).map_err(PackError::Tooling)?;
    writer
        .into_inner()
        .map_err(|e| PackError::io("flushing archive", e.into_error()))?
        .sync_all()
        .map_err(|e| PackError::io("flushing archive", e))?;

    let size = fs::metadata(out)
        .map_err(|e| PackError::io(format!("reading {}", out.display()), e))?
        .len();
    let hash = File::open(out)
        .and_then(sha256_hex)
        .map_err(|e| PackError::io(format!("hashing {}", out.display()), e))?;
    if hash.is_empty() {
        return Err(PackError::EmptyHash);
    }

    Ok(ArchiveBlob {
        path: out.to_path_buf(),
        size,
        hash,
    })
}

/// Decode a tar.gz stream into `dest`, keeping the execute bits.
pub fn unpack<R: Read>(reader: R, dest: &Path) -> io::Result<()> {
    let mut archive = tar::Archive::new(GzDecoder::new(reader));
    archive.set_preserve_permissions(true);
    archive.set_preserve_mtime(false);
    archive.unpack(dest)
}
