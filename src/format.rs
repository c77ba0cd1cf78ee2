//! On-disk layout of a standalone artifact.
//!
//! ```text
//! +---------------------------+
//! | Bootstrap stub executable |
//! +---------------------------+
//! | Archive blob (tar.gz)     |  bin/<binary>, lib/...
//! +---------------------------+
//! | Manifest (JSON)           |  binary, loader, hash
//! +---------------------------+
//! | Footer (64 bytes)         |  magic, version, offsets
//! +---------------------------+
//! ```
//!
//! The stub finds its payload by reading the footer at the end of its own
//! executable; nothing is located by scanning.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::FormatError;

/// Magic bytes identifying a standalone artifact.
pub const MAGIC: &[u8; 8] = b"ELFSTAND";

/// Current format version.
pub const FORMAT_VERSION: u32 = 1;

/// Footer size in bytes (fixed).
pub const FOOTER_SIZE: usize = 64;

/// Fixed-size footer at the end of an artifact.
///
/// Layout (64 bytes total, little-endian):
/// ```text
/// Offset  Size  Field
/// 0       8     magic ("ELFSTAND")
/// 8       4     version (u32)
/// 12      8     stub_size (u64)
/// 20      8     payload_offset (u64)
/// 28      8     payload_size (u64)
/// 36      8     manifest_offset (u64)
/// 44      8     manifest_size (u64)
/// 52      12    reserved (zeroes)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    pub stub_size: u64,
    pub payload_offset: u64,
    pub payload_size: u64,
    pub manifest_offset: u64,
    pub manifest_size: u64,
}

fn read_u64(buf: &[u8; FOOTER_SIZE], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(bytes)
}

impl Footer {
    pub fn to_bytes(&self) -> [u8; FOOTER_SIZE] {
        let mut buf = [0u8; FOOTER_SIZE];
        buf[0..8].copy_from_slice(MAGIC);
        buf[8..12].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        buf[12..20].copy_from_slice(&self.stub_size.to_le_bytes());
        buf[20..28].copy_from_slice(&self.payload_offset.to_le_bytes());
        buf[28..36].copy_from_slice(&self.payload_size.to_le_bytes());
        buf[36..44].copy_from_slice(&self.manifest_offset.to_le_bytes());
        buf[44..52].copy_from_slice(&self.manifest_size.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; FOOTER_SIZE]) -> Result<Self, FormatError> {
        if &buf[0..8] != MAGIC {
            return Err(FormatError::InvalidMagic);
        }

        let mut version = [0u8; 4];
        version.copy_from_slice(&buf[8..12]);
        let version = u32::from_le_bytes(version);
        if version != FORMAT_VERSION {
            return Err(FormatError::UnsupportedVersion(version));
        }

        Ok(Self {
            stub_size: read_u64(buf, 12),
            payload_offset: read_u64(buf, 20),
            payload_size: read_u64(buf, 28),
            manifest_offset: read_u64(buf, 36),
            manifest_size: read_u64(buf, 44),
        })
    }

    /// Check that the sections are contiguous and end where the footer starts.
    fn validate(&self, file_len: u64) -> Result<(), FormatError> {
        let payload_end = self.payload_offset.checked_add(self.payload_size);
        let manifest_end = self.manifest_offset.checked_add(self.manifest_size);
        let ok = self.stub_size == self.payload_offset
            && payload_end == Some(self.manifest_offset)
            && manifest_end.and_then(|end| end.checked_add(FOOTER_SIZE as u64)) == Some(file_len);
        if ok {
            Ok(())
        } else {
            Err(FormatError::BadOffsets)
        }
    }
}

/// The values the packager records for the bootstrap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// File name of the bundled executable (`bin/<binary>`)
    pub binary: String,

    /// File name of the bundled loader (`lib/<loader>`), if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loader: Option<String>,

    /// Hex SHA-256 of the archive blob
    pub hash: String,
}

impl Manifest {
    pub fn to_json(&self) -> Result<Vec<u8>, FormatError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(data: &[u8]) -> Result<Self, FormatError> {
        Ok(serde_json::from_slice(data)?)
    }
}

/// Footer and manifest of an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trailer {
    pub footer: Footer,
    pub manifest: Manifest,
}

/// Read and validate the footer at the end of `file`.
pub fn read_footer(file: &mut File) -> Result<Footer, FormatError> {
    let file_len = file.metadata()?.len();
    if file_len < FOOTER_SIZE as u64 {
        return Err(FormatError::Truncated);
    }

    file.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;
    let mut buf = [0u8; FOOTER_SIZE];
    file.read_exact(&mut buf)?;

    let footer = Footer::from_bytes(&buf)?;
    footer.validate(file_len)?;
    Ok(footer)
}

/// Read footer and manifest from the artifact at `path`.
pub fn read_trailer(path: &Path) -> Result<Trailer, FormatError> {
    let mut file = File::open(path)?;
    let footer = read_footer(&mut file)?;

    file.seek(SeekFrom::Start(footer.manifest_offset))?;
    let mut manifest = vec![0u8; footer.manifest_size as usize];
    file.read_exact(&mut manifest)?;

    Ok(Trailer {
        footer,
        manifest: Manifest::from_json(&manifest)?,
    })
}
