//! Packager input validation.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use crate::error::{InputError, PackError, PackResult};
use crate::inspect::{MediaTypeInspector, MIME_EXECUTABLE, MIME_PIE_EXECUTABLE};

/// Check that `path` exists, carries an execute bit, and is an ELF
/// executable (static, dynamic or PIE).
///
/// Only reads; nothing is created on any outcome. Returns the media type
/// that was detected.
pub fn validate_executable(path: &Path, inspector: &dyn MediaTypeInspector) -> PackResult<String> {
    let metadata = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(InputError::NotFound(path.to_path_buf()).into())
        }
        Err(e) => return Err(PackError::io(format!("reading {}", path.display()), e)),
    };

    if !metadata.is_file() || metadata.permissions().mode() & 0o111 == 0 {
        return Err(InputError::NotExecutable(path.to_path_buf()).into());
    }

    let media_type = inspector.media_type(path).map_err(PackError::Tooling)?;
    if media_type != MIME_EXECUTABLE && media_type != MIME_PIE_EXECUTABLE {
        return Err(InputError::NotElf {
            path: path.to_path_buf(),
            media_type,
        }
        .into());
    }

    Ok(media_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct FixedType(&'static str);

    impl MediaTypeInspector for FixedType {
        fn media_type(&self, _path: &Path) -> anyhow::Result<String> {
            Ok(self.0.to_string())
        }
    }

    fn write_file(dir: &Path, name: &str, mode: u32) -> std::path::PathBuf {
        let path = dir.join(name);
        fs::write(&path, b"\x7fELF").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    #[test]
    fn test_missing_file() {
        let err = validate_executable(Path::new("/nonexistent/bin"), &FixedType(MIME_EXECUTABLE))
            .unwrap_err();
        assert!(matches!(err, PackError::Input(InputError::NotFound(_))));
    }

    #[test]
    fn test_not_executable() {
        let temp = TempDir::new().unwrap();
        let path = write_file(temp.path(), "data", 0o644);

        let err = validate_executable(&path, &FixedType(MIME_EXECUTABLE)).unwrap_err();
        assert!(matches!(err, PackError::Input(InputError::NotExecutable(_))));
    }

    #[test]
    fn test_directory_is_not_executable() {
        let temp = TempDir::new().unwrap();
        let err = validate_executable(temp.path(), &FixedType(MIME_EXECUTABLE)).unwrap_err();
        assert!(matches!(err, PackError::Input(InputError::NotExecutable(_))));
    }

    #[test]
    fn test_script_rejected() {
        let temp = TempDir::new().unwrap();
        let path = write_file(temp.path(), "run.sh", 0o755);

        let err = validate_executable(&path, &FixedType("text/x-shellscript")).unwrap_err();
        match err {
            PackError::Input(InputError::NotElf { media_type, .. }) => {
                assert_eq!(media_type, "text/x-shellscript")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_shared_library_rejected() {
        let temp = TempDir::new().unwrap();
        let path = write_file(temp.path(), "libfoo.so", 0o755);

        assert!(validate_executable(&path, &FixedType("application/x-sharedlib")).is_err());
    }

    #[test]
    fn test_executables_accepted() {
        let temp = TempDir::new().unwrap();
        let path = write_file(temp.path(), "tool", 0o700);

        for mime in [MIME_EXECUTABLE, MIME_PIE_EXECUTABLE] {
            assert_eq!(validate_executable(&path, &FixedType(mime)).unwrap(), mime);
        }
    }
}
