//! Integration tests for standalone, driving the real binary.
//!
//! Tests that depend on host tools (`file`, `ldd`, `readelf`) skip
//! themselves when those are not installed.

mod artifact;
mod inspect;
mod packager;

use std::path::Path;
use std::process::Command as StdCommand;

/// True if `tool` can be spawned on this host.
pub fn have(tool: &str) -> bool {
    StdCommand::new(tool)
        .arg("--version")
        .output()
        .is_ok()
}

/// True if the packager will accept `path` on this host: `file` and `ldd`
/// are present and `file` calls it an executable (some `file` versions
/// report PIE binaries as shared libraries).
pub fn packable(path: &Path) -> bool {
    if !path.is_file() || !have("ldd") {
        return false;
    }
    let Ok(out) = StdCommand::new("file")
        .args(["--brief", "--mime-type"])
        .arg(path)
        .output()
    else {
        return false;
    };
    let mime = String::from_utf8_lossy(&out.stdout);
    matches!(
        mime.trim(),
        "application/x-executable" | "application/x-pie-executable"
    )
}
