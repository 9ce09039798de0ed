pub mod command;

pub use command::{ToolInvocation, Toolchain};

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::errors::{BackupError, Result};

/// Returns the final path component as a string, rejecting paths like `..`.
pub fn file_name_of(path: &Path) -> Result<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            BackupError::InvalidFormat(format!("{} has no file name", path.display()))
        })
}

/// Whether the file name ends with `suffix` (case-insensitive).
pub fn has_suffix(path: &Path, suffix: &str) -> bool {
    path.file_name()
        .map(|name| {
            name.to_string_lossy()
                .to_ascii_lowercase()
                .ends_with(&suffix.to_ascii_lowercase())
        })
        .unwrap_or(false)
}

/// `path` with `suffix` appended to its file name (`a.dump` -> `a.dump.gz`).
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// `path` with `suffix` removed from its file name, if it ends with it and
/// something remains.
pub fn strip_suffix(path: &Path, suffix: &str) -> Option<PathBuf> {
    if !has_suffix(path, suffix) {
        return None;
    }
    let name = file_name_of(path).ok()?;
    let stem = &name[..name.len() - suffix.len()];
    if stem.is_empty() {
        return None;
    }
    Some(path.with_file_name(stem))
}

/// Parent directory of `path`, treating a bare file name as the current directory.
pub fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Writes an executable shell script standing in for a native client tool.
#[cfg(all(test, unix))]
pub(crate) fn fake_tool(dir: &Path, name: &str, script: &str) -> anyhow::Result<()> {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{script}\n"))?;
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
    Ok(())
}
