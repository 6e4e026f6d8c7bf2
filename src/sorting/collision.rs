use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::error::{SortError, SortResult};
use crate::settings::DuplicateHandling;

pub const MAX_RENAME_ATTEMPTS: u32 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Nothing occupies the path (or a free numbered name was found).
    Write(PathBuf),
    /// The occupant stays; the source is left where it is.
    Skip(PathBuf),
    /// The occupant is replaced.
    Overwrite(PathBuf),
}

impl Resolution {
    pub fn path(&self) -> &Path {
        match self {
            Resolution::Write(path) | Resolution::Skip(path) | Resolution::Overwrite(path) => path,
        }
    }
}

/// Decides where a file bound for `dest` actually goes.
///
/// `exists` is the occupancy check, normally `Path::exists`.
pub fn resolve(
    dest: &Path,
    policy: DuplicateHandling,
    exists: impl Fn(&Path) -> bool,
) -> SortResult<Resolution> {
    if !exists(dest) {
        return Ok(Resolution::Write(dest.to_path_buf()));
    }

    match policy {
        DuplicateHandling::Skip => Ok(Resolution::Skip(dest.to_path_buf())),
        DuplicateHandling::Overwrite => Ok(Resolution::Overwrite(dest.to_path_buf())),
        DuplicateHandling::Rename => (1..=MAX_RENAME_ATTEMPTS)
            .map(|n| numbered(dest, n))
            .find(|candidate| !exists(candidate.as_path()))
            .map(Resolution::Write)
            .ok_or_else(|| SortError::NameExhausted {
                path: dest.to_path_buf(),
                attempts: MAX_RENAME_ATTEMPTS,
            }),
    }
}

/// `a.txt` → `a (n).txt`; `README` → `README (n)`.
pub fn numbered(path: &Path, n: u32) -> PathBuf {
    let mut name: OsString = path
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_default();
    name.push(format!(" ({n})"));
    if let Some(ext) = path.extension() {
        name.push(".");
        name.push(ext);
    }
    path.with_file_name(name)
}
