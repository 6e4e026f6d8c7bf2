//! Failure taxonomy for a single move.
//!
//! Only [`SortError::PermissionDenied`], [`SortError::NameExhausted`] and
//! [`SortError::DiskFull`] are meant for operators. Everything else is
//! recorded on the move but degrades quietly.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// `ENOSPC`
#[cfg(unix)]
const DISK_FULL_OS_CODES: &[i32] = &[28];
/// `ERROR_HANDLE_DISK_FULL`, `ERROR_DISK_FULL`
#[cfg(windows)]
const DISK_FULL_OS_CODES: &[i32] = &[39, 112];
#[cfg(not(any(unix, windows)))]
const DISK_FULL_OS_CODES: &[i32] = &[];

#[derive(Debug, Error)]
pub enum SortError {
    #[error("permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("no free name for {path} after {attempts} attempts")]
    NameExhausted { path: PathBuf, attempts: u32 },

    #[error("disk full while writing {path}")]
    DiskFull { path: PathBuf },

    #[error("destination {dest} lies inside the download directory")]
    DestinationInsideDownloads { dest: PathBuf },

    #[error("copy of {path} is incomplete ({written} of {expected} bytes)")]
    IncompleteCopy {
        path: PathBuf,
        written: u64,
        expected: u64,
    },

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SortError {
    /// Maps an `io::Error` raised while touching `path` onto the taxonomy.
    pub fn from_io(source: io::Error, path: &Path) -> Self {
        let path = path.to_path_buf();
        if source.kind() == io::ErrorKind::PermissionDenied {
            return SortError::PermissionDenied { path };
        }
        if is_disk_full(&source) {
            return SortError::DiskFull { path };
        }
        SortError::Io { path, source }
    }

    /// Whether the failure should be raised to the operator rather than
    /// only recorded.
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            SortError::PermissionDenied { .. }
                | SortError::NameExhausted { .. }
                | SortError::DiskFull { .. }
        )
    }
}

fn is_disk_full(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::StorageFull {
        return true;
    }
    err.raw_os_error()
        .map(|code| DISK_FULL_OS_CODES.contains(&code))
        .unwrap_or(false)
}

pub type SortResult<T> = std::result::Result<T, SortError>;
