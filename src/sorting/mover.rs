use std::{
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
};

use uuid::Uuid;

use crate::error::{SortError, SortResult};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::log_warn;

/// `EXDEV`
#[cfg(unix)]
const CROSS_DEVICE_OS_CODES: &[i32] = &[18];
/// `ERROR_NOT_SAME_DEVICE`
#[cfg(windows)]
const CROSS_DEVICE_OS_CODES: &[i32] = &[17];
#[cfg(not(any(unix, windows)))]
const CROSS_DEVICE_OS_CODES: &[i32] = &[];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveMethod {
    /// Same volume: a single rename.
    Renamed,
    /// Different volume: staged copy, rename into place, source removed.
    /// `source_retained` is set when the source could not be deleted.
    Copied { source_retained: bool },
}

/// Moves `source` to `dest`, replacing anything already at `dest`.
///
/// Observers of the destination directory see either nothing or the whole
/// file under its final name.
pub fn move_file(source: &Path, dest: &Path) -> SortResult<MoveMethod> {
    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|err| SortError::from_io(err, parent))?;

    match fs::rename(source, dest) {
        Ok(()) => Ok(MoveMethod::Renamed),
        Err(err) if is_cross_device(&err) => copy_then_swap(source, dest),
        Err(err) => Err(SortError::from_io(err, dest)),
    }
}

/// Cross-volume fallback. The copy lands in a hidden sibling of `dest` and
/// only takes the final name once it is complete and flushed.
pub fn copy_then_swap(source: &Path, dest: &Path) -> SortResult<MoveMethod> {
    let staging = staging_path(dest);

    if let Err(err) = copy_and_sync(source, &staging) {
        discard(&staging);
        return Err(err);
    }

    if let Err(err) = fs::rename(&staging, dest) {
        discard(&staging);
        return Err(SortError::from_io(err, dest));
    }

    let source_retained = match fs::remove_file(source) {
        Ok(()) => false,
        Err(err) => {
            log_warn!(
                "Copied {} to {} but could not remove the source: {err}",
                source.display(),
                dest.display()
            );
            true
        }
    };

    Ok(MoveMethod::Copied { source_retained })
}

fn copy_and_sync(source: &Path, staging: &Path) -> SortResult<()> {
    let expected = fs::metadata(source)
        .map_err(|err| SortError::from_io(err, source))?
        .len();
    let mut reader = File::open(source).map_err(|err| SortError::from_io(err, source))?;
    let mut writer = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(staging)
        .map_err(|err| SortError::from_io(err, staging))?;

    let written =
        io::copy(&mut reader, &mut writer).map_err(|err| SortError::from_io(err, staging))?;
    writer
        .sync_all()
        .map_err(|err| SortError::from_io(err, staging))?;

    if written != expected {
        return Err(SortError::IncompleteCopy {
            path: staging.to_path_buf(),
            written,
            expected,
        });
    }
    Ok(())
}

fn staging_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let staged = format!(".{name}.{}.partial", Uuid::new_v4().simple());
    dest.with_file_name(staged)
}

fn discard(staging: &Path) {
    if let Err(err) = fs::remove_file(staging) {
        if err.kind() != io::ErrorKind::NotFound {
            log_warn!("Failed to remove partial copy {}: {err}", staging.display());
        }
    }
}

fn is_cross_device(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::CrossesDevices {
        return true;
    }
    err.raw_os_error()
        .map(|code| CROSS_DEVICE_OS_CODES.contains(&code))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn creates_missing_directories() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("photo.jpg");
        fs::write(&source, b"jpeg bytes").unwrap();
        let dest = temp.path().join("out").join("Friends").join("Image").join("photo.jpg");

        let method = move_file(&source, &dest).unwrap();

        assert_eq!(method, MoveMethod::Renamed);
        assert!(!source.exists());
        assert_eq!(fs::read(&dest).unwrap(), b"jpeg bytes");
    }

    #[test]
    fn replaces_existing_destination() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("a.txt");
        let dest = temp.path().join("out").join("a.txt");
        fs::create_dir_all(dest.parent().unwrap()).unwrap();
        fs::write(&dest, b"old contents that are longer").unwrap();
        fs::write(&source, b"new").unwrap();

        move_file(&source, &dest).unwrap();

        assert_eq!(fs::read(&dest).unwrap(), b"new");
    }

    #[test]
    fn staged_copy_leaves_only_the_final_file() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("clip.mp4");
        let payload = vec![7u8; 256 * 1024];
        fs::write(&source, &payload).unwrap();
        let out = temp.path().join("out");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("clip.mp4"), b"stale").unwrap();

        let method = copy_then_swap(&source, &out.join("clip.mp4")).unwrap();

        assert_eq!(method, MoveMethod::Copied { source_retained: false });
        assert!(!source.exists());
        assert_eq!(fs::read(out.join("clip.mp4")).unwrap(), payload);
        assert_eq!(entries(&out), vec!["clip.mp4".to_string()]);
    }

    #[test]
    fn missing_source_creates_nothing() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("out");
        fs::create_dir_all(&out).unwrap();

        let err = copy_then_swap(&temp.path().join("vanished.zip"), &out.join("vanished.zip"))
            .unwrap_err();

        assert!(matches!(err, SortError::Io { .. }));
        assert!(entries(&out).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn copy_failing_midway_removes_the_partial_file() {
        let temp = TempDir::new().unwrap();
        // Opening a directory succeeds on unix, reading it fails with EISDIR,
        // so the staging file already exists when the copy breaks.
        let source = temp.path().join("looks_like_a_file.zip");
        fs::create_dir_all(&source).unwrap();
        let out = temp.path().join("out");
        fs::create_dir_all(&out).unwrap();

        let err = copy_then_swap(&source, &out.join("looks_like_a_file.zip")).unwrap_err();

        assert!(matches!(err, SortError::Io { .. }));
        assert!(entries(&out).is_empty());
        assert!(source.exists());
    }

    #[test]
    fn uncreatable_directory_leaves_source_in_place() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("doc.pdf");
        fs::write(&source, b"pdf").unwrap();
        let blocker = temp.path().join("out");
        fs::write(&blocker, b"a file where a directory should be").unwrap();

        let result = move_file(&source, &blocker.join("Room").join("doc.pdf"));

        assert!(result.is_err());
        assert_eq!(fs::read(&source).unwrap(), b"pdf");
    }

    #[test]
    fn staging_names_are_hidden_and_unique() {
        let dest = Path::new("/out/Friends/Image/photo.jpg");
        let a = staging_path(dest);
        let b = staging_path(dest);
        assert_ne!(a, b);
        assert_eq!(a.parent(), dest.parent());
        let name = a.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(".photo.jpg."));
        assert!(name.ends_with(".partial"));
    }
}
