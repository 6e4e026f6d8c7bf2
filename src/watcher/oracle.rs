use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Source of `(path, size)` listings for the stability tracker.
pub trait SizeOracle {
    fn snapshot(&self) -> io::Result<Vec<(PathBuf, u64)>>;

    /// Whether `path` can be opened for reading right now. A settled file
    /// that another process still holds open is not ready to move.
    fn can_open(&self, _path: &Path) -> bool {
        true
    }
}

/// Lists regular files directly inside one directory. Subdirectories and
/// dot-files (including our own `.partial` staging files) are ignored.
#[derive(Debug, Clone)]
pub struct DirectoryOracle {
    dir: PathBuf,
}

impl DirectoryOracle {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

impl SizeOracle for DirectoryOracle {
    fn snapshot(&self) -> io::Result<Vec<(PathBuf, u64)>> {
        let mut listing = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            // Entries can vanish between listing and stat.
            let Ok(entry) = entry else { continue };
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            if metadata.is_file() {
                listing.push((entry.path(), metadata.len()));
            }
        }
        Ok(listing)
    }

    fn can_open(&self, path: &Path) -> bool {
        fs::File::open(path).is_ok()
    }
}
