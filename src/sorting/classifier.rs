use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Image,
    Video,
    Document,
    Archive,
    Audio,
    Other,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Image,
        Category::Video,
        Category::Document,
        Category::Archive,
        Category::Audio,
        Category::Other,
    ];

    /// Also the directory name under each room.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Image => "Image",
            Category::Video => "Video",
            Category::Document => "Document",
            Category::Archive => "Archive",
            Category::Audio => "Audio",
            Category::Other => "Other",
        }
    }

    pub fn parse(value: &str) -> Option<Category> {
        Category::ALL
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(value.trim()))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const EXTENSION_TABLE: &[(Category, &[&str])] = &[
    (Category::Image, &["jpg", "jpeg", "png", "gif", "webp", "bmp"]),
    (Category::Video, &["mp4", "mov", "avi", "mkv"]),
    (
        Category::Document,
        &["pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "txt", "hwp"],
    ),
    (Category::Archive, &["zip", "rar", "7z"]),
    (Category::Audio, &["mp3", "wav", "m4a"]),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Category(Category),
    Excluded,
}

/// Lower-cases and strips leading dots: `".JPG"` becomes `"jpg"`.
pub fn normalize_extension(raw: &str) -> String {
    raw.trim().trim_start_matches('.').to_lowercase()
}

pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|ext| normalize_extension(&ext.to_string_lossy()))
        .unwrap_or_default()
}

/// Fixed table lookup. Unknown or missing extensions are `Other`.
pub fn category_for_extension(ext: &str) -> Category {
    let ext = normalize_extension(ext);
    EXTENSION_TABLE
        .iter()
        .find(|(_, exts)| exts.contains(&ext.as_str()))
        .map(|(category, _)| *category)
        .unwrap_or(Category::Other)
}

pub fn classify(
    path: &Path,
    exclude_extensions: &HashSet<String>,
    overrides: &HashMap<String, Category>,
) -> Classification {
    let ext = extension_of(path);
    if !ext.is_empty() && exclude_extensions.contains(&ext) {
        return Classification::Excluded;
    }
    let category = overrides
        .get(&ext)
        .copied()
        .unwrap_or_else(|| category_for_extension(&ext));
    Classification::Category(category)
}
