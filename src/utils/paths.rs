use std::ffi::OsString;
use std::fs;
use std::path::{Component, Path, PathBuf};

const UNSAFE_NAME_CHARS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];
pub const MAX_NAME_CHARS: usize = 140;

fn replace_unsafe(raw: &str) -> String {
    raw.chars()
        .map(|c| if UNSAFE_NAME_CHARS.contains(&c) || c.is_control() { '_' } else { c })
        .collect()
}

/// Makes `raw` usable as a single path component on every platform we ship to.
pub fn safe_name(raw: &str) -> String {
    let replaced = replace_unsafe(raw);
    let truncated: String = replaced.trim().chars().take(MAX_NAME_CHARS).collect();
    // A bare "." or ".." would escape the room directory.
    if truncated.chars().all(|c| c == '.') {
        return truncated.replace('.', "_");
    }
    truncated
}

/// Like [`safe_name`], but an over-long name loses characters from its stem
/// rather than its extension.
pub fn safe_file_name(raw: &str) -> String {
    let replaced = replace_unsafe(raw);
    let trimmed = replaced.trim();
    if trimmed.chars().count() > MAX_NAME_CHARS {
        if let Some((stem, ext)) = trimmed.rsplit_once('.') {
            let ext_len = ext.chars().count();
            if !stem.is_empty() && ext_len < MAX_NAME_CHARS / 2 {
                let stem: String = stem.chars().take(MAX_NAME_CHARS - ext_len - 1).collect();
                return format!("{}.{ext}", stem.trim_end());
            }
        }
    }
    safe_name(trimmed)
}

/// Expands `%NAME%` and `${NAME}` references from the process environment.
/// Unknown variables are left as written.
pub fn expand_env(raw: &str) -> String {
    expand_with(raw, |name| std::env::var(name).ok())
}

fn expand_with(raw: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix("${") {
            if let Some(end) = after.find('}') {
                let name = &after[..end];
                match lookup(name) {
                    Some(value) => out.push_str(&value),
                    None => out.push_str(&rest[..end + 3]),
                }
                rest = &after[end + 1..];
                continue;
            }
        } else if let Some(after) = rest.strip_prefix('%') {
            if let Some(end) = after.find('%') {
                let name = &after[..end];
                if !name.is_empty() {
                    if let Some(value) = lookup(name) {
                        out.push_str(&value);
                        rest = &after[end + 1..];
                        continue;
                    }
                }
            }
        }

        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            out.push(c);
        }
        rest = chars.as_str();
    }

    out
}

/// Lexically normalizes `path`, dropping `.` and folding `..`.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Makes `path` absolute against the working directory, folds dot
/// segments, then canonicalizes the longest prefix that exists. The missing
/// tail is re-attached as written, so paths that do not exist yet still
/// compare through symlinked parents.
pub fn resolve_existing_prefix(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    let lexical = normalize(&absolute);

    let mut existing = lexical.as_path();
    let mut missing: Vec<OsString> = Vec::new();
    loop {
        if let Ok(mut resolved) = fs::canonicalize(existing) {
            resolved.extend(missing.iter().rev());
            return resolved;
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return lexical,
        }
    }
}

#[cfg(windows)]
fn fold_case(path: PathBuf) -> PathBuf {
    PathBuf::from(path.as_os_str().to_string_lossy().to_lowercase())
}

#[cfg(not(windows))]
fn fold_case(path: PathBuf) -> PathBuf {
    path
}

/// True when `path` is `dir` itself or anywhere below it, after both are
/// resolved with [`resolve_existing_prefix`]. Case-insensitive on Windows.
pub fn is_within(path: &Path, dir: &Path) -> bool {
    let path = fold_case(resolve_existing_prefix(path));
    let dir = fold_case(resolve_existing_prefix(dir));
    path.starts_with(dir)
}
