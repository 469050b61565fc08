use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::error::{CoreError, CoreResult};

pub const DEFAULT_EXTENSIONS: &[&str] = &[".ts", ".js", ".tsx", ".jsx", ".css", ".scss", ".html"];
pub const DEFAULT_IGNORED_DIRS: &[&str] = &[
    "node_modules",
    "dist",
    "build",
    ".git",
    ".vscode",
    "coverage",
    "tmp",
    "temp",
    ".next",
    ".nuxt",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    /// Allowed extensions, with leading dot.
    pub extensions: Vec<String>,
    /// Directory names skipped at any depth.
    pub ignored_dirs: Vec<String>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            extensions: DEFAULT_EXTENSIONS.iter().map(|v| v.to_string()).collect(),
            ignored_dirs: DEFAULT_IGNORED_DIRS.iter().map(|v| v.to_string()).collect(),
        }
    }
}

impl ScanOptions {
    fn allows(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
            return false;
        };
        self.extensions
            .iter()
            .any(|allowed| allowed.trim_start_matches('.') == ext)
    }

    fn is_ignored(&self, entry: &DirEntry) -> bool {
        entry.depth() > 0
            && entry.file_type().is_dir()
            && entry
                .file_name()
                .to_str()
                .is_some_and(|name| self.ignored_dirs.iter().any(|ignored| ignored == name))
    }
}

/// Files under `root` with an allowed extension, sorted by path within each
/// directory.
pub fn scan_project(root: &Path, options: &ScanOptions) -> CoreResult<Vec<PathBuf>> {
    let metadata = std::fs::metadata(root)
        .map_err(|err| CoreError::Input(format!("invalid project path {}: {err}", root.display())))?;
    if !metadata.is_dir() {
        return Err(CoreError::Input(format!(
            "project path is not a directory: {}",
            root.display()
        )));
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !options.is_ignored(entry));
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(error = %err, "skipping unreadable entry");
                continue;
            }
        };
        if entry.file_type().is_file() && options.allows(entry.path()) {
            files.push(entry.into_path());
        }
    }

    debug!(root = %root.display(), files = files.len(), "project scanned");
    Ok(files)
}

pub fn language_for_path(path: &Path) -> CoreResult<&'static str> {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let language = match ext.as_str() {
        "ts" | "tsx" => "typescript",
        "js" | "jsx" => "javascript",
        "css" => "css",
        "scss" => "scss",
        "less" => "less",
        "html" => "html",
        "py" => "python",
        _ => return Err(CoreError::UnsupportedLanguage(path.display().to_string())),
    };
    Ok(language)
}
