//! Filesystem scan (spec §3 "File record" / "Scanned folder", §4 "Flow")
//!
//! Walks a root directory into [`FileRecord`]s and [`ScannedFolder`] units. A
//! sub-folder is its own unit and is never silently split across categories
//! (spec "A folder and its files are never split unless the user explicitly
//! requests flatten") — splitting is a Gatekeeper-mediated decision made later,
//! not something the scanner itself does.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use walkdir::WalkDir;

use crate::model::{CoarseType, FileRecord, ScannedFolder};

/// Directory names skipped unconditionally: version-control internals and
/// dependency caches never belong in a user-facing taxonomy.
const DEFAULT_SKIP_DIR_NAMES: &[&str] = &[".git", ".svn", ".hg", "node_modules", "__pycache__", ".venv"];

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("io error walking {path}: {source}")]
    Walk { path: PathBuf, source: walkdir::Error },
    #[error("io error reading metadata for {path}: {source}")]
    Metadata { path: PathBuf, source: std::io::Error },
}

pub type Result<T> = std::result::Result<T, ScanError>;

#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Directory names excluded by exact segment match, in addition to
    /// [`DEFAULT_SKIP_DIR_NAMES`].
    pub extra_skip_dir_names: Vec<String>,
    /// Skip dotfiles (names starting with `.`) at the top level of each
    /// scanned directory.
    pub skip_hidden: bool,
    /// Upper bound on directory recursion depth, `None` for unbounded.
    pub max_depth: Option<usize>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extra_skip_dir_names: Vec::new(),
            skip_hidden: true,
            max_depth: None,
        }
    }
}

fn is_skipped_dir(name: &str, config: &ScanConfig) -> bool {
    if DEFAULT_SKIP_DIR_NAMES.contains(&name) {
        return true;
    }
    if config.extra_skip_dir_names.iter().any(|s| s == name) {
        return true;
    }
    config.skip_hidden && name.starts_with('.')
}

/// Result of scanning one root: every file found, grouped by its immediate
/// parent directory into [`ScannedFolder`] units.
#[derive(Debug, Default)]
pub struct ScanResult {
    pub files: Vec<FileRecord>,
    pub folders: Vec<ScannedFolder>,
}

/// Walk `root`, producing file records and folder-unit groupings. Symlinks are
/// not followed (spec §4.13 reserves symlinks for the organizer's own
/// reversible-move output, not scan input).
pub fn scan(root: &Path, config: &ScanConfig) -> Result<ScanResult> {
    let mut files = Vec::new();
    let mut folder_files: std::collections::HashMap<PathBuf, Vec<usize>> = std::collections::HashMap::new();

    let mut walker = WalkDir::new(root).follow_links(false);
    if let Some(max_depth) = config.max_depth {
        walker = walker.max_depth(max_depth);
    }

    for entry in walker.into_iter().filter_entry(|e| {
        if e.depth() == 0 {
            return true;
        }
        e.file_name()
            .to_str()
            .map(|name| !(e.file_type().is_dir() && is_skipped_dir(name, config)))
            .unwrap_or(true)
    }) {
        let entry = entry.map_err(|e| ScanError::Walk {
            path: e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf()),
            source: e,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path().to_path_buf();
        let metadata = entry.metadata().map_err(|e| ScanError::Metadata {
            path: path.clone(),
            source: e.into(),
        })?;
        let modified_at: DateTime<Utc> = metadata.modified().map(DateTime::<Utc>::from).unwrap_or_else(|_| Utc::now());

        let record = FileRecord::new(path.clone(), metadata.len(), modified_at);
        let parent = path.parent().unwrap_or(root).to_path_buf();
        let index = files.len();
        files.push(record);
        folder_files.entry(parent).or_default().push(index);
    }

    let mut folders: Vec<ScannedFolder> = folder_files
        .into_iter()
        .filter(|(parent, _)| parent != root)
        .map(|(path, indices)| {
            let aggregate_size: u64 = indices.iter().map(|&i| files[i].size).sum();
            let mut type_counts: std::collections::HashMap<CoarseType, usize> = std::collections::HashMap::new();
            for &i in &indices {
                *type_counts.entry(files[i].coarse_type).or_insert(0) += 1;
            }
            let dominant_type = type_counts
                .into_iter()
                .max_by_key(|(_, count)| *count)
                .map(|(t, _)| t)
                .unwrap_or_default();
            ScannedFolder {
                path,
                files: indices.iter().map(|&i| files[i].id).collect(),
                aggregate_size,
                dominant_type,
            }
        })
        .collect();
    folders.sort_by(|a, b| a.path.cmp(&b.path));

    Ok(ScanResult { files, folders })
}
