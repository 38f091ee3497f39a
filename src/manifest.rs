use std::fmt;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::error::FetchError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    pub path: Utf8PathBuf,
    pub bytes: u64,
    pub size: String,
}

impl fmt::Display for ManifestEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.path, self.size)
    }
}

/// Regular files under one directory, relative to it and sorted by path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn scan(root: &Utf8Path) -> Result<Self, FetchError> {
        let mut entries = Vec::new();
        for path in walk_files(root)? {
            let metadata = fs::metadata(path.as_std_path())
                .map_err(|err| FetchError::Filesystem(format!("stat {path}: {err}")))?;
            let relative = path
                .strip_prefix(root)
                .map_err(|err| FetchError::Filesystem(format!("{path}: {err}")))?
                .to_path_buf();
            entries.push(ManifestEntry {
                path: relative,
                bytes: metadata.len(),
                size: human_size(metadata.len()),
            });
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lines(&self) -> Vec<String> {
        self.entries.iter().map(ToString::to_string).collect()
    }
}

/// Binary-unit size with one decimal: `2048` -> `2.0KB`.
pub fn human_size(bytes: u64) -> String {
    let mut value = bytes as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if value < 1024.0 {
            return format!("{value:.1}{unit}");
        }
        value /= 1024.0;
    }
    format!("{value:.1}TB")
}

fn walk_files(root: &Utf8Path) -> Result<Vec<Utf8PathBuf>, FetchError> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = fs::read_dir(dir.as_std_path())
            .map_err(|err| FetchError::Filesystem(format!("read {dir}: {err}")))?;
        for entry in entries {
            let entry = entry.map_err(|err| FetchError::Filesystem(err.to_string()))?;
            let path = Utf8PathBuf::from_path_buf(entry.path()).map_err(|path| {
                FetchError::Filesystem(format!("non-utf8 path: {}", path.display()))
            })?;
            let file_type = entry
                .file_type()
                .map_err(|err| FetchError::Filesystem(format!("stat {path}: {err}")))?;
            if file_type.is_dir() {
                stack.push(path);
            } else if file_type.is_file() {
                files.push(path);
            }
        }
    }
    Ok(files)
}
