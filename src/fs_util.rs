use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use zip::ZipArchive;

use crate::domain::ArchiveEntry;
use crate::error::FetchError;

pub fn open_archive(zip_path: &Utf8Path) -> Result<ZipArchive<fs::File>, FetchError> {
    let file = fs::File::open(zip_path.as_std_path())
        .map_err(|_| FetchError::InvalidArchive(zip_path.as_std_path().to_path_buf()))?;
    ZipArchive::new(file).map_err(|err| {
        tracing::debug!(path = %zip_path, error = %err, "zip central directory unreadable");
        FetchError::InvalidArchive(zip_path.as_std_path().to_path_buf())
    })
}

pub fn is_archive(zip_path: &Utf8Path) -> bool {
    open_archive(zip_path).is_ok()
}

/// Entries in central-directory order, read without decompressing anything.
pub fn list_entries(
    zip_path: &Utf8Path,
    archive: &mut ZipArchive<fs::File>,
) -> Result<Vec<ArchiveEntry>, FetchError> {
    let mut entries = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let entry = archive
            .by_index_raw(i)
            .map_err(|err| FetchError::Filesystem(format!("read zip {zip_path}: {err}")))?;
        entries.push(ArchiveEntry {
            path: entry.name().to_string(),
            is_dir: entry.is_dir(),
        });
    }
    Ok(entries)
}

/// Names the zip reader itself would refuse to place under a target directory.
pub fn unenclosed_names(
    zip_path: &Utf8Path,
    archive: &mut ZipArchive<fs::File>,
) -> Result<Vec<String>, FetchError> {
    let mut names = Vec::new();
    for i in 0..archive.len() {
        let entry = archive
            .by_index_raw(i)
            .map_err(|err| FetchError::Filesystem(format!("read zip {zip_path}: {err}")))?;
        if entry.enclosed_name().is_none() {
            names.push(entry.name().to_string());
        }
    }
    Ok(names)
}

/// Write entry `index` under `target_dir` and return where it landed.
pub fn extract_entry(
    zip_path: &Utf8Path,
    archive: &mut ZipArchive<fs::File>,
    index: usize,
    target_dir: &Utf8Path,
) -> Result<Utf8PathBuf, FetchError> {
    let mut entry = archive
        .by_index(index)
        .map_err(|err| FetchError::Filesystem(format!("read zip {zip_path}: {err}")))?;
    let relative = entry.enclosed_name().ok_or_else(|| FetchError::UnsafePath {
        paths: vec![entry.name().to_string()],
    })?;
    let relative = Utf8PathBuf::from_path_buf(relative)
        .map_err(|path| FetchError::Filesystem(format!("non-utf8 entry path: {}", path.display())))?;
    let entry_path = target_dir.join(relative);

    if entry.is_dir() {
        fs::create_dir_all(entry_path.as_std_path())
            .map_err(|err| FetchError::Filesystem(format!("create {entry_path}: {err}")))?;
        return Ok(entry_path);
    }

    if let Some(parent) = entry_path.parent() {
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| FetchError::Filesystem(format!("create {parent}: {err}")))?;
    }
    let mut outfile = fs::File::create(entry_path.as_std_path())
        .map_err(|err| FetchError::Filesystem(format!("create {entry_path}: {err}")))?;
    io::copy(&mut entry, &mut outfile)
        .map_err(|err| FetchError::Filesystem(format!("extract {entry_path}: {err}")))?;
    Ok(entry_path)
}

/// Remove a file, treating "already gone" as success. Other failures are logged, not returned.
pub fn remove_file_quietly(path: &Utf8Path) {
    match fs::remove_file(path.as_std_path()) {
        Ok(()) => tracing::debug!(path = %path, "removed file"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => tracing::warn!(path = %path, error = %err, "failed to remove file"),
    }
}

/// Recursive counterpart of [`remove_file_quietly`].
pub fn remove_dir_quietly(path: &Utf8Path) {
    match fs::remove_dir_all(path.as_std_path()) {
        Ok(()) => tracing::debug!(path = %path, "removed directory"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => tracing::warn!(path = %path, error = %err, "failed to remove directory"),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use zip::write::SimpleFileOptions;

    use super::*;

    fn write_zip(path: &Utf8Path, files: &[(&str, &[u8])]) {
        let file = fs::File::create(path.as_std_path()).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        for (name, content) in files {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn garbage_is_not_an_archive() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let path = root.join("fake.zip");
        fs::write(path.as_std_path(), b"definitely not a zip").unwrap();
        assert!(!is_archive(&path));
        assert!(!is_archive(&root.join("missing.zip")));
    }

    #[test]
    fn lists_and_extracts_entries() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let path = root.join("bundle.zip");
        write_zip(&path, &[("a.txt", b"alpha"), ("dir/b.txt", b"beta")]);

        let mut archive = open_archive(&path).unwrap();
        let entries = list_entries(&path, &mut archive).unwrap();
        let names: Vec<_> = entries.iter().map(|entry| entry.path.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "dir/b.txt"]);

        let out = root.join("out");
        let written = extract_entry(&path, &mut archive, 1, &out).unwrap();
        assert_eq!(written, out.join("dir/b.txt"));
        assert_eq!(fs::read(written.as_std_path()).unwrap(), b"beta");
    }

    #[test]
    fn quiet_removal_tolerates_missing_targets() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        remove_file_quietly(&root.join("nope.zip"));
        remove_dir_quietly(&root.join("nope"));
        assert!(root.as_std_path().exists());
    }
}
