use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::{DEFAULT_CHUNK_SIZE, archive_stem, has_archive_extension};
use crate::error::FetchError;
use crate::fs_util;
use crate::manifest::Manifest;
use crate::progress::{Confirm, ProgressEvent, ProgressSink};
use crate::transport::Transport;

pub const DEFAULT_SAVE_DIR: &str = "downloads";
pub const DEFAULT_CONFIRM_THRESHOLD: u64 = 1024 * 1024 * 1024;
pub const DEFAULT_MAX_NESTING_DEPTH: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Keep archive files on disk once they have been extracted.
    pub keep_archives: bool,
    pub chunk_size: usize,
    /// Downloads larger than this many bytes need an explicit confirmation.
    pub confirm_threshold: u64,
    /// Levels of archives allowed, the top-level archive included.
    pub max_nesting_depth: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            keep_archives: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
            confirm_threshold: DEFAULT_CONFIRM_THRESHOLD,
            max_nesting_depth: DEFAULT_MAX_NESTING_DEPTH,
        }
    }
}

/// Owns a download directory for the duration of one logical fetch.
///
/// Archives are downloaded into the root and extracted into subdirectories
/// named after them. When the session is finalized (explicitly or on drop) and
/// archives are not being kept, any `.zip` left directly in the root is removed.
pub struct DownloadSession<T: Transport> {
    pub(crate) root: Utf8PathBuf,
    pub(crate) options: SessionOptions,
    pub(crate) transport: T,
    finalized: bool,
}

impl<T: Transport> DownloadSession<T> {
    pub fn new(
        root: impl Into<Utf8PathBuf>,
        keep_archives: bool,
        transport: T,
    ) -> Result<Self, FetchError> {
        let options = SessionOptions {
            keep_archives,
            ..SessionOptions::default()
        };
        Self::with_options(root, options, transport)
    }

    pub fn with_options(
        root: impl Into<Utf8PathBuf>,
        options: SessionOptions,
        transport: T,
    ) -> Result<Self, FetchError> {
        if options.chunk_size == 0 {
            return Err(FetchError::InvalidInput(
                "chunk size must be a positive number of bytes".to_string(),
            ));
        }
        if options.max_nesting_depth == 0 {
            return Err(FetchError::InvalidInput(
                "max nesting depth must be at least 1".to_string(),
            ));
        }

        let root = root.into();
        fs::create_dir_all(root.as_std_path()).map_err(|err| match err.kind() {
            io::ErrorKind::PermissionDenied => FetchError::NotWritable(root.clone().into()),
            _ => FetchError::Filesystem(format!("create {root}: {err}")),
        })?;
        tempfile::tempfile_in(root.as_std_path())
            .map_err(|_| FetchError::NotWritable(root.clone().into()))?;

        tracing::debug!(root = %root, keep_archives = options.keep_archives, "session opened");
        Ok(Self {
            root,
            options,
            transport,
            finalized: false,
        })
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Download `url` into the session root and extract it.
    ///
    /// On any failure the downloaded archive and an extraction directory created
    /// by this call are removed before the error is returned wrapped in
    /// [`FetchError::Failure`].
    pub fn download_and_extract(
        &self,
        url: &str,
        dest: Option<&Utf8Path>,
        sink: &dyn ProgressSink,
        confirm: &dyn Confirm,
    ) -> Result<(Utf8PathBuf, Manifest), FetchError> {
        let mut archive = None;
        let mut created_dir = None;
        let result = self.run_pipeline(url, dest, sink, confirm, &mut archive, &mut created_dir);

        result.map_err(|err| {
            tracing::warn!(url, error = %err, "download and extract failed, rolling back");
            sink.event(ProgressEvent::phase("Rollback", "removing partial results"));
            if let Some(path) = archive {
                fs_util::remove_file_quietly(&path);
            }
            if let Some(path) = created_dir {
                fs_util::remove_dir_quietly(&path);
            }
            err.wrap()
        })
    }

    fn run_pipeline(
        &self,
        url: &str,
        dest: Option<&Utf8Path>,
        sink: &dyn ProgressSink,
        confirm: &dyn Confirm,
        archive: &mut Option<Utf8PathBuf>,
        created_dir: &mut Option<Utf8PathBuf>,
    ) -> Result<(Utf8PathBuf, Manifest), FetchError> {
        let zip_path = self.download(url, None, None, sink, confirm)?;
        *archive = Some(zip_path.clone());

        let target_dir = match dest {
            Some(dir) => dir.to_path_buf(),
            None => self.root.join(archive_stem(&zip_path)?),
        };
        *created_dir = outermost_missing(&target_dir);

        let extract_dir = self.extract(&zip_path, Some(&target_dir), sink)?;

        sink.event(ProgressEvent::phase("Report", "collecting extracted files"));
        let manifest = Manifest::scan(&extract_dir)?;
        tracing::info!(dir = %extract_dir, files = manifest.len(), "extraction complete");
        Ok((extract_dir, manifest))
    }

    /// Manifest of `dir`, or of the session root when `dir` is `None`.
    pub fn list_contents(&self, dir: Option<&Utf8Path>) -> Result<Manifest, FetchError> {
        let dir = dir.unwrap_or(self.root.as_path());
        if !dir.as_std_path().is_dir() {
            return Err(FetchError::NotFound(dir.as_std_path().to_path_buf()));
        }
        Manifest::scan(dir)
    }

    /// Discard leftover archives in the root unless they are being kept. Safe to call twice.
    pub fn finalize(&mut self) {
        if self.finalized {
            return;
        }
        self.finalized = true;
        if self.options.keep_archives {
            return;
        }

        let entries = match fs::read_dir(self.root.as_std_path()) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return,
            Err(err) => {
                tracing::warn!(root = %self.root, error = %err, "cannot scan session directory");
                return;
            }
        };
        for entry in entries.flatten() {
            let Ok(path) = Utf8PathBuf::from_path_buf(entry.path()) else {
                continue;
            };
            let is_file = entry.file_type().map(|kind| kind.is_file()).unwrap_or(false);
            if is_file && has_archive_extension(path.as_str()) {
                fs_util::remove_file_quietly(&path);
            }
        }
    }
}

/// Highest ancestor of `dir` (or `dir` itself) that does not exist yet.
fn outermost_missing(dir: &Utf8Path) -> Option<Utf8PathBuf> {
    dir.ancestors()
        .take_while(|ancestor| !ancestor.as_str().is_empty() && !ancestor.as_std_path().exists())
        .last()
        .map(Utf8Path::to_path_buf)
}

impl<T: Transport> Drop for DownloadSession<T> {
    fn drop(&mut self) {
        self.finalize();
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::transport::TransferResponse;

    struct Offline;

    impl Transport for Offline {
        fn open(&self, url: &str) -> Result<TransferResponse, FetchError> {
            Err(FetchError::ConnectionFailure {
                url: url.to_string(),
                message: "offline".to_string(),
            })
        }
    }

    fn temp_root() -> (tempfile::TempDir, Utf8PathBuf) {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().join("downloads")).unwrap();
        (temp, root)
    }

    #[test]
    fn creates_root_directory() {
        let (_temp, root) = temp_root();
        let session = DownloadSession::new(root.clone(), false, Offline).unwrap();
        assert!(root.as_std_path().is_dir());
        assert_eq!(session.root(), root.as_path());
    }

    #[test]
    fn rejects_zero_depth() {
        let (_temp, root) = temp_root();
        let options = SessionOptions {
            max_nesting_depth: 0,
            ..SessionOptions::default()
        };
        let err = DownloadSession::with_options(root, options, Offline).err().unwrap();
        assert_matches!(err, FetchError::InvalidInput(_));
    }

    #[test]
    fn finalize_discards_root_archives_only() {
        let (_temp, root) = temp_root();
        let mut session = DownloadSession::new(root.clone(), false, Offline).unwrap();
        fs::write(root.join("a.zip").as_std_path(), b"x").unwrap();
        fs::write(root.join("B.ZIP").as_std_path(), b"x").unwrap();
        fs::write(root.join("notes.txt").as_std_path(), b"x").unwrap();
        fs::create_dir_all(root.join("sub").as_std_path()).unwrap();
        fs::write(root.join("sub/c.zip").as_std_path(), b"x").unwrap();

        session.finalize();
        session.finalize();

        assert!(!root.join("a.zip").as_std_path().exists());
        assert!(!root.join("B.ZIP").as_std_path().exists());
        assert!(root.join("notes.txt").as_std_path().exists());
        assert!(root.join("sub/c.zip").as_std_path().exists());
    }

    #[test]
    fn drop_keeps_archives_when_asked() {
        let (_temp, root) = temp_root();
        {
            let _session = DownloadSession::new(root.clone(), true, Offline).unwrap();
            fs::write(root.join("a.zip").as_std_path(), b"x").unwrap();
        }
        assert!(root.join("a.zip").as_std_path().exists());
    }

    #[test]
    fn outermost_missing_stops_at_existing_parent() {
        let (_temp, root) = temp_root();
        fs::create_dir_all(root.as_std_path()).unwrap();
        assert_eq!(outermost_missing(&root.join("a/b/c")), Some(root.join("a")));
        assert_eq!(outermost_missing(&root), None);
    }

    #[test]
    fn list_contents_of_missing_dir() {
        let (_temp, root) = temp_root();
        let session = DownloadSession::new(root.clone(), false, Offline).unwrap();
        let err = session.list_contents(Some(&root.join("nope"))).unwrap_err();
        assert_matches!(err, FetchError::NotFound(_));
        assert!(session.list_contents(None).unwrap().is_empty());
    }
}
