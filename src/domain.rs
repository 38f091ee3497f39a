use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use percent_encoding::percent_decode_str;
use serde::Serialize;
use url::Url;

use crate::error::FetchError;
use crate::safety::is_safe_path;

pub const DEFAULT_FILENAME: &str = "downloaded_file.zip";
pub const DEFAULT_CHUNK_SIZE: usize = 8192;
pub const ARCHIVE_EXTENSION: &str = "zip";

/// Derive a local filename from the last path segment of `url`.
///
/// The segment is percent-decoded. URLs without a final segment (`https://host/`,
/// `https://host/dir/`) resolve to [`DEFAULT_FILENAME`]. Bare relative paths such
/// as `files/data.zip` are accepted.
pub fn filename_from_url(url: &str) -> Result<String, FetchError> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(FetchError::InvalidInput("URL must not be empty".to_string()));
    }

    let parsed = match Url::parse(trimmed) {
        Ok(parsed) => parsed,
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse("http://localhost/")
            .and_then(|base| base.join(trimmed))
            .map_err(|err| FetchError::ParseFailure(format!("{trimmed}: {err}")))?,
        Err(err) => return Err(FetchError::ParseFailure(format!("{trimmed}: {err}"))),
    };

    let segment = parsed.path().rsplit('/').next().unwrap_or_default();
    let decoded = percent_decode_str(segment).decode_utf8_lossy();
    let name = decoded.replace(['/', '\\'], "_");

    if name.is_empty() || name == "." || name == ".." {
        return Ok(DEFAULT_FILENAME.to_string());
    }
    Ok(name)
}

/// True when `name` ends in `.zip`, ignoring case.
pub fn has_archive_extension(name: &str) -> bool {
    let file = name.rsplit(['/', '\\']).next().unwrap_or(name);
    file.rsplit_once('.')
        .map(|(stem, ext)| !stem.is_empty() && ext.eq_ignore_ascii_case(ARCHIVE_EXTENSION))
        .unwrap_or(false)
}

/// Base name of an archive with its extension stripped: `data/inner.zip` -> `inner`.
pub fn archive_stem(path: &Utf8Path) -> Result<&str, FetchError> {
    path.file_stem()
        .filter(|stem| !stem.is_empty())
        .ok_or_else(|| FetchError::InvalidInput(format!("archive path has no file name: {path}")))
}

/// A caller-supplied name must stay a single component inside the session root.
fn validate_filename(name: &str) -> Result<String, FetchError> {
    if name == "." || name == ".." || name.contains(['/', '\\']) || !is_safe_path(name) {
        return Err(FetchError::InvalidInput(format!(
            "filename must be a plain file name: {name}"
        )));
    }
    Ok(name.to_string())
}

/// One download call: source, destination name and how to stream it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub url: String,
    pub filename: String,
    pub chunk_size: usize,
    pub total_size: u64,
}

impl TransferRequest {
    pub fn new(url: &str, filename: Option<&str>, chunk_size: usize) -> Result<Self, FetchError> {
        if chunk_size == 0 {
            return Err(FetchError::InvalidInput(
                "chunk size must be a positive number of bytes".to_string(),
            ));
        }
        let filename = match filename.map(str::trim).filter(|name| !name.is_empty()) {
            Some(name) => validate_filename(name)?,
            None => filename_from_url(url)?,
        };
        Ok(Self {
            url: url.trim().to_string(),
            filename,
            chunk_size,
            total_size: 0,
        })
    }

    pub fn destination(&self, root: &Utf8Path) -> Utf8PathBuf {
        root.join(&self.filename)
    }
}

/// An item inside an archive, as recorded in its central directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveEntry {
    pub path: String,
    pub is_dir: bool,
}

impl ArchiveEntry {
    pub fn is_nested_archive(&self) -> bool {
        !self.is_dir && has_archive_extension(&self.path)
    }
}

impl fmt::Display for ArchiveEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}
