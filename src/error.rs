use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum FetchError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("failed to parse URL: {0}")]
    ParseFailure(String),

    #[error("file already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("failed to connect to {url}: {message}")]
    ConnectionFailure { url: String, message: String },

    #[error("download timed out for {url}: {message}")]
    Timeout { url: String, message: String },

    #[error("download failed for {url}: {message}")]
    TransferFailure { url: String, message: String },

    #[error("download cancelled by user")]
    Cancelled,

    #[error("not a valid ZIP file: {}", .0.display())]
    InvalidArchive(PathBuf),

    #[error("potentially dangerous paths in zip: {paths:?}")]
    #[diagnostic(help("entries must be relative paths without `..`, leading separators or drive letters"))]
    UnsafePath { paths: Vec<String> },

    #[error("nested archives exceed the maximum depth of {depth}: {}", .path.display())]
    NestingTooDeep { path: PathBuf, depth: usize },

    #[error("no write permission in directory: {}", .0.display())]
    NotWritable(PathBuf),

    #[error("directory does not exist: {}", .0.display())]
    NotFound(PathBuf),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to read config file at {}", .0.display())]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("failed to download and extract: {source}")]
    Failure {
        #[source]
        source: Box<FetchError>,
    },
}

impl FetchError {
    pub fn wrap(self) -> Self {
        match self {
            already @ FetchError::Failure { .. } => already,
            other => FetchError::Failure {
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, looking through any `Failure` wrapper.
    pub fn root_cause(&self) -> &FetchError {
        match self {
            FetchError::Failure { source } => source.root_cause(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn wrap_keeps_original_cause() {
        let err = FetchError::Cancelled.wrap();
        assert_matches!(err, FetchError::Failure { .. });
        assert_matches!(err.root_cause(), FetchError::Cancelled);
        assert!(err.to_string().contains("download cancelled by user"));
    }

    #[test]
    fn wrap_does_not_nest_twice() {
        let err = FetchError::Cancelled.wrap().wrap();
        let FetchError::Failure { source } = err else {
            panic!("expected failure wrapper");
        };
        assert_matches!(*source, FetchError::Cancelled);
    }
}
