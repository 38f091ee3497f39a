pub mod config;
pub mod domain;
pub mod download;
pub mod error;
pub mod extract;
pub mod fs_util;
pub mod manifest;
pub mod output;
pub mod progress;
pub mod safety;
pub mod session;
pub mod transport;
pub mod tui;

pub use error::FetchError;
pub use manifest::{Manifest, ManifestEntry};
pub use session::{DownloadSession, SessionOptions};
pub use transport::{ReqwestTransport, Transport};
