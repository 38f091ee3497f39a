use std::fs;
use std::io::{self, Read, Write};

use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::TransferRequest;
use crate::error::FetchError;
use crate::manifest::human_size;
use crate::progress::{Confirm, ProgressEvent, ProgressSink, ProgressUnit};
use crate::session::DownloadSession;
use crate::transport::{Transport, classify_read_error};

impl<T: Transport> DownloadSession<T> {
    /// Stream `url` into the session root and return the written file.
    ///
    /// The filename defaults to the URL's last path segment. An existing file at
    /// the destination is never touched. Bytes go to a scratch file first and are
    /// published under the final name only once the body has been read to the
    /// end, so a failed or cancelled transfer leaves nothing at the destination.
    pub fn download(
        &self,
        url: &str,
        filename: Option<&str>,
        chunk_size: Option<usize>,
        sink: &dyn ProgressSink,
        confirm: &dyn Confirm,
    ) -> Result<Utf8PathBuf, FetchError> {
        let mut request =
            TransferRequest::new(url, filename, chunk_size.unwrap_or(self.options.chunk_size))?;
        let destination = request.destination(&self.root);
        if fs::symlink_metadata(destination.as_std_path()).is_ok() {
            return Err(FetchError::AlreadyExists(destination.into()));
        }

        sink.event(ProgressEvent::phase("Fetch", format!("requesting {}", request.url)));
        let response = self.transport.open(&request.url)?;
        request.total_size = response.total_size;

        if request.total_size > self.options.confirm_threshold {
            let prompt = format!(
                "File size is {}. Continue?",
                human_size(request.total_size)
            );
            if !confirm.confirm(&prompt) {
                tracing::info!(url = %request.url, size = request.total_size, "download declined");
                return Err(FetchError::Cancelled);
            }
        }

        tracing::info!(url = %request.url, destination = %destination, size = request.total_size, "downloading");
        let written = self.stream_to_file(&request, &destination, response.body, sink)?;
        sink.event(ProgressEvent::phase(
            "Fetch",
            format!("downloaded {} ({})", request.filename, human_size(written)),
        ));
        Ok(destination)
    }

    fn stream_to_file(
        &self,
        request: &TransferRequest,
        destination: &Utf8Path,
        mut body: Box<dyn Read + Send>,
        sink: &dyn ProgressSink,
    ) -> Result<u64, FetchError> {
        let mut staging = tempfile::Builder::new()
            .prefix(".xfetch-")
            .suffix(".part")
            .tempfile_in(self.root.as_std_path())
            .map_err(|err| FetchError::Filesystem(format!("create scratch file: {err}")))?;

        let total = (request.total_size > 0).then_some(request.total_size);
        let mut buffer = vec![0u8; request.chunk_size];
        let mut written = 0u64;
        loop {
            let read = match body.read(&mut buffer) {
                Ok(0) => break,
                Ok(read) => read,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    tracing::warn!(url = %request.url, written, error = %err, "transfer interrupted");
                    return Err(classify_read_error(&request.url, &err));
                }
            };
            staging
                .write_all(&buffer[..read])
                .map_err(|err| FetchError::Filesystem(format!("write {destination}: {err}")))?;
            written += read as u64;
            sink.event(ProgressEvent::Advance {
                unit: ProgressUnit::Bytes,
                done: written,
                total,
            });
        }
        drop(body);

        staging
            .flush()
            .map_err(|err| FetchError::Filesystem(format!("write {destination}: {err}")))?;
        staging
            .persist_noclobber(destination.as_std_path())
            .map_err(|err| match err.error.kind() {
                io::ErrorKind::AlreadyExists => {
                    FetchError::AlreadyExists(destination.as_std_path().to_path_buf())
                }
                _ => FetchError::Filesystem(format!("publish {destination}: {}", err.error)),
            })?;
        Ok(written)
    }
}
