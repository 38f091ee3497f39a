use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use zip::ZipArchive;

use crate::domain::{ArchiveEntry, archive_stem};
use crate::error::FetchError;
use crate::fs_util;
use crate::progress::{ProgressEvent, ProgressSink, ProgressUnit};
use crate::safety::unsafe_paths;
use crate::session::DownloadSession;
use crate::transport::Transport;

/// One archive being extracted. Frames form an explicit stack so that nesting
/// depth is bounded by configuration rather than by the call stack.
struct Frame {
    archive_path: Utf8PathBuf,
    target_dir: Utf8PathBuf,
    archive: ZipArchive<fs::File>,
    entries: Vec<ArchiveEntry>,
    next: usize,
    nested: bool,
}

impl<T: Transport> DownloadSession<T> {
    /// Extract `archive_path` into `dest` (default: `<root>/<archive stem>`).
    ///
    /// Every entry of an archive is checked before any of them is written. Entries
    /// that are themselves archives are expanded into `<target>/<stem>`, depth
    /// first, and removed afterwards unless archives are kept.
    pub fn extract(
        &self,
        archive_path: &Utf8Path,
        dest: Option<&Utf8Path>,
        sink: &dyn ProgressSink,
    ) -> Result<Utf8PathBuf, FetchError> {
        let target_dir = match dest {
            Some(dir) => dir.to_path_buf(),
            None => self.root.join(archive_stem(archive_path)?),
        };

        let top = self.open_frame(archive_path, &target_dir, false, sink)?;
        let mut stack = vec![top];
        if let Err(err) = self.drain(&mut stack, sink) {
            while let Some(frame) = stack.pop() {
                self.close_frame(frame);
            }
            return Err(err);
        }

        if !self.options.keep_archives {
            fs_util::remove_file_quietly(archive_path);
        }
        Ok(target_dir)
    }

    fn drain(&self, stack: &mut Vec<Frame>, sink: &dyn ProgressSink) -> Result<(), FetchError> {
        while let Some(frame) = stack.last_mut() {
            let Some(entry) = frame.entries.get(frame.next).cloned() else {
                if let Some(done) = stack.pop() {
                    self.close_frame(done);
                }
                continue;
            };
            let index = frame.next;
            frame.next += 1;

            fs_util::extract_entry(
                &frame.archive_path,
                &mut frame.archive,
                index,
                &frame.target_dir,
            )?;
            sink.event(ProgressEvent::Advance {
                unit: ProgressUnit::Entries,
                done: frame.next as u64,
                total: Some(frame.entries.len() as u64),
            });

            if !entry.is_nested_archive() {
                continue;
            }
            let nested_path = frame.target_dir.join(&entry.path);
            let nested_dir = frame.target_dir.join(archive_stem(&nested_path)?);

            if stack.len() >= self.options.max_nesting_depth {
                self.discard_nested(&nested_path);
                return Err(FetchError::NestingTooDeep {
                    path: nested_path.into(),
                    depth: self.options.max_nesting_depth,
                });
            }
            match self.open_frame(&nested_path, &nested_dir, true, sink) {
                Ok(child) => stack.push(child),
                Err(err) => {
                    self.discard_nested(&nested_path);
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    fn open_frame(
        &self,
        archive_path: &Utf8Path,
        target_dir: &Utf8Path,
        nested: bool,
        sink: &dyn ProgressSink,
    ) -> Result<Frame, FetchError> {
        let mut archive = fs_util::open_archive(archive_path)?;
        fs::create_dir_all(target_dir.as_std_path())
            .map_err(|err| FetchError::Filesystem(format!("create {target_dir}: {err}")))?;

        let entries = fs_util::list_entries(archive_path, &mut archive)?;
        let mut offenders = unsafe_paths(entries.iter().map(|entry| entry.path.as_str()));
        for name in fs_util::unenclosed_names(archive_path, &mut archive)? {
            if !offenders.contains(&name) {
                offenders.push(name);
            }
        }
        if !offenders.is_empty() {
            tracing::warn!(archive = %archive_path, count = offenders.len(), "refusing unsafe archive");
            return Err(FetchError::UnsafePath { paths: offenders });
        }

        tracing::debug!(archive = %archive_path, target = %target_dir, entries = entries.len(), "extracting");
        sink.event(ProgressEvent::phase(
            "Extract",
            format!("{} ({} entries)", archive_path, entries.len()),
        ));
        Ok(Frame {
            archive_path: archive_path.to_path_buf(),
            target_dir: target_dir.to_path_buf(),
            archive,
            entries,
            next: 0,
            nested,
        })
    }

    fn close_frame(&self, frame: Frame) {
        let Frame {
            archive_path,
            archive,
            nested,
            ..
        } = frame;
        drop(archive);
        if nested {
            self.discard_nested(&archive_path);
        }
    }

    fn discard_nested(&self, archive_path: &Utf8Path) {
        if !self.options.keep_archives {
            fs_util::remove_file_quietly(archive_path);
        }
    }
}
