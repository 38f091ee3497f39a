use std::io::{self, Write};

use camino::Utf8PathBuf;
use serde::Serialize;

use crate::manifest::Manifest;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchResult {
    pub extract_dir: Utf8PathBuf,
    pub files: Manifest,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadResult {
    pub path: Utf8PathBuf,
    pub is_archive: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractResult {
    pub extract_dir: Utf8PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResult {
    pub dir: Utf8PathBuf,
    pub files: Manifest,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_fetch(result: &FetchResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_download(result: &DownloadResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_extract(result: &ExtractResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_list(result: &ListResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl crate::progress::ProgressSink for JsonOutput {
    fn event(&self, _event: crate::progress::ProgressEvent) {}
}

/// Human-readable listing, one `path (size)` line per file.
pub fn print_manifest(heading: &str, manifest: &Manifest) {
    println!("\n{heading}:");
    for line in manifest.lines() {
        println!("    {line}");
    }
}
