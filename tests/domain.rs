use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};

use xfetcher::domain::{
    ArchiveEntry, DEFAULT_FILENAME, TransferRequest, archive_stem, filename_from_url,
    has_archive_extension,
};
use xfetcher::error::FetchError;
use xfetcher::safety::{is_safe_path, unsafe_paths};

#[test]
fn filename_from_plain_url() {
    assert_eq!(
        filename_from_url("https://example.com/path/to/file.zip").unwrap(),
        "file.zip"
    );
}

#[test]
fn filename_ignores_query_and_fragment() {
    assert_eq!(
        filename_from_url("https://example.com/a/data.zip?token=abc#frag").unwrap(),
        "data.zip"
    );
}

#[test]
fn filename_from_relative_path() {
    assert_eq!(filename_from_url("files/data.zip").unwrap(), "data.zip");
}

#[test]
fn filename_falls_back_to_default() {
    assert_eq!(
        filename_from_url("https://example.com/").unwrap(),
        DEFAULT_FILENAME
    );
    assert_eq!(
        filename_from_url("https://example.com/dir/").unwrap(),
        DEFAULT_FILENAME
    );
}

#[test]
fn filename_rejects_blank_url() {
    let err = filename_from_url("   ").unwrap_err();
    assert_matches!(err, FetchError::InvalidInput(_));
}

#[test]
fn filename_rejects_malformed_url() {
    let err = filename_from_url("http://[::1/data.zip").unwrap_err();
    assert_matches!(err, FetchError::ParseFailure(_));
}

#[test]
fn encoded_separators_cannot_escape() {
    let name = filename_from_url("https://example.com/a%2F..%2Fb.zip").unwrap();
    assert_eq!(name, "a_.._b.zip");
}

#[test]
fn archive_extension_detection() {
    assert!(has_archive_extension("bundle.zip"));
    assert!(has_archive_extension("dir/BUNDLE.ZIP"));
    assert!(!has_archive_extension("bundle.zip.txt"));
    assert!(!has_archive_extension("zip"));
    assert!(!has_archive_extension(".zip"));
}

#[test]
fn archive_stem_strips_extension() {
    assert_eq!(archive_stem(Utf8Path::new("a/b/inner.zip")).unwrap(), "inner");
    assert_matches!(
        archive_stem(Utf8Path::new("/")),
        Err(FetchError::InvalidInput(_))
    );
}

#[test]
fn transfer_request_defaults_filename() {
    let request = TransferRequest::new("https://example.com/x/set.zip", None, 1024).unwrap();
    assert_eq!(request.filename, "set.zip");
    assert_eq!(
        request.destination(Utf8Path::new("downloads")),
        Utf8PathBuf::from("downloads/set.zip")
    );

    let named = TransferRequest::new("https://example.com/x/set.zip", Some("mine.zip"), 1024)
        .unwrap();
    assert_eq!(named.filename, "mine.zip");
}

#[test]
fn transfer_request_rejects_zero_chunk() {
    let err = TransferRequest::new("https://example.com/a.zip", None, 0).unwrap_err();
    assert_matches!(err, FetchError::InvalidInput(_));
}

#[test]
fn nested_archive_entries() {
    let file = ArchiveEntry {
        path: "inner/data.zip".to_string(),
        is_dir: false,
    };
    let dir = ArchiveEntry {
        path: "odd.zip/".to_string(),
        is_dir: true,
    };
    assert!(file.is_nested_archive());
    assert!(!dir.is_nested_archive());
}

#[test]
fn safe_and_unsafe_paths() {
    assert!(is_safe_path("docs/readme.txt"));
    assert!(is_safe_path("a/b/c/"));
    assert!(!is_safe_path("/etc/passwd"));
    assert!(!is_safe_path("\\windows\\system32"));
    assert!(!is_safe_path("../escape.txt"));
    assert!(!is_safe_path("a/../../b"));
    assert!(!is_safe_path("C:/boot.ini"));
}

#[test]
fn unsafe_paths_lists_every_offender() {
    let names = ["ok.txt", "../one", "fine/two.txt", "/three"];
    assert_eq!(
        unsafe_paths(names.iter().copied()),
        vec!["../one".to_string(), "/three".to_string()]
    );
}

#[test]
fn transfer_request_rejects_unsafe_filenames() {
    for name in ["../escape.bin", "/abs.bin", "a/b.bin", "a\\b.bin", ".", "..", "C:evil.bin"] {
        let err = TransferRequest::new("https://example.com/a.zip", Some(name), 1024).unwrap_err();
        assert_matches!(err, FetchError::InvalidInput(_), "{name}");
    }
}
