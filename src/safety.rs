//! Classification of archive entry paths before anything is written to disk.

/// Whether an entry path recorded in an archive may be extracted.
///
/// Unsafe when the path is absolute (leading `/` or `\`), contains a NUL byte,
/// or when any segment contains `..` or a `:` drive marker.
pub fn is_safe_path(path: &str) -> bool {
    if path.starts_with('/') || path.starts_with('\\') || path.contains('\0') {
        return false;
    }
    !path
        .split('/')
        .any(|part| part.starts_with('\\') || part.contains("..") || part.contains(':'))
}

/// Every path in `names` that fails [`is_safe_path`], in archive order.
pub fn unsafe_paths<'a, I>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    names
        .into_iter()
        .filter(|name| !is_safe_path(name))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinary_relative_paths_are_safe() {
        for path in ["data/file.txt", "file.txt", "nested/dir/", "a/b/c.zip", "v1.2/x"] {
            assert!(is_safe_path(path), "{path} should be safe");
        }
    }

    #[test]
    fn traversal_is_unsafe() {
        for path in ["../escape.txt", "data/../../etc/passwd", "..", "a/..hidden"] {
            assert!(!is_safe_path(path), "{path} should be unsafe");
        }
    }

    #[test]
    fn absolute_paths_are_unsafe() {
        for path in ["/etc/passwd", "\\windows\\system32", "dir/\\share"] {
            assert!(!is_safe_path(path), "{path} should be unsafe");
        }
    }

    #[test]
    fn drive_letters_are_unsafe() {
        for path in ["C:/Windows/file", "C:file", "dir/d:x"] {
            assert!(!is_safe_path(path), "{path} should be unsafe");
        }
    }

    #[test]
    fn nul_bytes_are_unsafe() {
        assert!(!is_safe_path("bad\0name.txt"));
        assert!(!is_safe_path("dir/\0"));
    }

    #[test]
    fn collects_every_offender() {
        let names = ["ok.txt", "../a", "fine/b.txt", "/abs"];
        assert_eq!(unsafe_paths(names), vec!["../a".to_string(), "/abs".to_string()]);
    }
}
