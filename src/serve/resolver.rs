//! Path resolution module
//!
//! Lexically joins untrusted request segments onto a trusted directory and
//! checks containment. Nothing here touches the filesystem, so symlinks are
//! followed later exactly as the operating system resolves them.

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use super::error::ServeError;

/// Clean a path lexically: drop `.` and empty segments and resolve `..` by
/// popping, never above the root
pub fn clean(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => cleaned.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if !cleaned.pop() && !cleaned.has_root() {
                    cleaned.push("..");
                }
            }
            Component::Normal(segment) => cleaned.push(segment),
        }
    }
    cleaned
}

/// Join slash-separated untrusted input onto `base` and clean the result
///
/// Leading slashes never make the input absolute: every segment is applied
/// relative to `base`. A segment must be exactly one plain path component on
/// this platform; NUL bytes, drive prefixes and native separators other than
/// `/` are rejected.
pub fn join_clean(base: &Path, untrusted: &str) -> Result<PathBuf, ServeError> {
    let mut joined = clean(base);
    for segment in untrusted.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                joined.pop();
            }
            s if is_plain_segment(s) => joined.push(s),
            _ => {
                return Err(ServeError::PathRejected {
                    path: untrusted.to_string(),
                });
            }
        }
    }
    Ok(joined)
}

fn is_plain_segment(segment: &str) -> bool {
    if segment.contains('\0') {
        return false;
    }
    let mut components = Path::new(segment).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(name)), None) if name == OsStr::new(segment)
    )
}

/// Resolve `relative_path` below `prefix` below `root`
///
/// Returns the candidate path only when both the prefix directory and the
/// candidate stay inside their boundaries.
pub fn resolve(root: &Path, prefix: &str, relative_path: &str) -> Result<PathBuf, ServeError> {
    let root = clean(root);
    let boundary = join_clean(&root, prefix)?;
    if !boundary.starts_with(&root) {
        return Err(ServeError::PathRejected {
            path: boundary.display().to_string(),
        });
    }

    let candidate = join_clean(&boundary, relative_path)?;
    if !candidate.starts_with(&boundary) {
        return Err(ServeError::PathRejected {
            path: candidate.display().to_string(),
        });
    }

    Ok(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean() {
        assert_eq!(clean(Path::new("/app//public/./img")), Path::new("/app/public/img"));
        assert_eq!(clean(Path::new("/app/public/../etc")), Path::new("/app/etc"));
        assert_eq!(clean(Path::new("/../..")), Path::new("/"));
    }

    #[test]
    fn test_resolve_plain_file() {
        let path = resolve(Path::new("/app"), "public", "img/logo.png").unwrap();
        assert_eq!(path, Path::new("/app/public/img/logo.png"));
    }

    #[test]
    fn test_resolve_normalizes_inside_boundary() {
        let path = resolve(Path::new("/app"), "public", "img/../css/./site.css").unwrap();
        assert_eq!(path, Path::new("/app/public/css/site.css"));
    }

    #[test]
    fn test_leading_slash_stays_relative() {
        let path = resolve(Path::new("/app"), "public", "/img/logo.png").unwrap();
        assert_eq!(path, Path::new("/app/public/img/logo.png"));
        let path = resolve(Path::new("/app"), "/public", "//img//logo.png").unwrap();
        assert_eq!(path, Path::new("/app/public/img/logo.png"));
    }

    #[test]
    fn test_traversal_rejected() {
        for attempt in ["../../etc/passwd", "img/../../../etc/passwd", "/../secret", ".."] {
            assert!(
                matches!(
                    resolve(Path::new("/app"), "public", attempt),
                    Err(ServeError::PathRejected { .. })
                ),
                "{attempt} should be rejected"
            );
        }
    }

    #[test]
    fn test_sibling_with_shared_prefix_rejected() {
        // "/app/public2" shares a string prefix with "/app/public" but is outside it
        assert!(matches!(
            resolve(Path::new("/app"), "public", "../public2/file.txt"),
            Err(ServeError::PathRejected { .. })
        ));
    }

    #[test]
    fn test_prefix_escaping_root_rejected() {
        assert!(matches!(
            resolve(Path::new("/app"), "../etc", "passwd"),
            Err(ServeError::PathRejected { .. })
        ));
    }

    #[test]
    fn test_nul_byte_rejected() {
        assert!(matches!(
            resolve(Path::new("/app"), "public", "logo.png\0.txt"),
            Err(ServeError::PathRejected { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_backslash_is_a_plain_character_on_unix() {
        let path = resolve(Path::new("/app"), "public", "..\\..\\etc").unwrap();
        assert_eq!(path, Path::new("/app/public/..\\..\\etc"));
    }

    #[cfg(windows)]
    #[test]
    fn test_native_separators_rejected_on_windows() {
        let root = Path::new(r"C:\app");
        for attempt in [r"..\..\secret.txt", r"img\..\..\..\secret.txt", "C:secret.txt", r"\\server\share"] {
            assert!(
                matches!(
                    resolve(root, "public", attempt),
                    Err(ServeError::PathRejected { .. })
                ),
                "{attempt} should be rejected"
            );
        }
    }

    #[test]
    fn test_plain_segment() {
        assert!(is_plain_segment("logo.png"));
        assert!(is_plain_segment("..."));
        assert!(!is_plain_segment("a\0b"));
    }
}
