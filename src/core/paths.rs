//! Shared path manipulation utilities.

use std::env;
use std::path::{Component, Path, PathBuf};

/// Resolve a path to an absolute, normalized path.
///
/// If `fs::canonicalize` succeeds (path exists), it is used to resolve symlinks
/// and normalize components. Otherwise the path is made absolute relative to
/// CWD and `..`/`.` components are resolved syntactically.
pub fn resolve_absolute_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
    };

    if let Ok(canonical) = std::fs::canonicalize(&absolute) {
        return canonical;
    }

    normalize_syntactic(&absolute)
}

/// Final path component as raw bytes, used as the name input of node hashes.
///
/// Filesystem roots have no file name and hash with an empty name.
pub fn name_bytes(path: &Path) -> &[u8] {
    path.file_name()
        .map_or(&[][..], |name| name.as_encoded_bytes())
}

/// Whether `path` is `root` itself or lies underneath it.
pub fn is_within(path: &Path, root: &Path) -> bool {
    path.starts_with(root)
}

fn normalize_syntactic(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(..) | Component::RootDir | Component::Normal(_) => {
                components.push(component);
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if let Some(Component::Normal(_)) = components.last() {
                    components.pop();
                }
            }
        }
    }
    components.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_existing_path_canonically() {
        let cwd = env::current_dir().unwrap();
        let resolved = resolve_absolute_path(Path::new("."));
        assert_eq!(resolved, std::fs::canonicalize(&cwd).unwrap());
    }

    #[test]
    #[cfg(unix)]
    fn normalizes_nonexistent_path_syntactically() {
        let input = Path::new("/nonexistent/foo/../bar");
        assert!(std::fs::canonicalize(input).is_err());
        assert_eq!(resolve_absolute_path(input), PathBuf::from("/nonexistent/bar"));
    }

    #[test]
    #[cfg(unix)]
    fn handles_parent_at_root() {
        assert_eq!(normalize_syntactic(Path::new("/../foo")), Path::new("/foo"));
    }

    #[test]
    fn name_bytes_of_root_is_empty() {
        assert!(name_bytes(Path::new("/")).is_empty());
        assert_eq!(name_bytes(Path::new("/data/a.txt")), b"a.txt");
    }

    #[test]
    fn within_is_component_aware() {
        assert!(is_within(Path::new("/data/docs/a.txt"), Path::new("/data/docs")));
        assert!(is_within(Path::new("/data/docs"), Path::new("/data/docs")));
        assert!(!is_within(Path::new("/data/docs2/a.txt"), Path::new("/data/docs")));
    }
}
