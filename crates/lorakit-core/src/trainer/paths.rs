//! Path resolution for trainer documents.
//!
//! The trainer reads forward-slash paths regardless of host OS, and resolves
//! dataset image directories relative to its own working directory.

use std::path::{Component, Path, PathBuf};

/// Resolves request paths against the project root and the trainer directory.
#[derive(Debug, Clone)]
pub struct PathResolver {
    project_root: PathBuf,
    trainer_dir: PathBuf,
}

impl PathResolver {
    pub fn new(project_root: impl Into<PathBuf>, trainer_dir: impl Into<PathBuf>) -> Self {
        let project_root = normalize(&absolutize(&project_root.into()));
        let trainer_dir = project_root.join(trainer_dir.into());
        Self {
            trainer_dir: normalize(&trainer_dir),
            project_root,
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn trainer_dir(&self) -> &Path {
        &self.trainer_dir
    }

    /// Absolute, lexically normalized path for a request value.
    pub fn resolve(&self, raw: &str) -> PathBuf {
        let expanded = shellexpand::tilde(raw.trim());
        normalize(&self.project_root.join(expanded.as_ref()))
    }

    /// `resolve`, rendered with forward slashes.
    pub fn absolute(&self, raw: &str) -> String {
        to_slash(&self.resolve(raw))
    }

    /// Path relative to the trainer directory, with forward slashes.
    ///
    /// Falls back to the absolute path when no relative path exists, such as
    /// across Windows drives.
    pub fn relative_to_trainer(&self, raw: &str) -> String {
        let target = self.resolve(raw);
        match relative_path(&self.trainer_dir, &target) {
            Some(rel) if rel.as_os_str().is_empty() => ".".to_string(),
            Some(rel) => to_slash(&rel),
            None => to_slash(&target),
        }
    }
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

/// Remove `.` and resolve `..` without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Render a path with `/` separators.
pub fn to_slash(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Lexical path from directory `from` to `to`. Both must be normalized.
///
/// `None` when the two do not share a root.
pub fn relative_path(from: &Path, to: &Path) -> Option<PathBuf> {
    let from: Vec<Component> = from.components().collect();
    let to: Vec<Component> = to.components().collect();

    fn root<'a>(c: &[Component<'a>]) -> Vec<Component<'a>> {
        c.iter()
            .take_while(|c| matches!(c, Component::Prefix(_) | Component::RootDir))
            .cloned()
            .collect()
    }
    if root(&from) != root(&to) {
        return None;
    }

    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut rel = PathBuf::new();
    for _ in common..from.len() {
        rel.push("..");
    }
    for component in &to[common..] {
        rel.push(component.as_os_str());
    }
    Some(rel)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(
            normalize(Path::new("/a/./b/../c//d")),
            PathBuf::from("/a/c/d")
        );
        assert_eq!(normalize(Path::new("/..")), PathBuf::from("/"));
        assert_eq!(normalize(Path::new("../x")), PathBuf::from("../x"));
    }

    #[cfg(unix)]
    #[test]
    fn test_relative_to_trainer() {
        let resolver = PathResolver::new("/work/project", "../sd-scripts");
        assert_eq!(resolver.trainer_dir(), Path::new("/work/sd-scripts"));
        assert_eq!(
            resolver.relative_to_trainer("datasets/cat/img"),
            "../project/datasets/cat/img"
        );
        assert_eq!(resolver.relative_to_trainer("/work/sd-scripts"), ".");
        assert_eq!(
            resolver.relative_to_trainer("/work/sd-scripts/train"),
            "train"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_absolute_resolves_against_project_root() {
        let resolver = PathResolver::new("/work/project", "/opt/sd-scripts");
        assert_eq!(resolver.absolute("models/./base.safetensors"), "/work/project/models/base.safetensors");
        assert_eq!(resolver.absolute("/abs/x"), "/abs/x");
    }

    #[test]
    fn test_to_slash() {
        assert_eq!(to_slash(Path::new("a\\b\\c")), "a/b/c");
    }

    #[test]
    fn test_relative_path_needs_shared_root() {
        assert!(relative_path(Path::new("/a"), Path::new("b")).is_none());
    }
}
