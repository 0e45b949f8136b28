//! Image discovery inside a dataset directory.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Finds images with a supported extension.
#[derive(Debug, Clone)]
pub struct FileDiscovery {
    formats: Vec<String>,
    recursive: bool,
}

/// An image found during discovery.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    /// Full path to the file
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
}

impl DiscoveredFile {
    /// File name for progress and error reporting.
    pub fn name(&self) -> String {
        file_name(&self.path)
    }
}

impl FileDiscovery {
    /// `formats` are extensions without the dot; matching ignores case.
    pub fn new(formats: Vec<String>, recursive: bool) -> Self {
        let formats = formats
            .into_iter()
            .map(|f| f.trim_start_matches('.').to_lowercase())
            .collect();
        Self { formats, recursive }
    }

    /// Discover all supported images at a path, sorted by path.
    ///
    /// A file path yields itself when supported. A directory is scanned one
    /// level deep, or fully when recursive.
    pub fn discover(&self, path: &Path) -> Vec<DiscoveredFile> {
        if path.is_file() {
            if self.is_supported(path) {
                if let Ok(meta) = std::fs::metadata(path) {
                    return vec![DiscoveredFile {
                        path: path.to_path_buf(),
                        size: meta.len(),
                    }];
                }
            }
            return vec![];
        }

        let mut walker = WalkDir::new(path).follow_links(true);
        if !self.recursive {
            walker = walker.max_depth(1);
        }

        let mut files: Vec<DiscoveredFile> = walker
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && self.is_supported(e.path()))
            .filter_map(|e| {
                let size = e.metadata().ok()?.len();
                Some(DiscoveredFile {
                    path: e.into_path(),
                    size,
                })
            })
            .collect();

        files.sort_by(|a, b| a.path.cmp(&b.path));
        files
    }

    fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_lowercase();
                self.formats.iter().any(|f| *f == ext)
            })
            .unwrap_or(false)
    }
}

/// Last path component as a string.
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
