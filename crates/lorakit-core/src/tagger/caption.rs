//! Sidecar caption files.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::{Builder, NamedTempFile};

use crate::error::ImageError;
use crate::types::TaggingJobConfig;

use super::selector::dedup;

/// Reads, merges and atomically writes caption files.
#[derive(Debug, Clone)]
pub struct CaptionWriter {
    extension: String,
    separator: String,
    append: bool,
}

impl CaptionWriter {
    pub fn new(extension: impl Into<String>, separator: impl Into<String>, append: bool) -> Self {
        let extension = extension.into();
        Self {
            extension: extension.trim_start_matches('.').to_string(),
            separator: separator.into(),
            append,
        }
    }

    pub fn from_job(config: &TaggingJobConfig) -> Self {
        Self::new(
            config.caption_extension.clone(),
            config.caption_separator.clone(),
            config.append_tags,
        )
    }

    /// Caption path for an image: same stem, caption extension.
    pub fn caption_path(&self, image: &Path) -> PathBuf {
        image.with_extension(&self.extension)
    }

    /// Tags of an existing caption file. A missing file has no tags.
    pub fn read_tags(&self, caption: &Path) -> std::io::Result<Vec<String>> {
        match std::fs::read_to_string(caption) {
            Ok(content) => Ok(split_tags(&content, &self.separator)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// Existing tags keep their order; novel tags follow in their given order.
    pub fn merge(existing: Vec<String>, new: &[String]) -> Vec<String> {
        let mut merged = existing;
        merged.extend(new.iter().cloned());
        dedup(merged)
    }

    /// Write the caption for `image`.
    ///
    /// Returns the number of files modified: 0 when the caption already holds
    /// exactly this content, 1 otherwise. The file is replaced atomically.
    pub fn write(&self, image: &Path, tags: &[String]) -> Result<usize, ImageError> {
        let target = self.caption_path(image);
        let fail = |message: String| ImageError::CaptionWrite {
            path: target.clone(),
            message,
        };

        let tags = if self.append {
            let existing = self
                .read_tags(&target)
                .map_err(|e| fail(format!("Failed to read existing caption: {e}")))?;
            Self::merge(existing, tags)
        } else {
            dedup(tags.to_vec())
        };
        let content = tags.join(&self.separator);

        if let Ok(current) = std::fs::read_to_string(&target) {
            if current == content {
                tracing::trace!("Caption unchanged: {:?}", target);
                return Ok(0);
            }
        }

        let dir = target
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = caption_temp_file(dir).map_err(|e| fail(e.to_string()))?;
        // A rewrite keeps the mode of the caption it replaces.
        if let Ok(meta) = std::fs::metadata(&target) {
            tmp.as_file()
                .set_permissions(meta.permissions())
                .map_err(|e| fail(e.to_string()))?;
        }
        tmp.write_all(content.as_bytes())
            .and_then(|_| tmp.flush())
            .map_err(|e| fail(e.to_string()))?;
        tmp.persist(&target).map_err(|e| fail(e.error.to_string()))?;

        tracing::debug!("Wrote {} tags to {:?}", tags.len(), target);
        Ok(1)
    }
}

/// Temp file for a caption.
///
/// Created as 0666 so the umask decides the final mode, like any file written
/// with `fs::write`. `NamedTempFile::new_in` alone would leave it at 0600.
fn caption_temp_file(dir: &Path) -> std::io::Result<NamedTempFile> {
    let mut builder = Builder::new();
    builder.prefix(".caption");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(std::fs::Permissions::from_mode(0o666));
    }
    builder.tempfile_in(dir)
}

/// Split caption text on the trimmed separator, dropping empty entries.
pub fn split_tags(content: &str, separator: &str) -> Vec<String> {
    let separator = separator.trim();
    let parts: Vec<&str> = if separator.is_empty() {
        content.split_whitespace().collect()
    } else {
        content.split(separator).collect()
    };
    parts
        .into_iter()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}
