//! Core data types shared by the tagging engine and the job orchestrator.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::TaggerError;

/// Category of a vocabulary label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagCategory {
    General,
    Character,
    Rating,
}

impl TagCategory {
    /// Category code used in the tagger's `selected_tags.csv`.
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "9" => Self::Rating,
            "4" => Self::Character,
            _ => Self::General,
        }
    }

    /// Guess the category from the label text alone.
    ///
    /// Heuristic: booru character tags carry a parenthesized series qualifier,
    /// e.g. `hatsune_miku_(vocaloid)`. It never yields `Rating` and it misfires
    /// on general tags that happen to use a qualifier, so a category supplied by
    /// the model always wins over this.
    pub fn infer(label: &str) -> Self {
        let Some(body) = label.trim().strip_suffix(')') else {
            return Self::General;
        };
        match body.rfind('(') {
            Some(open) if open > 0 && open + 1 < body.len() => {
                let name = body[..open].trim_end_matches(['_', ' ']);
                if name.chars().any(|c| c.is_alphanumeric()) {
                    Self::Character
                } else {
                    Self::General
                }
            }
            _ => Self::General,
        }
    }
}

/// A label with the classifier's confidence for one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagScore {
    /// Vocabulary label, as spelled in the model's tag list
    pub label: String,

    /// Confidence in [0, 1]
    pub confidence: f32,

    /// Category of the label
    pub category: TagCategory,
}

impl TagScore {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        let label = label.into();
        let category = TagCategory::infer(&label);
        Self {
            label,
            confidence,
            category,
        }
    }

    pub fn with_category(label: impl Into<String>, confidence: f32, category: TagCategory) -> Self {
        Self {
            label: label.into(),
            confidence,
            category,
        }
    }
}

/// Per-category confidence floors.
///
/// An unset category threshold falls back to `overall`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSet {
    pub overall: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub general: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character: Option<f32>,
}

impl Default for ThresholdSet {
    fn default() -> Self {
        Self::overall(0.35)
    }
}

impl ThresholdSet {
    pub fn overall(threshold: f32) -> Self {
        Self {
            overall: threshold,
            general: None,
            character: None,
        }
    }

    /// Threshold that applies to labels of `category`.
    pub fn effective(&self, category: TagCategory) -> f32 {
        match category {
            TagCategory::Character => self.character.unwrap_or(self.overall),
            _ => self.general.unwrap_or(self.overall),
        }
    }

    fn validate(&self) -> Result<(), TaggerError> {
        let in_range = |t: f32| (0.0..=1.0).contains(&t);
        if !in_range(self.overall) {
            return Err(TaggerError::InvalidRequest(
                "threshold must be between 0.0 and 1.0".into(),
            ));
        }
        if self.general.is_some_and(|t| !in_range(t)) {
            return Err(TaggerError::InvalidRequest(
                "general_threshold must be between 0.0 and 1.0".into(),
            ));
        }
        if self.character.is_some_and(|t| !in_range(t)) {
            return Err(TaggerError::InvalidRequest(
                "character_threshold must be between 0.0 and 1.0".into(),
            ));
        }
        Ok(())
    }
}

/// Where the synthesized rating tag goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RatingMode {
    #[default]
    None,
    First,
    Last,
}

/// Everything one tagging job needs. Immutable once the job starts.
///
/// Deserializes from the tagging request body; every field except
/// `dataset_dir` has a default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaggingJobConfig {
    /// Dataset directory to scan
    pub dataset_dir: PathBuf,

    /// Tagger model identifier (vendor/name)
    pub model: String,

    /// Overall confidence threshold
    pub threshold: f32,

    /// Threshold for general labels (falls back to `threshold`)
    pub general_threshold: Option<f32>,

    /// Threshold for character labels (falls back to `threshold`)
    pub character_threshold: Option<f32>,

    /// Caption file extension, e.g. ".txt"
    pub caption_extension: String,

    /// Separator between tags in caption files
    pub caption_separator: String,

    /// Labels that are never written
    pub undesired_tags: Vec<String>,

    /// Label -> replacement; an empty replacement drops the label
    pub tag_replacement: HashMap<String, String>,

    /// Tags placed at the front of every caption, in this order
    pub always_first_tags: Vec<String>,

    /// Move character labels ahead of general ones
    pub character_tags_first: bool,

    /// Where to put the rating tag
    pub rating_mode: RatingMode,

    /// Replace underscores with spaces (labels longer than 3 chars)
    pub remove_underscore: bool,

    /// Split `name_(series)` into `name` and `series`
    pub character_tag_expand: bool,

    /// Merge with existing caption files instead of overwriting them
    pub append_tags: bool,

    /// Descend into subdirectories
    pub recursive: bool,

    /// Images per inference call
    pub batch_size: usize,

    /// Concurrent preprocessing workers
    pub worker_count: usize,

    /// Log every image's tags with confidences
    pub debug: bool,
}

impl Default for TaggingJobConfig {
    fn default() -> Self {
        Self {
            dataset_dir: PathBuf::new(),
            model: "SmilingWolf/wd-vit-large-tagger-v3".to_string(),
            threshold: 0.35,
            general_threshold: None,
            character_threshold: None,
            caption_extension: ".txt".to_string(),
            caption_separator: ", ".to_string(),
            undesired_tags: Vec::new(),
            tag_replacement: HashMap::new(),
            always_first_tags: Vec::new(),
            character_tags_first: false,
            rating_mode: RatingMode::None,
            remove_underscore: false,
            character_tag_expand: false,
            append_tags: false,
            recursive: false,
            batch_size: 1,
            worker_count: 4,
            debug: false,
        }
    }
}

impl TaggingJobConfig {
    /// Job config seeded from the `[tagging]` section of the app config.
    pub fn from_defaults(defaults: &crate::config::TaggingDefaults) -> Self {
        Self {
            model: defaults.model.clone(),
            threshold: defaults.threshold,
            caption_extension: defaults.caption_extension.clone(),
            caption_separator: defaults.caption_separator.clone(),
            batch_size: defaults.batch_size,
            worker_count: defaults.worker_count,
            ..Self::default()
        }
    }

    pub fn thresholds(&self) -> ThresholdSet {
        ThresholdSet {
            overall: self.threshold,
            general: self.general_threshold,
            character: self.character_threshold,
        }
    }

    /// Reject requests that cannot start a job.
    pub fn validate(&self) -> Result<(), TaggerError> {
        if self.dataset_dir.as_os_str().is_empty() {
            return Err(TaggerError::InvalidRequest(
                "dataset_dir is required".into(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(TaggerError::InvalidRequest("model is required".into()));
        }
        self.thresholds().validate()?;
        if self.caption_extension.trim_start_matches('.').is_empty() {
            return Err(TaggerError::InvalidRequest(
                "caption_extension must not be empty".into(),
            ));
        }
        if self.batch_size == 0 {
            return Err(TaggerError::InvalidRequest(
                "batch_size must be > 0".into(),
            ));
        }
        if self.worker_count == 0 {
            return Err(TaggerError::InvalidRequest(
                "worker_count must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Parse a comma-separated tag list, trimming blanks.
pub fn parse_tag_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse `source,target;source2,target2` into a replacement map.
///
/// `\,` and `\;` escape literal separators inside a tag.
pub fn parse_tag_replacement(raw: &str) -> Result<HashMap<String, String>, TaggerError> {
    let mut map = HashMap::new();
    for pair in split_escaped(raw, ';') {
        if pair.trim().is_empty() {
            continue;
        }
        let parts = split_escaped(&pair, ',');
        if parts.len() != 2 {
            return Err(TaggerError::InvalidRequest(format!(
                "tag replacement must be `source,target`, got {pair:?}"
            )));
        }
        let source = unescape(parts[0].trim());
        if source.is_empty() {
            return Err(TaggerError::InvalidRequest(format!(
                "tag replacement source is empty in {pair:?}"
            )));
        }
        map.insert(source, unescape(parts[1].trim()));
    }
    Ok(map)
}

/// Split on `sep`, leaving escaped separators (and their backslash) in place.
fn split_escaped(raw: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek() {
                current.push(c);
                current.push(next);
                chars.next();
                continue;
            }
        }
        if c == sep {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    parts.push(current);
    parts
}

fn unescape(s: &str) -> String {
    s.replace("\\,", ",").replace("\\;", ";")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_category_character() {
        assert_eq!(
            TagCategory::infer("hatsune_miku_(vocaloid)"),
            TagCategory::Character
        );
        assert_eq!(
            TagCategory::infer("artoria pendragon (fate)"),
            TagCategory::Character
        );
    }

    #[test]
    fn test_infer_category_general() {
        assert_eq!(TagCategory::infer("1girl"), TagCategory::General);
        assert_eq!(TagCategory::infer(":)"), TagCategory::General);
        assert_eq!(TagCategory::infer("(9)"), TagCategory::General);
        assert_eq!(TagCategory::infer("smile()"), TagCategory::General);
    }

    #[test]
    fn test_category_codes() {
        assert_eq!(TagCategory::from_code("9"), TagCategory::Rating);
        assert_eq!(TagCategory::from_code("4"), TagCategory::Character);
        assert_eq!(TagCategory::from_code("0"), TagCategory::General);
        assert_eq!(TagCategory::from_code("3"), TagCategory::General);
    }

    #[test]
    fn test_effective_threshold_fallback() {
        let t = ThresholdSet::overall(0.35);
        assert_eq!(t.effective(TagCategory::General), 0.35);
        assert_eq!(t.effective(TagCategory::Character), 0.35);

        let t = ThresholdSet {
            overall: 0.35,
            general: Some(0.5),
            character: Some(0.85),
        };
        assert_eq!(t.effective(TagCategory::General), 0.5);
        assert_eq!(t.effective(TagCategory::Character), 0.85);
    }

    #[test]
    fn test_job_config_from_json_uses_defaults() {
        let config: TaggingJobConfig =
            serde_json::from_str(r#"{"dataset_dir": "/data/set", "rating_mode": "last"}"#)
                .unwrap();
        assert_eq!(config.dataset_dir, PathBuf::from("/data/set"));
        assert_eq!(config.caption_separator, ", ");
        assert_eq!(config.caption_extension, ".txt");
        assert_eq!(config.rating_mode, RatingMode::Last);
        assert_eq!(config.batch_size, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_job_config_requires_dataset_dir() {
        let config = TaggingJobConfig::default();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("dataset_dir"));
    }

    #[test]
    fn test_job_config_rejects_bad_character_threshold() {
        let config = TaggingJobConfig {
            dataset_dir: PathBuf::from("/data"),
            character_threshold: Some(1.2),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("character_threshold"));
    }

    #[test]
    fn test_parse_tag_list() {
        assert_eq!(
            parse_tag_list(" 1girl, solo ,, smile"),
            vec!["1girl", "solo", "smile"]
        );
    }

    #[test]
    fn test_parse_tag_replacement() {
        let map = parse_tag_replacement("1girl,girl;smile,;a\\,b,c").unwrap();
        assert_eq!(map.get("1girl").map(String::as_str), Some("girl"));
        assert_eq!(map.get("smile").map(String::as_str), Some(""));
        assert_eq!(map.get("a,b").map(String::as_str), Some("c"));
    }

    #[test]
    fn test_parse_tag_replacement_rejects_missing_target() {
        assert!(parse_tag_replacement("lonely").is_err());
    }
}
