//! Tag selection and post-processing.
//!
//! Turns raw per-label scores into the final ordered caption tags:
//! per-category thresholds, confidence ordering, underscore removal,
//! character tag expansion, undesired-tag removal, replacements, character
//! and always-first ordering, the rating tag, and deduplication.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::types::{RatingMode, TagCategory, TagScore, TaggingJobConfig, ThresholdSet};

use super::rating::RatingStrategy;

/// Labels this short keep their underscores (kaomoji such as `^_^`).
const UNDERSCORE_MIN_LEN: usize = 3;

/// Keep labels at or above their category threshold, most confident first.
///
/// Rating labels never pass; they belong to the rating strategy. Ties keep
/// vocabulary order.
pub fn select_tags(scores: &[TagScore], thresholds: &ThresholdSet) -> Vec<TagScore> {
    let mut selected: Vec<&TagScore> = scores
        .iter()
        .filter(|s| s.category != TagCategory::Rating)
        .filter(|s| s.confidence >= thresholds.effective(s.category))
        .collect();
    selected.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    selected.into_iter().cloned().collect()
}

/// Label with the category it carries through post-processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub label: String,
    pub category: TagCategory,
}

impl Candidate {
    pub fn new(label: impl Into<String>, category: TagCategory) -> Self {
        Self {
            label: label.into(),
            category,
        }
    }
}

impl From<&TagScore> for Candidate {
    fn from(score: &TagScore) -> Self {
        Self::new(score.label.clone(), score.category)
    }
}

/// Result of tagging one image.
#[derive(Debug, Clone)]
pub struct TagOutcome {
    /// Labels that passed the thresholds, with their scores
    pub selected: Vec<TagScore>,
    /// Final caption tags
    pub tags: Vec<String>,
}

/// Applies a job's selection and post-processing rules.
pub struct TagSelector {
    thresholds: ThresholdSet,
    remove_underscore: bool,
    character_tag_expand: bool,
    character_tags_first: bool,
    rating_mode: RatingMode,
    undesired: HashSet<String>,
    replacements: HashMap<String, String>,
    always_first: Vec<String>,
    rating: Arc<dyn RatingStrategy>,
}

impl TagSelector {
    pub fn new(config: &TaggingJobConfig, rating: Arc<dyn RatingStrategy>) -> Self {
        Self {
            thresholds: config.thresholds(),
            remove_underscore: config.remove_underscore,
            character_tag_expand: config.character_tag_expand,
            character_tags_first: config.character_tags_first,
            rating_mode: config.rating_mode,
            undesired: config.undesired_tags.iter().map(|t| normalize(t)).collect(),
            replacements: config
                .tag_replacement
                .iter()
                .map(|(from, to)| (normalize(from), to.trim().to_string()))
                .collect(),
            always_first: config
                .always_first_tags
                .iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
            rating,
        }
    }

    /// Full pipeline for one image's scores.
    pub fn tag(&self, scores: &[TagScore]) -> TagOutcome {
        let selected = select_tags(scores, &self.thresholds);
        let rating = match self.rating_mode {
            RatingMode::None => None,
            _ => self.rating.rating(scores),
        };
        let tags = self.post_process(selected.iter().map(Candidate::from).collect(), rating);
        TagOutcome { selected, tags }
    }

    /// Post-process already selected labels into caption tags.
    ///
    /// Re-running this on its own output with the same rating gives the same
    /// set of tags.
    pub fn post_process(&self, candidates: Vec<Candidate>, rating: Option<String>) -> Vec<String> {
        let mut tags = candidates;

        if self.remove_underscore {
            for tag in &mut tags {
                tag.label = strip_underscores(&tag.label);
            }
        }

        if self.character_tag_expand {
            tags = tags
                .into_iter()
                .flat_map(|tag| match split_character(&tag) {
                    Some((name, series)) => vec![
                        Candidate::new(name, TagCategory::Character),
                        Candidate::new(series, TagCategory::Character),
                    ],
                    None => vec![tag],
                })
                .collect();
        }

        tags.retain(|tag| !self.undesired.contains(&normalize(&tag.label)));

        tags = tags
            .into_iter()
            .filter_map(|tag| match self.replacements.get(&normalize(&tag.label)) {
                Some(target) if target.is_empty() => None,
                Some(target) => Some(Candidate::new(target.clone(), tag.category)),
                None => Some(tag),
            })
            .collect();

        if self.character_tags_first {
            let (characters, rest): (Vec<_>, Vec<_>) = tags
                .into_iter()
                .partition(|tag| tag.category == TagCategory::Character);
            tags = characters;
            tags.extend(rest);
        }

        let mut labels: Vec<String> = self.always_first.clone();
        labels.extend(tags.into_iter().map(|tag| tag.label));

        if let Some(rating) = rating {
            let rating = if self.remove_underscore {
                strip_underscores(&rating)
            } else {
                rating
            };
            match self.rating_mode {
                RatingMode::First => labels.insert(0, rating),
                RatingMode::Last => labels.push(rating),
                RatingMode::None => {}
            }
        }

        dedup(labels)
    }
}

/// Underscores become spaces, except in very short labels.
fn strip_underscores(label: &str) -> String {
    if label.chars().count() > UNDERSCORE_MIN_LEN {
        label.replace('_', " ")
    } else {
        label.to_string()
    }
}

/// Split a character label `name_(series)` into `name` and `series`.
fn split_character(tag: &Candidate) -> Option<(String, String)> {
    if tag.category != TagCategory::Character {
        return None;
    }
    let body = tag.label.trim().strip_suffix(')')?;
    let open = body.rfind('(')?;
    let name = body[..open].trim_end_matches(['_', ' ']);
    let series = body[open + 1..].trim();
    if name.is_empty() || series.is_empty() {
        return None;
    }
    Some((name.to_string(), series.to_string()))
}

/// Comparison key for undesired tags and replacement sources.
fn normalize(label: &str) -> String {
    label.trim().replace('_', " ")
}

/// Drop repeated tags, keeping the first occurrence.
pub fn dedup(tags: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.into_iter()
        .filter(|tag| seen.insert(tag.clone()))
        .collect()
}
