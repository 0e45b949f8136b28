//! Rating tag synthesis.
//!
//! The rating tag is not picked by threshold like other labels. Where it comes
//! from depends on the model, so it is a strategy: WD taggers carry a block of
//! rating labels (`general`, `sensitive`, `questionable`, `explicit`) and the
//! highest-scoring one is the image's rating.

use crate::types::{TagCategory, TagScore};

/// Produces at most one rating tag from an image's raw scores.
pub trait RatingStrategy: Send + Sync {
    fn rating(&self, scores: &[TagScore]) -> Option<String>;
}

/// Highest-scoring rating-category label of the model.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelRatingStrategy;

impl RatingStrategy for ModelRatingStrategy {
    fn rating(&self, scores: &[TagScore]) -> Option<String> {
        scores
            .iter()
            .filter(|s| s.category == TagCategory::Rating)
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
            .map(|s| s.label.clone())
    }
}

/// Never emits a rating tag.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRating;

impl RatingStrategy for NoRating {
    fn rating(&self, _scores: &[TagScore]) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_rating_picks_highest() {
        let scores = vec![
            TagScore::with_category("general", 0.2, TagCategory::Rating),
            TagScore::with_category("sensitive", 0.7, TagCategory::Rating),
            TagScore::with_category("1girl", 0.99, TagCategory::General),
        ];
        assert_eq!(
            ModelRatingStrategy.rating(&scores).as_deref(),
            Some("sensitive")
        );
    }

    #[test]
    fn test_model_rating_without_rating_labels() {
        let scores = vec![TagScore::new("1girl", 0.99)];
        assert!(ModelRatingStrategy.rating(&scores).is_none());
        assert!(NoRating.rating(&scores).is_none());
    }
}
