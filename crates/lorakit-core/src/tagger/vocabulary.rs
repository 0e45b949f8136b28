//! Tag vocabulary loading.
//!
//! A tagger ships a `selected_tags.csv` whose rows line up one-to-one with the
//! classifier's output vector. The usual layout is
//! `tag_id,name,category,count`; the label is the `name` column and the
//! optional `category` column tells rating, character and general tags apart.

use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, Trim};
use serde::Deserialize;

use crate::error::TaggerError;
use crate::types::{TagCategory, TagScore};

/// A single vocabulary label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VocabEntry {
    /// Label as spelled in the tag list (underscores intact)
    pub name: String,
    /// Category from the tag list, or inferred from the label
    pub category: TagCategory,
}

/// One `selected_tags.csv` row. Extra columns such as `count` are ignored.
#[derive(Debug, Deserialize)]
struct Row {
    #[serde(default)]
    tag_id: Option<String>,
    name: String,
    #[serde(default)]
    category: Option<String>,
}

/// Ordered labels, positionally aligned with the classifier output.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    entries: Vec<VocabEntry>,
}

impl Vocabulary {
    /// Load the vocabulary from a tag list file.
    pub fn load(path: &Path, model: &str) -> Result<Self, TaggerError> {
        let load_error = |message: String| TaggerError::ModelLoad {
            model: model.to_string(),
            message,
        };
        let file = std::fs::File::open(path)
            .map_err(|e| load_error(format!("Failed to read {}: {e}", path.display())))?;
        let vocabulary = Self::from_reader(file)
            .map_err(|e| load_error(format!("{}: {e}", path.display())))?;
        if vocabulary.is_empty() {
            return Err(load_error(format!(
                "Tag list {} has no labels",
                path.display()
            )));
        }

        tracing::info!(
            "Loaded vocabulary for {}: {} labels ({} character, {} rating)",
            model,
            vocabulary.len(),
            vocabulary.count(TagCategory::Character),
            vocabulary.count(TagCategory::Rating),
        );
        Ok(vocabulary)
    }

    /// Parse tag list content.
    pub fn parse(content: &str) -> Result<Self, TaggerError> {
        Self::from_reader(content.as_bytes())
    }

    /// Read a tag list with a header row naming at least the `name` column.
    ///
    /// Every row must carry a label: a skipped row would shift all later
    /// labels off their output index. Without a `category` column the
    /// category is inferred from the label text.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, TaggerError> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(Trim::All)
            .from_reader(reader);
        let headers = reader
            .headers()
            .map_err(|e| TaggerError::TagList(e.to_string()))?
            .clone();

        let mut entries = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| TaggerError::TagList(e.to_string()))?;
            let line = record.position().map_or(0, |p| p.line());
            let row: Row = record
                .deserialize(Some(&headers))
                .map_err(|e| TaggerError::TagList(format!("line {line}: {e}")))?;

            if row.name.is_empty() {
                return Err(TaggerError::TagList(format!(
                    "line {line}: empty name (tag_id {})",
                    row.tag_id.as_deref().unwrap_or("?")
                )));
            }
            let category = match row.category.as_deref() {
                Some(code) if !code.is_empty() => TagCategory::from_code(code),
                _ => TagCategory::infer(&row.name),
            };
            entries.push(VocabEntry {
                name: row.name,
                category,
            });
        }

        Ok(Self { entries })
    }

    /// Build a vocabulary from bare labels, inferring categories.
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entries = labels
            .into_iter()
            .map(|label| {
                let name = label.into();
                let category = TagCategory::infer(&name);
                VocabEntry { name, category }
            })
            .collect();
        Self { entries }
    }

    /// Build a vocabulary from explicit entries.
    pub fn from_entries(entries: Vec<VocabEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[VocabEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of labels in `category`.
    pub fn count(&self, category: TagCategory) -> usize {
        self.entries.iter().filter(|e| e.category == category).count()
    }

    /// Pair raw classifier output with labels.
    ///
    /// `raw` must have one score per label; extra or missing scores are
    /// ignored by the zip, so callers check the length first.
    pub fn scores(&self, raw: &[f32]) -> Vec<TagScore> {
        self.entries
            .iter()
            .zip(raw)
            .map(|(entry, &confidence)| {
                TagScore::with_category(entry.name.clone(), confidence, entry.category)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SELECTED_TAGS: &str = "\
tag_id,name,category,count
9999999,general,9,807299
9999998,sensitive,9,3208
470575,1girl,0,4225150
212816,solo,0,3455783
1306397,hatsune_miku,4,114566
";

    #[test]
    fn test_parse_header_and_categories() {
        let vocab = Vocabulary::parse(SELECTED_TAGS).unwrap();
        assert_eq!(vocab.len(), 5);
        assert_eq!(vocab.entries()[0].name, "general");
        assert_eq!(vocab.entries()[0].category, TagCategory::Rating);
        assert_eq!(vocab.entries()[2].name, "1girl");
        assert_eq!(vocab.entries()[2].category, TagCategory::General);
        // Model-supplied category wins even without a qualifier.
        assert_eq!(vocab.entries()[4].category, TagCategory::Character);
        assert_eq!(vocab.count(TagCategory::Rating), 2);
    }

    #[test]
    fn test_parse_without_category_column_infers() {
        let vocab = Vocabulary::parse("tag_id,name\n1,1girl\n2,hatsune_miku_(vocaloid)\n").unwrap();
        assert_eq!(vocab.len(), 2);
        assert_eq!(vocab.entries()[0].category, TagCategory::General);
        assert_eq!(vocab.entries()[1].category, TagCategory::Character);
    }

    #[test]
    fn test_parse_quoted_fields() {
        let vocab =
            Vocabulary::parse("tag_id,name,category\n1,\"a,b\",0\n2,\"say \"\"hi\"\"\",0\n").unwrap();
        assert_eq!(vocab.entries()[0].name, "a,b");
        assert_eq!(vocab.entries()[1].name, "say \"hi\"");
    }

    #[test]
    fn test_empty_name_is_an_error_not_a_skip() {
        let err = Vocabulary::parse("tag_id,name,category,count\n1,1girl,0,5\n123,,0,5\n3,solo,0,5\n")
            .unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, TaggerError::TagList(_)));
        assert!(msg.contains("line 3"), "{msg}");
        assert!(msg.contains("123"), "{msg}");
    }

    #[test]
    fn test_missing_name_column_is_an_error() {
        let err = Vocabulary::parse("1,1girl,0\n2,solo,0\n").unwrap_err();
        assert!(matches!(err, TaggerError::TagList(_)));
    }

    #[test]
    fn test_scores_align_by_position() {
        let vocab = Vocabulary::from_labels(["1girl", "smile"]);
        let scores = vocab.scores(&[0.9, 0.4]);
        assert_eq!(scores[0].label, "1girl");
        assert_eq!(scores[1].confidence, 0.4);
    }

    #[test]
    fn test_load_empty_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("selected_tags.csv");
        std::fs::write(&path, "tag_id,name,category,count\n").unwrap();
        let err = Vocabulary::load(&path, "test/model").unwrap_err();
        assert!(err.to_string().contains("no labels"));
    }
}
