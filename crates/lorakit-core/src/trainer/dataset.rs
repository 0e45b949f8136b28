//! Dataset document: `[general]`, one `[[datasets]]`, one `[[datasets.subsets]]`.

use toml::{Table, Value};

use super::config::TrainingConfig;
use super::paths::PathResolver;

pub fn dataset_document(config: &TrainingConfig, resolver: &PathResolver) -> Table {
    let mut general = Table::new();
    general.insert("shuffle_caption".into(), Value::Boolean(config.shuffle_caption));
    general.insert(
        "caption_extension".into(),
        Value::String(config.caption_extension.clone()),
    );
    if config.keep_tokens > 0 {
        general.insert("keep_tokens".into(), int(config.keep_tokens));
    }

    let mut subset = Table::new();
    subset.insert(
        "image_dir".into(),
        Value::String(resolver.relative_to_trainer(&config.train_data_dir)),
    );
    subset.insert("num_repeats".into(), int(config.num_repeats));
    for (key, on) in [
        ("flip_aug", config.flip_aug),
        ("color_aug", config.color_aug),
        ("random_crop", config.random_crop),
    ] {
        if on {
            subset.insert(key.into(), Value::Boolean(true));
        }
    }
    if config.caption_dropout_rate != 0.0 {
        subset.insert(
            "caption_dropout_rate".into(),
            Value::Float(config.caption_dropout_rate),
        );
    }
    if config.caption_tag_dropout_rate != 0.0 {
        subset.insert(
            "caption_tag_dropout_rate".into(),
            Value::Float(config.caption_tag_dropout_rate),
        );
    }
    if config.caption_dropout_every_n_epochs > 0 {
        subset.insert(
            "caption_dropout_every_n_epochs".into(),
            int(config.caption_dropout_every_n_epochs),
        );
    }

    let mut dataset = Table::new();
    dataset.insert("resolution".into(), resolution(config));
    dataset.insert("batch_size".into(), int(config.train_batch_size));
    dataset.insert("enable_bucket".into(), Value::Boolean(config.enable_bucket));
    if config.enable_bucket {
        dataset.insert("min_bucket_reso".into(), int(config.min_bucket_reso));
        dataset.insert("max_bucket_reso".into(), int(config.max_bucket_reso));
        dataset.insert("bucket_reso_steps".into(), int(config.bucket_reso_steps));
        dataset.insert(
            "bucket_no_upscale".into(),
            Value::Boolean(config.bucket_no_upscale),
        );
    }
    dataset.insert(
        "subsets".into(),
        Value::Array(vec![Value::Table(subset)]),
    );

    let mut document = Table::new();
    document.insert("general".into(), Value::Table(general));
    document.insert("datasets".into(), Value::Array(vec![Value::Table(dataset)]));
    document
}

/// `[w, h]` for explicit-resolution architectures, a single edge otherwise.
///
/// A non-square request keeps its pair on any architecture.
fn resolution(config: &TrainingConfig) -> Value {
    let r = config.resolution;
    if config.model_type.explicit_resolution() || !r.is_square() {
        Value::Array(vec![int(r.width()), int(r.height())])
    } else {
        int(r.width())
    }
}

fn int(v: u32) -> Value {
    Value::Integer(v.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trainer::config::{ModelType, Resolution};

    fn resolver() -> PathResolver {
        PathResolver::new("/work/project", "/work/sd-scripts")
    }

    fn subset(doc: &Table) -> &Table {
        doc["datasets"][0]["subsets"][0].as_table().unwrap()
    }

    #[cfg(unix)]
    #[test]
    fn test_layout() {
        let config = TrainingConfig {
            train_data_dir: "datasets/cat".into(),
            keep_tokens: 1,
            flip_aug: true,
            caption_dropout_rate: 0.05,
            ..Default::default()
        };
        let doc = dataset_document(&config, &resolver());

        assert_eq!(doc["general"]["keep_tokens"].as_integer(), Some(1));
        assert_eq!(doc["general"]["caption_extension"].as_str(), Some(".txt"));
        assert_eq!(doc["datasets"][0]["resolution"].as_integer(), Some(1024));
        assert_eq!(doc["datasets"][0]["min_bucket_reso"].as_integer(), Some(256));

        let subset = subset(&doc);
        assert_eq!(subset["image_dir"].as_str(), Some("../project/datasets/cat"));
        assert_eq!(subset["num_repeats"].as_integer(), Some(10));
        assert_eq!(subset["flip_aug"].as_bool(), Some(true));
        assert!(!subset.contains_key("color_aug"));
        assert!(!subset.contains_key("caption_tag_dropout_rate"));
    }

    #[test]
    fn test_resolution_pair_for_explicit_architectures() {
        let config = TrainingConfig {
            model_type: ModelType::Sdxl,
            ..Default::default()
        };
        let doc = dataset_document(&config, &resolver());
        let pair = doc["datasets"][0]["resolution"].as_array().unwrap();
        assert_eq!(pair, &vec![Value::Integer(1024), Value::Integer(1024)]);

        let config = TrainingConfig {
            resolution: Resolution::Pair([768, 512]),
            ..Default::default()
        };
        let doc = dataset_document(&config, &resolver());
        assert!(doc["datasets"][0]["resolution"].is_array());
    }

    #[test]
    fn test_bucketing_off_omits_bucket_keys() {
        let config = TrainingConfig {
            enable_bucket: false,
            ..Default::default()
        };
        let doc = dataset_document(&config, &resolver());
        let dataset = doc["datasets"][0].as_table().unwrap();
        assert_eq!(dataset["enable_bucket"].as_bool(), Some(false));
        assert!(!dataset.contains_key("min_bucket_reso"));
        assert!(!dataset.contains_key("keep_tokens"));
    }

    #[test]
    fn test_renders_array_of_tables() {
        let doc = dataset_document(&TrainingConfig::default(), &resolver());
        let text = toml::to_string_pretty(&doc).unwrap();
        assert!(text.contains("[general]"));
        assert!(text.contains("[[datasets]]"));
        assert!(text.contains("[[datasets.subsets]]"));
    }
}
