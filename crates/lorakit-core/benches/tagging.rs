//! Benchmarks for the tagging hot path.
//!
//! Run with: cargo bench -p lorakit-core

use std::collections::HashMap;
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::DynamicImage;
use lorakit_core::tagger::preprocess::preprocess;
use lorakit_core::tagger::{ModelRatingStrategy, TagSelector};
use lorakit_core::types::{TagCategory, TagScore, TaggingJobConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn benchmark_preprocess(c: &mut Criterion) {
    let img = DynamicImage::new_rgb8(1920, 1080);

    c.bench_function("preprocess_448", |b| {
        b.iter(|| preprocess(black_box(&img), 448))
    });
}

/// Score vector shaped like a WD tagger: 4 ratings, ~10k labels.
fn scores() -> Vec<TagScore> {
    let mut rng = StdRng::seed_from_u64(7);
    let mut scores: Vec<TagScore> = ["general", "sensitive", "questionable", "explicit"]
        .iter()
        .map(|r| TagScore::with_category(*r, rng.gen(), TagCategory::Rating))
        .collect();
    for i in 0..10_000 {
        let category = if i % 5 == 0 {
            TagCategory::Character
        } else {
            TagCategory::General
        };
        let confidence: f32 = rng.gen::<f32>().powi(6);
        scores.push(TagScore::with_category(format!("label_{i}_(series)"), confidence, category));
    }
    scores
}

fn benchmark_selection(c: &mut Criterion) {
    let scores = scores();
    let config = TaggingJobConfig {
        remove_underscore: true,
        character_tag_expand: true,
        character_tags_first: true,
        undesired_tags: vec!["label_10_(series)".into()],
        tag_replacement: HashMap::from([("label_20 (series)".into(), "replaced".into())]),
        always_first_tags: vec!["masterpiece".into()],
        ..Default::default()
    };
    let selector = TagSelector::new(&config, Arc::new(ModelRatingStrategy));

    c.bench_function("select_and_post_process", |b| {
        b.iter(|| selector.tag(black_box(&scores)))
    });
}

criterion_group!(benches, benchmark_preprocess, benchmark_selection);
criterion_main!(benches);
