//! Known tagger models.

use std::path::Path;

use super::model::model_exists;

/// A tagger model lorakit knows how to drive.
#[derive(Debug, Clone, Copy)]
pub struct KnownModel {
    /// Identifier, `vendor/name`
    pub id: &'static str,
    /// Short description for listings
    pub label: &'static str,
}

pub const KNOWN_MODELS: &[KnownModel] = &[
    KnownModel {
        id: "SmilingWolf/wd-eva02-large-tagger-v3",
        label: "EVA02 Large v3 (most accurate, slowest)",
    },
    KnownModel {
        id: "SmilingWolf/wd-vit-large-tagger-v3",
        label: "ViT Large v3",
    },
    KnownModel {
        id: "SmilingWolf/wd-vit-tagger-v3",
        label: "ViT v3",
    },
    KnownModel {
        id: "SmilingWolf/wd-swinv2-tagger-v3",
        label: "SwinV2 v3",
    },
    KnownModel {
        id: "SmilingWolf/wd-convnext-tagger-v3",
        label: "ConvNeXT v3",
    },
    KnownModel {
        id: "SmilingWolf/wd-v1-4-moat-tagger-v2",
        label: "MOAT v2",
    },
];

/// Known models paired with whether their artifacts are installed.
pub fn installed(model_dir: &Path) -> Vec<(KnownModel, bool)> {
    KNOWN_MODELS
        .iter()
        .map(|m| (*m, model_exists(model_dir, m.id)))
        .collect()
}
