//! Declarative field table for the training document.
//!
//! Each entry names an output key, a rule deciding whether the value is
//! meaningfully set, the architectures it applies to, and how to read the
//! value from the request. Values left at the trainer's implicit default are
//! omitted so they never override trainer-side defaults.

use toml::Value;

use super::config::{CrossAttention, ModelType, TrainingConfig};
use super::paths::PathResolver;

/// When a field is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    Always,
    WhenTrue,
    WhenNonzero,
    WhenSet,
    WhenNonEmpty,
}

/// A field value read from the request.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    OptStr(Option<String>),
    /// Filesystem path, written absolute with forward slashes
    Path(Option<String>),
    List(Vec<String>),
}

impl Field {
    /// TOML value for this field under `rule`, if it is written.
    pub fn emit(self, rule: Rule, resolver: &PathResolver) -> Option<Value> {
        let present = match (&self, rule) {
            (_, Rule::Always) => true,
            (Field::Bool(b), Rule::WhenTrue) => *b,
            (Field::Int(i), Rule::WhenNonzero) => *i != 0,
            (Field::Float(f), Rule::WhenNonzero) => *f != 0.0,
            (Field::OptStr(s) | Field::Path(s), Rule::WhenSet) => {
                s.as_deref().is_some_and(|s| !s.trim().is_empty())
            }
            (Field::Str(s), Rule::WhenNonEmpty) => !s.trim().is_empty(),
            (Field::List(l), Rule::WhenNonEmpty) => !l.is_empty(),
            _ => false,
        };
        if !present {
            return None;
        }
        match self {
            Field::Bool(b) => Some(Value::Boolean(b)),
            Field::Int(i) => Some(Value::Integer(i)),
            Field::Float(f) => Some(Value::Float(f)),
            Field::Str(s) => Some(Value::String(s)),
            Field::OptStr(s) => s.map(Value::String),
            Field::Path(p) => p
                .filter(|p| !p.trim().is_empty())
                .map(|p| Value::String(resolver.absolute(&p))),
            Field::List(l) => Some(Value::Array(l.into_iter().map(Value::String).collect())),
        }
    }
}

/// Architectures a field applies to.
#[derive(Debug, Clone, Copy)]
pub enum Gate {
    Any,
    Only(&'static [ModelType]),
}

impl Gate {
    pub fn allows(self, model_type: ModelType) -> bool {
        match self {
            Gate::Any => true,
            Gate::Only(types) => types.contains(&model_type),
        }
    }
}

pub struct FieldRule {
    pub key: &'static str,
    pub rule: Rule,
    pub gate: Gate,
    pub value: fn(&TrainingConfig) -> Field,
}

const SD: &[ModelType] = &[ModelType::Sd15, ModelType::Sd20, ModelType::Sdxl];
const FLUX: &[ModelType] = &[ModelType::Flux];
const SD3: &[ModelType] = &[ModelType::Sd3];
const LUMINA: &[ModelType] = &[ModelType::Lumina];
const T5: &[ModelType] = &[ModelType::Flux, ModelType::Sd3];
const CLIP_L: &[ModelType] = &[ModelType::Flux, ModelType::Sd3];
const AE: &[ModelType] = &[ModelType::Flux, ModelType::Lumina];

macro_rules! field {
    ($key:literal, $rule:ident, $gate:expr, $value:expr) => {
        FieldRule {
            key: $key,
            rule: Rule::$rule,
            gate: $gate,
            value: $value,
        }
    };
}

fn int(v: impl Into<i64>) -> Field {
    Field::Int(v.into())
}

/// Every flat key of the training document except the network section and
/// `dataset_config`.
pub static TRAINING_FIELDS: &[FieldRule] = &[
    // Model
    field!("pretrained_model_name_or_path", Always, Gate::Any, |c| {
        Field::Path(Some(c.pretrained_model_name_or_path.clone()))
    }),
    field!("vae", WhenSet, Gate::Any, |c| Field::Path(c.vae.clone())),
    field!("v2", WhenTrue, Gate::Any, |c| {
        Field::Bool(c.v2 || c.model_type == ModelType::Sd20)
    }),
    field!("v_parameterization", WhenTrue, Gate::Only(SD), |c| {
        Field::Bool(c.v_parameterization)
    }),
    field!("clip_l", WhenSet, Gate::Only(CLIP_L), |c| Field::Path(c.clip_l.clone())),
    field!("clip_g", WhenSet, Gate::Only(SD3), |c| Field::Path(c.clip_g.clone())),
    field!("t5xxl", WhenSet, Gate::Only(T5), |c| Field::Path(c.t5xxl.clone())),
    field!("ae", WhenSet, Gate::Only(AE), |c| Field::Path(c.ae.clone())),
    field!("gemma2", WhenSet, Gate::Only(LUMINA), |c| Field::Path(c.gemma2.clone())),
    field!("network_weights", WhenSet, Gate::Any, |c| {
        Field::Path(c.continue_from.clone())
    }),
    // Output and checkpoints
    field!("output_dir", Always, Gate::Any, |c| Field::Path(Some(c.output_dir.clone()))),
    field!("output_name", WhenNonEmpty, Gate::Any, |c| Field::Str(c.output_name.clone())),
    field!("save_model_as", WhenNonEmpty, Gate::Any, |c| Field::Str(c.save_model_as.clone())),
    field!("save_precision", WhenNonEmpty, Gate::Any, |c| Field::Str(c.save_precision.clone())),
    field!("save_every_n_epochs", WhenNonzero, Gate::Any, |c| int(c.save_every_n_epochs)),
    field!("save_every_n_steps", WhenNonzero, Gate::Any, |c| int(c.save_every_n_steps)),
    field!("save_last_n_epochs", WhenNonzero, Gate::Any, |c| int(c.save_last_n_epochs)),
    field!("save_state", WhenTrue, Gate::Any, |c| Field::Bool(c.save_state)),
    // Schedule
    field!("max_train_epochs", WhenNonzero, Gate::Any, |c| int(c.max_train_epochs)),
    field!("max_train_steps", WhenNonzero, Gate::Any, |c| int(c.max_train_steps)),
    field!("seed", Always, Gate::Any, |c| Field::Int(c.seed)),
    // Precision and memory
    field!("mixed_precision", WhenNonEmpty, Gate::Any, |c| Field::Str(c.mixed_precision.clone())),
    field!("full_fp16", WhenTrue, Gate::Any, |c| Field::Bool(c.full_fp16)),
    field!("full_bf16", WhenTrue, Gate::Any, |c| Field::Bool(c.full_bf16)),
    field!("fp8_base", WhenTrue, Gate::Any, |c| Field::Bool(c.fp8_base)),
    field!("gradient_checkpointing", WhenTrue, Gate::Any, |c| {
        Field::Bool(c.gradient_checkpointing)
    }),
    field!("gradient_accumulation_steps", WhenNonzero, Gate::Any, |c| {
        int(if c.gradient_accumulation_steps > 1 { c.gradient_accumulation_steps } else { 0 })
    }),
    field!("max_grad_norm", WhenNonzero, Gate::Any, |c| Field::Float(c.max_grad_norm)),
    field!("cache_latents", WhenTrue, Gate::Any, |c| Field::Bool(c.cache_latents)),
    field!("cache_latents_to_disk", WhenTrue, Gate::Any, |c| {
        Field::Bool(c.cache_latents_to_disk)
    }),
    field!("cache_text_encoder_outputs", WhenTrue, Gate::Any, |c| {
        Field::Bool(c.cache_text_encoder_outputs)
    }),
    field!("sdpa", WhenTrue, Gate::Any, |c| {
        Field::Bool(c.cross_attention == CrossAttention::Sdpa)
    }),
    field!("xformers", WhenTrue, Gate::Any, |c| {
        Field::Bool(c.cross_attention == CrossAttention::Xformers)
    }),
    field!("max_data_loader_n_workers", WhenNonzero, Gate::Any, |c| {
        int(c.max_data_loader_n_workers)
    }),
    field!("persistent_data_loader_workers", WhenTrue, Gate::Any, |c| {
        Field::Bool(c.persistent_data_loader_workers)
    }),
    field!("lowram", WhenTrue, Gate::Any, |c| Field::Bool(c.lowram)),
    field!("no_half_vae", WhenTrue, Gate::Only(SD), |c| Field::Bool(c.no_half_vae)),
    field!("clip_skip", WhenNonzero, Gate::Only(SD), |c| int(c.clip_skip)),
    field!("prior_loss_weight", Always, Gate::Any, |c| Field::Float(c.prior_loss_weight)),
    // Logging and samples
    field!("logging_dir", WhenSet, Gate::Any, |c| Field::Path(c.logging_dir.clone())),
    field!("log_prefix", WhenSet, Gate::Any, |c| Field::OptStr(c.log_prefix.clone())),
    field!("sample_prompts", WhenSet, Gate::Any, |c| Field::Path(c.sample_prompts.clone())),
    field!("sample_every_n_epochs", WhenNonzero, Gate::Any, |c| {
        int(if c.sample_prompts.is_some() { c.sample_every_n_epochs } else { 0 })
    }),
    field!("sample_sampler", WhenSet, Gate::Any, |c| {
        Field::OptStr(c.sample_prompts.as_ref().map(|_| c.sample_sampler.clone()))
    }),
    // Optimizer and learning rate
    field!("optimizer_type", WhenNonEmpty, Gate::Any, |c| Field::Str(c.optimizer_type.clone())),
    field!("optimizer_args", WhenNonEmpty, Gate::Any, |c| Field::List(c.optimizer_args.clone())),
    field!("unet_lr", Always, Gate::Any, |c| Field::Float(c.unet_lr)),
    field!("text_encoder_lr", WhenNonzero, Gate::Any, |c| {
        Field::Float(if c.network_train_unet_only { 0.0 } else { c.text_encoder_lr })
    }),
    field!("lr_scheduler", WhenNonEmpty, Gate::Any, |c| Field::Str(c.lr_scheduler.clone())),
    field!("lr_warmup_steps", WhenNonzero, Gate::Any, |c| int(c.lr_warmup_steps)),
    field!("lr_scheduler_num_cycles", WhenNonzero, Gate::Any, |c| {
        int(c.lr_scheduler_num_cycles)
    }),
    field!("lr_scheduler_power", WhenNonzero, Gate::Any, |c| Field::Float(c.lr_scheduler_power)),
    field!("lr_scheduler_min_lr_ratio", WhenNonzero, Gate::Any, |c| {
        Field::Float(c.lr_scheduler_min_lr_ratio)
    }),
    // Noise and loss
    field!("noise_offset", WhenNonzero, Gate::Any, |c| Field::Float(c.noise_offset)),
    field!("adaptive_noise_scale", WhenNonzero, Gate::Any, |c| {
        Field::Float(if c.noise_offset != 0.0 { c.adaptive_noise_scale } else { 0.0 })
    }),
    field!("multires_noise_iterations", WhenNonzero, Gate::Any, |c| {
        int(c.multires_noise_iterations)
    }),
    field!("multires_noise_discount", WhenNonzero, Gate::Any, |c| {
        Field::Float(if c.multires_noise_iterations > 0 { c.multires_noise_discount } else { 0.0 })
    }),
    field!("ip_noise_gamma", WhenNonzero, Gate::Any, |c| Field::Float(c.ip_noise_gamma)),
    field!("min_snr_gamma", WhenNonzero, Gate::Any, |c| Field::Float(c.min_snr_gamma)),
    field!("scale_v_pred_loss_like_noise_pred", WhenTrue, Gate::Any, |c| {
        Field::Bool(c.scale_v_pred_loss_like_noise_pred)
    }),
    field!("zero_terminal_snr", WhenTrue, Gate::Any, |c| Field::Bool(c.zero_terminal_snr)),
    field!("debiased_estimation_loss", WhenTrue, Gate::Any, |c| {
        Field::Bool(c.debiased_estimation_loss)
    }),
    field!("loss_type", WhenSet, Gate::Any, |c| Field::OptStr(c.loss_type.clone())),
    field!("huber_c", WhenNonzero, Gate::Any, |c| Field::Float(c.huber_c)),
    // Network scalars
    field!("network_dim", Always, Gate::Any, |c| int(c.network_dim)),
    field!("network_alpha", Always, Gate::Any, |c| Field::Float(c.network_alpha)),
    field!("network_dropout", WhenNonzero, Gate::Any, |c| Field::Float(c.network_dropout)),
    field!("network_train_unet_only", WhenTrue, Gate::Any, |c| {
        Field::Bool(c.network_train_unet_only)
    }),
    field!("network_train_text_encoder_only", WhenTrue, Gate::Any, |c| {
        Field::Bool(c.network_train_text_encoder_only)
    }),
    // Flux
    field!("guidance_scale", Always, Gate::Only(FLUX), |c| Field::Float(c.guidance_scale)),
    field!("timestep_sampling", WhenNonEmpty, Gate::Only(FLUX), |c| {
        Field::Str(c.timestep_sampling.clone())
    }),
    field!("discrete_flow_shift", Always, Gate::Only(FLUX), |c| {
        Field::Float(c.discrete_flow_shift)
    }),
    field!("model_prediction_type", WhenNonEmpty, Gate::Only(FLUX), |c| {
        Field::Str(c.model_prediction_type.clone())
    }),
    field!("sigmoid_scale", WhenNonzero, Gate::Only(FLUX), |c| Field::Float(c.sigmoid_scale)),
    field!("blocks_to_swap", WhenNonzero, Gate::Only(T5), |c| int(c.blocks_to_swap)),
    field!("apply_t5_attn_mask", WhenTrue, Gate::Only(T5), |c| {
        Field::Bool(c.apply_t5_attn_mask)
    }),
    field!("t5xxl_max_token_length", WhenNonzero, Gate::Only(T5), |c| {
        int(c.t5xxl_max_token_length)
    }),
    // SD3
    field!("weighting_scheme", WhenNonEmpty, Gate::Only(SD3), |c| {
        Field::Str(c.weighting_scheme.clone())
    }),
    field!("logit_mean", Always, Gate::Only(SD3), |c| Field::Float(c.logit_mean)),
    field!("logit_std", Always, Gate::Only(SD3), |c| Field::Float(c.logit_std)),
    field!("mode_scale", Always, Gate::Only(SD3), |c| Field::Float(c.mode_scale)),
    // Lumina
    field!("system_prompt", WhenSet, Gate::Only(LUMINA), |c| {
        Field::OptStr(c.system_prompt.clone())
    }),
    field!("use_flash_attn", WhenTrue, Gate::Only(LUMINA), |c| Field::Bool(c.use_flash_attn)),
];

/// Apply the table to a request.
pub fn training_fields(config: &TrainingConfig, resolver: &PathResolver) -> toml::Table {
    let mut table = toml::Table::new();
    for field in TRAINING_FIELDS {
        if !field.gate.allows(config.model_type) {
            continue;
        }
        if let Some(value) = (field.value)(config).emit(field.rule, resolver) {
            table.insert(field.key.to_string(), value);
        }
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn resolver() -> PathResolver {
        PathResolver::new("/work/project", "/opt/sd-scripts")
    }

    fn rule(key: &str) -> &'static FieldRule {
        TRAINING_FIELDS
            .iter()
            .find(|f| f.key == key)
            .unwrap_or_else(|| panic!("no rule for {key}"))
    }

    #[test]
    fn test_keys_are_unique() {
        let keys: HashSet<_> = TRAINING_FIELDS.iter().map(|f| f.key).collect();
        assert_eq!(keys.len(), TRAINING_FIELDS.len());
    }

    #[test]
    fn test_rule_semantics() {
        let r = resolver();
        assert!(Field::Bool(false).emit(Rule::WhenTrue, &r).is_none());
        assert_eq!(Field::Bool(true).emit(Rule::WhenTrue, &r), Some(Value::Boolean(true)));
        assert!(Field::Int(0).emit(Rule::WhenNonzero, &r).is_none());
        assert!(Field::Float(0.0).emit(Rule::WhenNonzero, &r).is_none());
        assert_eq!(Field::Float(0.1).emit(Rule::WhenNonzero, &r), Some(Value::Float(0.1)));
        assert!(Field::OptStr(Some("  ".into())).emit(Rule::WhenSet, &r).is_none());
        assert!(Field::List(vec![]).emit(Rule::WhenNonEmpty, &r).is_none());
        assert_eq!(Field::Int(0).emit(Rule::Always, &r), Some(Value::Integer(0)));
    }

    #[test]
    fn test_large_seed_written_exactly() {
        let config = TrainingConfig {
            seed: i64::MAX,
            ..Default::default()
        };
        let table = training_fields(&config, &resolver());
        assert_eq!(table.get("seed"), Some(&Value::Integer(i64::MAX)));
    }

    #[cfg(unix)]
    #[test]
    fn test_paths_written_absolute() {
        let value = Field::Path(Some("models/../models/base.safetensors".into()))
            .emit(Rule::Always, &resolver());
        assert_eq!(
            value,
            Some(Value::String("/work/project/models/base.safetensors".into()))
        );
    }

    #[test]
    fn test_each_optional_tunable_omitted_at_default() {
        let config = TrainingConfig::default();
        for key in [
            "noise_offset",
            "min_snr_gamma",
            "lr_warmup_steps",
            "save_every_n_steps",
            "max_data_loader_n_workers",
            "clip_skip",
            "network_dropout",
            "huber_c",
            "full_bf16",
            "xformers",
            "gradient_accumulation_steps",
        ] {
            let f = rule(key);
            assert!(
                (f.value)(&config).emit(f.rule, &resolver()).is_none(),
                "{key} should be omitted by default"
            );
        }
    }

    #[test]
    fn test_architecture_gates() {
        let flux = TrainingConfig {
            model_type: ModelType::Flux,
            clip_skip: 2,
            ..Default::default()
        };
        let table = training_fields(&flux, &resolver());
        assert!(table.contains_key("guidance_scale"));
        assert!(table.contains_key("discrete_flow_shift"));
        assert!(!table.contains_key("clip_skip"));
        assert!(!table.contains_key("logit_mean"));

        let sdxl = TrainingConfig {
            model_type: ModelType::Sdxl,
            clip_skip: 2,
            ..Default::default()
        };
        let table = training_fields(&sdxl, &resolver());
        assert_eq!(table.get("clip_skip"), Some(&Value::Integer(2)));
        assert!(!table.contains_key("guidance_scale"));
        assert_eq!(table.get("sdpa"), Some(&Value::Boolean(true)));
    }

    #[test]
    fn test_sd20_sets_v2() {
        let config = TrainingConfig {
            model_type: ModelType::Sd20,
            ..Default::default()
        };
        let table = training_fields(&config, &resolver());
        assert_eq!(table.get("v2"), Some(&Value::Boolean(true)));
    }

    #[test]
    fn test_sampling_keys_need_prompts() {
        let mut config = TrainingConfig {
            sample_every_n_epochs: 2,
            ..Default::default()
        };
        let table = training_fields(&config, &resolver());
        assert!(!table.contains_key("sample_sampler"));
        assert!(!table.contains_key("sample_every_n_epochs"));

        config.sample_prompts = Some("prompts.txt".into());
        let table = training_fields(&config, &resolver());
        assert_eq!(table.get("sample_sampler"), Some(&Value::String("euler_a".into())));
        assert_eq!(table.get("sample_every_n_epochs"), Some(&Value::Integer(2)));
    }
}
