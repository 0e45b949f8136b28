//! Training request shape.
//!
//! One flat structure grouped by concern. Every field has a serde default so
//! requests only carry what they change. Paths are plain strings: they are
//! resolved against the project root at serialization time.

use serde::{Deserialize, Serialize};

/// Base model architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    #[default]
    Sd15,
    Sd20,
    Sdxl,
    Sd3,
    Flux,
    Lumina,
}

impl ModelType {
    /// Architectures trained at explicit `[width, height]` resolutions.
    pub fn explicit_resolution(self) -> bool {
        matches!(self, Self::Sdxl | Self::Sd3 | Self::Flux | Self::Lumina)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sd15 => "sd15",
            Self::Sd20 => "sd20",
            Self::Sdxl => "sdxl",
            Self::Sd3 => "sd3",
            Self::Flux => "flux",
            Self::Lumina => "lumina",
        }
    }
}

/// Adapter architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LoraType {
    #[default]
    #[serde(rename = "LoRA")]
    Lora,
    #[serde(rename = "LoCon")]
    LoCon,
    #[serde(rename = "LoHa")]
    LoHa,
    #[serde(rename = "LoKr")]
    LoKr,
    #[serde(rename = "DoRA")]
    DoRa,
    #[serde(rename = "Full")]
    Full,
    #[serde(rename = "IA3")]
    Ia3,
    #[serde(rename = "DyLoRA")]
    DyLora,
    #[serde(rename = "GLoRA")]
    GLora,
    #[serde(rename = "Diag-OFT")]
    DiagOft,
    #[serde(rename = "BOFT")]
    Boft,
}

/// Attention backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrossAttention {
    #[default]
    Sdpa,
    Xformers,
    None,
}

/// Training resolution: a square edge or `[width, height]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Resolution {
    Square(u32),
    Pair([u32; 2]),
}

impl Resolution {
    pub fn width(self) -> u32 {
        match self {
            Self::Square(edge) => edge,
            Self::Pair([w, _]) => w,
        }
    }

    pub fn height(self) -> u32 {
        match self {
            Self::Square(edge) => edge,
            Self::Pair([_, h]) => h,
        }
    }

    pub fn is_square(self) -> bool {
        self.width() == self.height()
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::Square(1024)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    // Model
    pub model_type: ModelType,
    pub pretrained_model_name_or_path: String,
    pub vae: Option<String>,
    pub v2: bool,
    pub v_parameterization: bool,
    pub clip_l: Option<String>,
    pub clip_g: Option<String>,
    pub t5xxl: Option<String>,
    pub ae: Option<String>,
    pub gemma2: Option<String>,
    /// Existing adapter weights to continue from
    pub continue_from: Option<String>,

    // Dataset
    pub train_data_dir: String,
    pub resolution: Resolution,
    pub num_repeats: u32,
    pub train_batch_size: u32,
    pub caption_extension: String,
    pub shuffle_caption: bool,
    pub keep_tokens: u32,
    pub flip_aug: bool,
    pub color_aug: bool,
    pub random_crop: bool,
    pub caption_dropout_rate: f64,
    pub caption_tag_dropout_rate: f64,
    pub caption_dropout_every_n_epochs: u32,
    pub enable_bucket: bool,
    pub min_bucket_reso: u32,
    pub max_bucket_reso: u32,
    pub bucket_reso_steps: u32,
    pub bucket_no_upscale: bool,

    // Training
    pub output_dir: String,
    pub output_name: String,
    pub save_model_as: String,
    pub save_precision: String,
    pub save_every_n_epochs: u32,
    pub save_every_n_steps: u32,
    pub save_last_n_epochs: u32,
    pub save_state: bool,
    pub max_train_epochs: u32,
    pub max_train_steps: u32,
    /// Signed so every accepted value fits a TOML integer
    pub seed: i64,
    pub mixed_precision: String,
    pub full_fp16: bool,
    pub full_bf16: bool,
    pub fp8_base: bool,
    pub gradient_checkpointing: bool,
    pub gradient_accumulation_steps: u32,
    pub max_grad_norm: f64,
    pub cache_latents: bool,
    pub cache_latents_to_disk: bool,
    pub cache_text_encoder_outputs: bool,
    pub cross_attention: CrossAttention,
    pub max_data_loader_n_workers: u32,
    pub persistent_data_loader_workers: bool,
    pub lowram: bool,
    pub no_half_vae: bool,
    pub clip_skip: u32,
    pub prior_loss_weight: f64,
    pub logging_dir: Option<String>,
    pub log_prefix: Option<String>,
    pub sample_prompts: Option<String>,
    pub sample_every_n_epochs: u32,
    pub sample_sampler: String,

    // Optimizer and learning rate
    pub optimizer_type: String,
    pub optimizer_args: Vec<String>,
    pub unet_lr: f64,
    pub text_encoder_lr: f64,
    pub lr_scheduler: String,
    pub lr_warmup_steps: u32,
    pub lr_scheduler_num_cycles: u32,
    pub lr_scheduler_power: f64,
    pub lr_scheduler_min_lr_ratio: f64,

    // Noise and loss
    pub noise_offset: f64,
    pub adaptive_noise_scale: f64,
    pub multires_noise_iterations: u32,
    pub multires_noise_discount: f64,
    pub ip_noise_gamma: f64,
    pub min_snr_gamma: f64,
    pub scale_v_pred_loss_like_noise_pred: bool,
    pub zero_terminal_snr: bool,
    pub debiased_estimation_loss: bool,
    pub loss_type: Option<String>,
    pub huber_c: f64,

    // Network
    pub lora_type: LoraType,
    pub network_dim: u32,
    pub network_alpha: f64,
    pub conv_dim: u32,
    pub conv_alpha: f64,
    pub network_dropout: f64,
    pub rank_dropout: f64,
    pub module_dropout: f64,
    pub dylora_unit: u32,
    pub lokr_factor: i32,
    pub use_tucker: bool,
    pub use_scalar: bool,
    pub train_norm: bool,
    pub constraint: f64,
    pub rescaled: bool,
    pub bypass_mode: bool,
    pub network_train_unet_only: bool,
    pub network_train_text_encoder_only: bool,
    /// Appended to `network_args` verbatim
    pub extra_network_args: Vec<String>,

    // Flux
    pub guidance_scale: f64,
    pub timestep_sampling: String,
    pub discrete_flow_shift: f64,
    pub model_prediction_type: String,
    pub sigmoid_scale: f64,
    pub blocks_to_swap: u32,
    pub apply_t5_attn_mask: bool,
    pub t5xxl_max_token_length: u32,

    // SD3
    pub weighting_scheme: String,
    pub logit_mean: f64,
    pub logit_std: f64,
    pub mode_scale: f64,

    // Lumina
    pub system_prompt: Option<String>,
    pub use_flash_attn: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            model_type: ModelType::default(),
            pretrained_model_name_or_path: String::new(),
            vae: None,
            v2: false,
            v_parameterization: false,
            clip_l: None,
            clip_g: None,
            t5xxl: None,
            ae: None,
            gemma2: None,
            continue_from: None,

            train_data_dir: String::new(),
            resolution: Resolution::default(),
            num_repeats: 10,
            train_batch_size: 1,
            caption_extension: ".txt".to_string(),
            shuffle_caption: false,
            keep_tokens: 0,
            flip_aug: false,
            color_aug: false,
            random_crop: false,
            caption_dropout_rate: 0.0,
            caption_tag_dropout_rate: 0.0,
            caption_dropout_every_n_epochs: 0,
            enable_bucket: true,
            min_bucket_reso: 256,
            max_bucket_reso: 2048,
            bucket_reso_steps: 64,
            bucket_no_upscale: false,

            output_dir: String::new(),
            output_name: "lora".to_string(),
            save_model_as: "safetensors".to_string(),
            save_precision: "fp16".to_string(),
            save_every_n_epochs: 1,
            save_every_n_steps: 0,
            save_last_n_epochs: 0,
            save_state: false,
            max_train_epochs: 10,
            max_train_steps: 0,
            seed: 42,
            mixed_precision: "bf16".to_string(),
            full_fp16: false,
            full_bf16: false,
            fp8_base: false,
            gradient_checkpointing: true,
            gradient_accumulation_steps: 1,
            max_grad_norm: 1.0,
            cache_latents: true,
            cache_latents_to_disk: false,
            cache_text_encoder_outputs: false,
            cross_attention: CrossAttention::default(),
            max_data_loader_n_workers: 0,
            persistent_data_loader_workers: false,
            lowram: false,
            no_half_vae: false,
            clip_skip: 0,
            prior_loss_weight: 1.0,
            logging_dir: None,
            log_prefix: None,
            sample_prompts: None,
            sample_every_n_epochs: 0,
            sample_sampler: "euler_a".to_string(),

            optimizer_type: "AdamW8bit".to_string(),
            optimizer_args: Vec::new(),
            unet_lr: 1e-4,
            text_encoder_lr: 5e-5,
            lr_scheduler: "cosine".to_string(),
            lr_warmup_steps: 0,
            lr_scheduler_num_cycles: 0,
            lr_scheduler_power: 0.0,
            lr_scheduler_min_lr_ratio: 0.0,

            noise_offset: 0.0,
            adaptive_noise_scale: 0.0,
            multires_noise_iterations: 0,
            multires_noise_discount: 0.0,
            ip_noise_gamma: 0.0,
            min_snr_gamma: 0.0,
            scale_v_pred_loss_like_noise_pred: false,
            zero_terminal_snr: false,
            debiased_estimation_loss: false,
            loss_type: None,
            huber_c: 0.0,

            lora_type: LoraType::default(),
            network_dim: 16,
            network_alpha: 8.0,
            conv_dim: 0,
            conv_alpha: 0.0,
            network_dropout: 0.0,
            rank_dropout: 0.0,
            module_dropout: 0.0,
            dylora_unit: 4,
            lokr_factor: -1,
            use_tucker: false,
            use_scalar: false,
            train_norm: false,
            constraint: 0.0,
            rescaled: false,
            bypass_mode: false,
            network_train_unet_only: false,
            network_train_text_encoder_only: false,
            extra_network_args: Vec::new(),

            guidance_scale: 1.0,
            timestep_sampling: "sigmoid".to_string(),
            discrete_flow_shift: 3.0,
            model_prediction_type: "raw".to_string(),
            sigmoid_scale: 1.0,
            blocks_to_swap: 0,
            apply_t5_attn_mask: false,
            t5xxl_max_token_length: 0,

            weighting_scheme: "uniform".to_string(),
            logit_mean: 0.0,
            logit_std: 1.0,
            mode_scale: 1.29,

            system_prompt: None,
            use_flash_attn: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: TrainingConfig = serde_json::from_str(
            r#"{"model_type":"flux","lora_type":"Diag-OFT","resolution":[1024,768],"train_data_dir":"data"}"#,
        )
        .unwrap();
        assert_eq!(config.model_type, ModelType::Flux);
        assert_eq!(config.lora_type, LoraType::DiagOft);
        assert_eq!(config.resolution.width(), 1024);
        assert_eq!(config.resolution.height(), 768);
        assert_eq!(config.network_dim, 16);
        assert_eq!(config.cross_attention, CrossAttention::Sdpa);
    }

    #[test]
    fn test_seed_outside_toml_range_is_rejected() {
        let huge = serde_json::from_str::<TrainingConfig>(r#"{"seed": 18446744073709551615}"#);
        assert!(huge.is_err());
        let max: TrainingConfig =
            serde_json::from_str(&format!(r#"{{"seed": {}}}"#, i64::MAX)).unwrap();
        assert_eq!(max.seed, i64::MAX);
    }

    #[test]
    fn test_toml_square_resolution() {
        let config: TrainingConfig = toml::from_str("resolution = 512\nmodel_type = \"sd15\"").unwrap();
        assert_eq!(config.resolution, Resolution::Square(512));
        assert!(!config.model_type.explicit_resolution());
    }
}
