//! `network_module` / `network_args` per adapter type.

use super::config::{LoraType, ModelType, TrainingConfig};

/// LyCORIS entry point.
const LYCORIS_MODULE: &str = "lycoris.kohya";

/// Network section of the training document.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkSpec {
    pub module: String,
    pub args: Vec<String>,
}

/// Map the request's adapter type to its module and argument list.
pub fn network_spec(config: &TrainingConfig) -> NetworkSpec {
    let mut args = Vec::new();
    let module = match config.lora_type {
        LoraType::Lora => {
            push_conv(&mut args, config);
            push_dropout(&mut args, config);
            lora_module(config.model_type)
        }
        LoraType::DyLora => {
            args.push(format!("unit={}", config.dylora_unit));
            push_conv(&mut args, config);
            push_dropout(&mut args, config);
            "networks.dylora"
        }
        lycoris => {
            args.push(format!("algo={}", algo(lycoris)));
            match lycoris {
                LoraType::LoKr => args.push(format!("factor={}", config.lokr_factor)),
                LoraType::DoRa => args.push("dora_wd=True".to_string()),
                LoraType::Ia3 => args.push("train_on_input=True".to_string()),
                LoraType::DiagOft | LoraType::Boft => {
                    if config.constraint != 0.0 {
                        args.push(format!("constraint={}", config.constraint));
                    }
                    if config.rescaled {
                        args.push("rescaled=True".to_string());
                    }
                }
                _ => {}
            }
            push_conv(&mut args, config);
            push_dropout(&mut args, config);
            push_flag(&mut args, "use_tucker", config.use_tucker);
            push_flag(&mut args, "use_scalar", config.use_scalar);
            push_flag(&mut args, "train_norm", config.train_norm);
            push_flag(&mut args, "bypass_mode", config.bypass_mode);
            LYCORIS_MODULE
        }
    };

    args.extend(
        config
            .extra_network_args
            .iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty()),
    );

    NetworkSpec {
        module: module.to_string(),
        args,
    }
}

fn lora_module(model_type: ModelType) -> &'static str {
    match model_type {
        ModelType::Flux => "networks.lora_flux",
        ModelType::Sd3 => "networks.lora_sd3",
        ModelType::Lumina => "networks.lora_lumina",
        ModelType::Sd15 | ModelType::Sd20 | ModelType::Sdxl => "networks.lora",
    }
}

fn algo(lora_type: LoraType) -> &'static str {
    match lora_type {
        LoraType::LoCon | LoraType::DoRa => "locon",
        LoraType::LoHa => "loha",
        LoraType::LoKr => "lokr",
        LoraType::Full => "full",
        LoraType::Ia3 => "ia3",
        LoraType::GLora => "glora",
        LoraType::DiagOft => "diag-oft",
        LoraType::Boft => "boft",
        LoraType::Lora | LoraType::DyLora => "lora",
    }
}

fn push_conv(args: &mut Vec<String>, config: &TrainingConfig) {
    if config.conv_dim > 0 {
        args.push(format!("conv_dim={}", config.conv_dim));
        args.push(format!("conv_alpha={}", config.conv_alpha));
    }
}

fn push_dropout(args: &mut Vec<String>, config: &TrainingConfig) {
    if config.rank_dropout != 0.0 {
        args.push(format!("rank_dropout={}", config.rank_dropout));
    }
    if config.module_dropout != 0.0 {
        args.push(format!("module_dropout={}", config.module_dropout));
    }
}

fn push_flag(args: &mut Vec<String>, key: &str, on: bool) {
    if on {
        args.push(format!("{key}=True"));
    }
}
