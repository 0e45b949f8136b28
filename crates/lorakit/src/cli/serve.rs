//! The `lorakit serve` command.

use clap::Args;
use lorakit_core::Config;

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Bind address (overrides `server.host`)
    #[arg(long)]
    pub host: Option<String>,

    /// Bind port (overrides `server.port`)
    #[arg(short, long)]
    pub port: Option<u16>,
}

pub async fn execute(args: ServeArgs, config: Config) -> anyhow::Result<()> {
    let host = args.host.unwrap_or_else(|| config.server.host.clone());
    let port = args.port.unwrap_or(config.server.port);

    tracing::info!("Model directory: {:?}", config.model_dir());
    tracing::info!("Trainer config directory: {:?}", config.trainer_config_dir());
    crate::server::run(&config, &host, port).await
}
