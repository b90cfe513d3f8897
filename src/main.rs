mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use mediafetch::config::Config;
use mediafetch::{api, observability, tools};
use std::path::PathBuf;

type AnyError = Box<dyn std::error::Error + Send + Sync>;

fn load_config(path: Option<PathBuf>) -> Result<Config, AnyError> {
    let config = match path {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), AnyError> {
    let cli = Cli::parse();
    let log_filter = observability::init_tracing();

    match cli.command {
        Commands::Server(args) => {
            let mut config = load_config(args.config)?;
            if let Some(handle) = &log_filter {
                observability::apply_log_filter(handle, &config.telemetry.log_filter);
            }

            if let Some(address) = args.address {
                config.server.bind_addr = address;
            }
            api::run(config).await?;
        }
        Commands::Check(args) => {
            let config = load_config(args.config)?;
            if let Some(handle) = &log_filter {
                observability::apply_log_filter(handle, &config.telemetry.log_filter);
            }

            let mut healthy = true;
            for (label, result) in [
                ("resolver", tools::resolver_version(&config.resolver.binary)),
                ("transcoder", tools::transcoder_version(&config.transcoder.binary)),
            ] {
                match result {
                    Ok(version) => println!("{label}: ok ({version})"),
                    Err(e) => {
                        healthy = false;
                        println!("{label}: {e}");
                    }
                }
            }

            if !healthy {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
