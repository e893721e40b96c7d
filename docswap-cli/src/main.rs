mod cli;
mod commands;
mod config;
mod output;

use crate::{
    cli::{Args, Commands},
    commands::CommandExecutor,
    config::AppConfig,
};
use anyhow::Result;
use clap::Parser;
use docswap::{LoggingOptions, init_logging};
use std::process;
use tracing::{debug, error};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = run(args).await {
        error!("Application error: {:#}", e);
        eprintln!("{} {:#}", output::failure("Error:"), e);
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    dotenvy::dotenv().ok();

    let _guard = init_logging(&LoggingOptions {
        filter: None,
        verbose: args.verbose,
        quiet: args.quiet,
        json: args.log_json,
        log_dir: args.log_dir.clone(),
    })?;

    let config = AppConfig::load(args.config.as_deref())?;
    debug!("Loaded configuration: {:?}", config);

    match args.command {
        Commands::Convert {
            inputs,
            to,
            from,
            output,
            options,
            json,
        } => {
            CommandExecutor::new(config)
                .convert(
                    &inputs,
                    &to,
                    from.as_deref(),
                    output.as_deref(),
                    &options,
                    json,
                )
                .await?;
        }

        Commands::Formats { json } => {
            CommandExecutor::new(config).formats(json)?;
        }

        Commands::Engines { json } => {
            CommandExecutor::new(config).engines(json)?;
        }

        Commands::Info { format, to, json } => {
            CommandExecutor::new(config).info(&format, to.as_deref(), json)?;
        }

        Commands::Config { show, reset } => {
            if reset {
                let path = AppConfig::reset(args.config.as_deref())?;
                println!("✓ Configuration reset to defaults ({})", path.display());
            } else if show {
                println!("{}", config.show()?);
            } else {
                println!(
                    "Use --show to display current configuration or --reset to reset to defaults"
                );
            }
        }
    }

    Ok(())
}
