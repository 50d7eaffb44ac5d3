mod cli;
mod commands;
mod config;
mod error;
mod output;

use crate::{
    cli::{Args, Commands},
    commands::CommandExecutor,
    config::AppConfig,
    error::{CliError, Result},
};
use clap::Parser;
#[cfg(feature = "colored-output")]
use colored::*;
use std::process;
use tracing::{Level, error};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let json_output = args.command.output().is_some_and(|f| f.is_json());

    if let Err(e) = run(args).await {
        if json_output {
            let error_json = serde_json::json!({
                "status": "error",
                "message": e.to_string(),
            });
            println!("{error_json}");
        } else {
            error!("Application error: {}", e);
            #[cfg(feature = "colored-output")]
            {
                eprintln!("{} {}", "Error:".red().bold(), e);
            }
            #[cfg(not(feature = "colored-output"))]
            {
                eprintln!("Error: {}", e);
            }
        }
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    init_logging(args.verbose, args.quiet, args.log_json)?;

    let config = AppConfig::load(args.config.as_deref())?;

    let mut platform = config.platform.clone();
    for (platform_id, cookie) in args.cookies() {
        platform = platform.with_cookie(platform_id, cookie);
    }
    if let Some(timeout) = args.timeout {
        platform.request_timeout_secs = timeout;
    }
    if let Some(user_agent) = &args.user_agent {
        platform.user_agent = Some(user_agent.clone());
    }

    match args.command {
        Commands::Config { show, reset } => {
            if reset {
                AppConfig::reset(args.config.as_deref())?;
                println!("✓ Configuration reset to defaults");
            } else if show {
                println!("{}", config.show()?);
            } else {
                println!(
                    "Use --show to display current configuration or --reset to reset to defaults"
                );
            }
            return Ok(());
        }
        Commands::Completions { shell } => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Args::command();
            let bin_name = cmd.get_name().to_string();
            generate(shell, &mut cmd, bin_name, &mut std::io::stdout());
            return Ok(());
        }
        _ => {}
    }

    let executor = CommandExecutor::new(
        &platform,
        config.output_format,
        config.colored_output,
        config.interactive,
    )?;

    match args.command {
        Commands::Sites { output } => executor.list_sites(output)?,
        Commands::Categories { platform, output } => {
            executor.list_categories(&platform, output).await?
        }
        Commands::Rooms {
            platform,
            id,
            parent,
            page,
            output,
        } => {
            executor
                .list_category_rooms(&platform, &id, &parent, page, output)
                .await?
        }
        Commands::Recommend {
            platform,
            page,
            output,
        } => executor.recommend(&platform, page, output).await?,
        Commands::Search {
            platform,
            keyword,
            anchors,
            page,
            output,
        } => {
            executor
                .search(&platform, &keyword, anchors, page, output)
                .await?
        }
        Commands::Detail { room, output } => executor.detail(&room, output).await?,
        Commands::Qualities { room, output } => executor.qualities(&room, output).await?,
        Commands::Play {
            room,
            quality,
            auto_select,
            output,
        } => {
            executor
                .play(&room, quality.as_deref(), auto_select, output)
                .await?
        }
        Commands::Chat {
            room,
            json,
            no_online,
        } => executor.chat(&room, json, no_online).await?,
        Commands::Config { .. } | Commands::Completions { .. } => {}
    }

    Ok(())
}

fn init_logging(verbose: bool, quiet: bool, json: bool) -> Result<()> {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so stdout stays machine readable.
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(verbose)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    }
    .map_err(|e| CliError::Logging(e.to_string()))
}
