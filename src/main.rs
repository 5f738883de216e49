// src/main.rs

use anyhow::Result;
use clap::{CommandFactory, Parser};

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.config.as_path();

    match cli.command {
        Some(Commands::Stage {
            stage_dir,
            title,
            output_dir,
            verbose,
        }) => commands::cmd_stage(
            config,
            &stage_dir,
            title.as_deref(),
            output_dir.as_deref(),
            verbose,
        ),
        Some(Commands::Package { stage_dir, titles }) => {
            commands::cmd_package(config, &stage_dir, &titles)
        }
        Some(Commands::Extract { package, output }) => {
            commands::cmd_extract(config, &package, &output)
        }
        Some(Commands::Shorten { paths }) => commands::cmd_shorten(&paths),
        Some(Commands::Devices { json }) => commands::cmd_devices(config, json),
        Some(Commands::Device { target, command }) => {
            commands::cmd_device(config, &target, command)
        }
        Some(Commands::Pgo {
            target,
            working_dir,
            elf,
            args,
        }) => commands::cmd_pgo(config, &target, working_dir.as_deref(), &elf, &args),
        Some(Commands::Postmortem {
            target,
            dump_dir,
            latest,
        }) => commands::cmd_postmortem(config, target.as_deref(), &dump_dir, latest),
        Some(Commands::Completions { shell }) => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "orbis-deploy",
                &mut std::io::stdout(),
            );
            Ok(())
        }
        None => {
            // No command provided, show help
            println!("orbis-deploy v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'orbis-deploy --help' for usage information");
            Ok(())
        }
    }
}
