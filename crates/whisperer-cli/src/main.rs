mod auth;
mod cli;
mod client;
mod commands;
mod config;
mod observability;
mod output;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;

use cli::{AdminCommands, Cli, Commands, ConfigCommands};
use client::AppContext;
use output::print_error;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    observability::init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let profile = &cli.profile;

    if let Commands::Config(args) = &cli.command {
        return match &args.command {
            ConfigCommands::Show => {
                let cfg = config::load_profile(profile)?;
                println!("{}: {}", "Profile".cyan(), profile);
                println!(
                    "{}: {}",
                    "Server".cyan(),
                    cfg.server.as_deref().unwrap_or("(not set)")
                );
                println!(
                    "{}: {}",
                    "Format".cyan(),
                    cfg.format.as_deref().unwrap_or("table")
                );
                Ok(())
            }
            ConfigCommands::Set(set_args) => {
                let mut cfg = config::load_profile(profile)?;
                cfg.set(&set_args.key, &set_args.value)?;
                config::save_profile(profile, &cfg)?;
                output::print_success(&format!("Set {} = {}", set_args.key, set_args.value));
                Ok(())
            }
        };
    }

    let ctx = AppContext::open(&cli)?;
    match &cli.command {
        Commands::Login(args) => commands::auth::login(&ctx, args).await,
        Commands::Register(args) => commands::auth::register(&ctx, args).await,
        Commands::Logout => commands::auth::logout(&ctx).await,
        Commands::Whoami => commands::auth::whoami(&ctx).await,
        Commands::Status => commands::server::status(&ctx).await,
        Commands::Chat(args) => commands::chat::chat(&ctx, args).await,
        Commands::Courses => commands::student::courses(&ctx).await,
        Commands::Usage(args) => commands::usage::usage(&ctx, args).await,
        Commands::Admin(args) => match &args.command {
            AdminCommands::Usage(usage_args) => commands::admin::usage(&ctx, usage_args).await,
            AdminCommands::Limit(limit_args) => commands::admin::limit(&ctx, limit_args).await,
        },
        Commands::Config(_) => Ok(()),
    }
}
