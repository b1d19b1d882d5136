use clap::Parser;

use gamehub::{Config, Result};

mod app_config;
mod commands;

use app_config::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command();

    let config = match Config::load_from(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {}", command.name(), e);
            std::process::exit(2);
        }
    };

    match command {
        Commands::Serve => commands::serve(config, cli.verbose).await,
        Commands::CheckConfig => commands::check_config(&config),
        Commands::PrintConfig => commands::print_config(&config),
    }
}
