use anyhow::Result;
use clap::{Parser, Subcommand};
use ftprelay::common::config_commands::{run_config_init, run_config_path, run_config_show};
use ftprelay::common::{load_config, ConfigOverrides};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

// Clap reads this struct and creates CLI
#[derive(Parser)]
#[command(name = "ftprelay")]
#[command(about = "HTTP relay for uploading to and downloading from an FTP server")]
#[command(version)]
struct Cli {
    /// Config file to use instead of the per-user default
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP relay
    Serve {
        #[arg(long, help = "Port to listen on (overrides config)")]
        port: Option<u16>,
    },
    /// Inspect or create the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective config with secrets masked
    Show,
    /// Print the config file location
    Path,
    /// Write a config file with default values
    Init {
        #[arg(long, help = "Overwrite an existing file")]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        // stdout belongs to `config show`
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port } => {
            let overrides = ConfigOverrides {
                config_file: cli.config,
                port,
            };
            // fail fast on missing token/host before binding anything
            let config = load_config(&overrides)?;
            ftprelay::server::serve(config).await
        }
        Commands::Config { action } => {
            let overrides = ConfigOverrides {
                config_file: cli.config,
                port: None,
            };
            match action {
                ConfigAction::Show => run_config_show(&overrides),
                ConfigAction::Path => run_config_path(&overrides),
                ConfigAction::Init { force } => run_config_init(&overrides, force),
            }
        }
    }
}
