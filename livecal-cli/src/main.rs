mod commands;
mod render;
mod scenario;

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use livecal_core::SyncConfig;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "livecal")]
#[command(about = "Replay live calendar sync sessions against an in-memory document store")]
struct Cli {
    /// Log bridge internals at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of ~/.config/livecal/config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scripted session and print what the bridge did
    Replay {
        /// Path to a scenario JSON file
        scenario: PathBuf,
    },
    /// Show the config path and resolved settings
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Replay { scenario } => {
            let config = load_config(cli.config.as_deref())?;
            commands::replay::run(&scenario, config).await
        }
        Commands::Config => {
            let path = match &cli.config {
                Some(path) => path.clone(),
                None => SyncConfig::config_path()?,
            };
            let config = load_config(cli.config.as_deref())?;
            commands::config::run(&path, &config)
        }
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "livecal=debug" } else { "livecal=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<SyncConfig> {
    let config = match path {
        Some(path) => SyncConfig::load_from(path)?,
        None => SyncConfig::load()?,
    };
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replay_args() {
        let cli = Cli::try_parse_from(["livecal", "replay", "session.json", "-v"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Replay { scenario } if scenario == Path::new("session.json")));
    }

    #[test]
    fn test_config_flag_is_global() {
        let cli =
            Cli::try_parse_from(["livecal", "config", "--config", "/tmp/livecal.toml"]).unwrap();
        assert_eq!(cli.config.as_deref(), Some(Path::new("/tmp/livecal.toml")));
        assert!(matches!(cli.command, Commands::Config));
    }

    #[test]
    fn test_load_config_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "collection = \"shifts\"\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.collection, "shifts");
    }
}
