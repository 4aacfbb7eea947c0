use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "stakeout")]
#[command(about = "Zeek log ingestion and correlation engine", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a directory of Zeek logs into a database
    Import {
        /// Target database name
        #[arg(long)]
        database: String,

        /// Directory of Zeek logs to walk
        #[arg(long)]
        logs: PathBuf,

        /// Keep only the most recent days and allow appending to an
        /// existing rolling database
        #[arg(long)]
        rolling: bool,

        /// Drop the target database before importing
        #[arg(long)]
        rebuild: bool,
    },
    /// List imported databases
    List,
    /// Delete a database by name, or several with a leading/trailing *
    Delete {
        name: String,
    },
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Init {
        #[arg(long)]
        stdout: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stakeout=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config);

    match cli.command {
        Commands::Import {
            database,
            logs,
            rolling,
            rebuild,
        } => {
            stakeout::cli::import::run(config_path, database, logs, rolling, rebuild).await?;
        }
        Commands::List => {
            stakeout::cli::list::run(config_path).await?;
        }
        Commands::Delete { name } => {
            stakeout::cli::delete::run(config_path, name).await?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Init { stdout } => {
                stakeout::cli::config::init(stdout)?;
            }
        },
    }

    Ok(())
}

fn resolve_config_path(explicit_path: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path);
    }

    if let Some(home_dir) = dirs::home_dir() {
        let user_config = home_dir.join(".config/stakeout/config.yml");
        if user_config.exists() {
            return Some(user_config);
        }
    }

    let system_config = PathBuf::from("/etc/stakeout/config.yml");
    if system_config.exists() {
        return Some(system_config);
    }

    None
}
