use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use gator::commands::{Command, CommandError, Commands};
use gator::config::{default_config_path, Config};
use gator::feed::build_client;
use gator::session::Session;
use gator::storage::Database;

#[derive(Parser, Debug)]
#[command(name = "gator", about = "Multi-user RSS feed aggregator", version)]
struct Args {
    /// Config file to use instead of ~/.gatorconfig.toml
    #[arg(long, value_name = "PATH", env = "GATOR_CONFIG")]
    config: Option<PathBuf>,

    /// Command to run: login, register, reset, users, agg, addfeed, feeds,
    /// follow, following, unfollow, browse
    command: String,

    /// Arguments passed to the command
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so command output on stdout stays clean
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gator=info,warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config_path = match args.config {
        Some(path) => path,
        None => default_config_path().context("Failed to locate config file")?,
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from '{}'", config_path.display()))?;

    let location = config
        .database_location()
        .context("Failed to resolve database location")?;
    let db = Database::open(&location)
        .await
        .with_context(|| format!("Failed to open database '{}'", location))?;
    let client = build_client().context("Failed to build HTTP client")?;

    let mut session = Session::new(config, config_path, db, client);
    let command = Command::new(args.command, args.args);

    let commands = Commands::builtin();
    match commands.run(&mut session, &command).await {
        Err(e @ CommandError::UnknownCommand(_)) => Err(anyhow::anyhow!(
            "{}; available commands: {}",
            e,
            commands.names().join(", ")
        )),
        result => Ok(result?),
    }
}
