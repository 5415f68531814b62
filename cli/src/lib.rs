//! Command-line companion for the session recorder.
//!
//! The recorder normally runs embedded in the game process; this tool covers
//! everything you do with its output afterwards: replaying captured signal
//! logs, inspecting the local session store, and pushing the upload backlog
//! by hand.

use std::path::Path;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use clap::Subcommand;
use crewlog_core::RecorderConfig;

pub mod backlog_cmd;
pub mod list_cmd;
pub mod replay_cmd;

#[derive(Debug, Parser)]
#[command(name = "crewlog", version, about = "Session recorder tools")]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Replay a signal log through the recorder, one JSON signal per line.
    Replay(replay_cmd::ReplayCli),
    /// List stored session records and their upload state.
    List(list_cmd::ListCli),
    /// Upload pending session records now, skipping the startup delay.
    Backlog(backlog_cmd::BacklogCli),
}

pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Replay(args) => replay_cmd::run(args).await,
        Command::List(args) => list_cmd::run(args),
        Command::Backlog(args) => backlog_cmd::run(args).await,
    }
}

/// Resolves the effective config: an explicit file, the platform default
/// location, or built-in defaults, with the storage dir optionally forced.
pub(crate) fn load_config(
    config_path: Option<&Path>,
    data_dir: Option<&Path>,
) -> Result<RecorderConfig> {
    let explicit = config_path.map(Path::to_path_buf);
    let path = explicit.or_else(crewlog_core::config::default_config_path);
    let mut config = match path {
        Some(path) => RecorderConfig::load(&path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => RecorderConfig::default(),
    };
    if let Some(dir) = data_dir {
        config = config.with_data_dir(dir);
    }
    Ok(config)
}
