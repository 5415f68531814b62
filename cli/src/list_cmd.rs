use std::ffi::OsStr;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use crewlog_core::SessionStore;

#[derive(Debug, Parser)]
pub struct ListCli {
    /// Inspect this directory instead of the platform data dir.
    #[arg(long = "data-dir", value_name = "DIR")]
    data_dir: Option<PathBuf>,
    /// Config file to use instead of the platform default location.
    #[arg(long = "config", value_name = "PATH")]
    config: Option<PathBuf>,
}

pub fn run(args: ListCli) -> Result<()> {
    let config = crate::load_config(args.config.as_deref(), args.data_dir.as_deref())?;
    let store = SessionStore::new(config.storage.resolve());
    let entries = store.entries().context("failed to scan the session store")?;

    if entries.is_empty() {
        println!("No session records in {}", store.dir().display());
        return Ok(());
    }

    let pending = entries.iter().filter(|(_, delivered)| !delivered).count();
    println!("Session records in {}:", store.dir().display());
    for (path, delivered) in &entries {
        let state = if *delivered { "uploaded" } else { "pending" };
        let name = path
            .file_name()
            .and_then(OsStr::to_str)
            .unwrap_or("<invalid name>");
        println!("  {name}  [{state}]");
    }
    println!("{} record(s), {pending} pending.", entries.len());
    Ok(())
}
