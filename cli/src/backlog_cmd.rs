use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use crewlog_core::SessionStore;
use crewlog_core::Uploader;
use crewlog_core::install_id;

#[derive(Debug, Parser)]
pub struct BacklogCli {
    /// Upload from this directory instead of the platform data dir.
    #[arg(long = "data-dir", value_name = "DIR")]
    data_dir: Option<PathBuf>,
    /// Config file to use instead of the platform default location.
    #[arg(long = "config", value_name = "PATH")]
    config: Option<PathBuf>,
}

pub async fn run(args: BacklogCli) -> Result<()> {
    let config = crate::load_config(args.config.as_deref(), args.data_dir.as_deref())?;
    let store = SessionStore::new(config.storage.resolve());
    let pending = store
        .pending()
        .context("failed to scan the session store")?
        .len();
    if pending == 0 {
        println!("No pending session records in {}", store.dir().display());
        return Ok(());
    }

    let user = install_id::load_or_create(store.dir());
    let uploader =
        Uploader::new(config.upload, store, user).context("failed to build the uploader")?;
    let delivered = uploader
        .backlog_pass()
        .await
        .context("backlog upload failed")?;
    println!("Uploaded {delivered} of {pending} pending record(s).");
    Ok(())
}
