use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use crewlog_core::SessionRecorder;
use crewlog_core::SessionStore;
use crewlog_core::Uploader;
use crewlog_core::install_id;
use crewlog_protocol::Signal;

#[derive(Debug, Parser)]
pub struct ReplayCli {
    /// Signal log to replay, one JSON signal per line.
    #[arg(value_name = "FILE")]
    file: PathBuf,
    /// Store session records here instead of the platform data dir.
    #[arg(long = "data-dir", value_name = "DIR")]
    data_dir: Option<PathBuf>,
    /// Config file to use instead of the platform default location.
    #[arg(long = "config", value_name = "PATH")]
    config: Option<PathBuf>,
    /// Upload the produced records to the collector afterwards.
    #[arg(long = "upload", default_value_t = false)]
    upload: bool,
}

pub async fn run(args: ReplayCli) -> Result<()> {
    let config = crate::load_config(args.config.as_deref(), args.data_dir.as_deref())?;
    let mut recorder = SessionRecorder::new(config.clone());

    let raw = fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read signal log {}", args.file.display()))?;

    let mut applied = 0usize;
    let mut persisted: Vec<PathBuf> = Vec::new();
    for (index, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let signal: Signal = serde_json::from_str(line)
            .with_context(|| format!("invalid signal on line {}", index + 1))?;
        recorder.handle_signal(signal);
        applied += 1;
        if let Some(path) = recorder.last_persisted() {
            if persisted.last().map(PathBuf::as_path) != Some(path) {
                persisted.push(path.to_path_buf());
            }
        }
    }

    println!("Replayed {applied} signal(s) from {}", args.file.display());
    if persisted.is_empty() {
        println!("No session records were produced.");
        return Ok(());
    }
    for path in &persisted {
        println!("  Recorded: {}", path.display());
    }

    if args.upload {
        let store = SessionStore::new(config.storage.resolve());
        let user = install_id::load_or_create(store.dir());
        let uploader =
            Uploader::new(config.upload, store, user).context("failed to build the uploader")?;
        for path in &persisted {
            uploader
                .deliver(path)
                .await
                .with_context(|| format!("failed to upload {}", path.display()))?;
            println!("  Uploaded: {}", path.display());
        }
    }
    Ok(())
}
