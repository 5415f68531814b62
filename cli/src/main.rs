use anyhow::Result;
use clap::Parser;
use crewlog_cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    setup_tracing();
    crewlog_cli::run(Cli::parse()).await
}

fn setup_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
