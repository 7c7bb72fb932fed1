use anyhow::Result;
use clap::Parser;
use procman_daemon::DaemonRunner;

mod config;
mod logging;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let cli = config::Cli::parse();

    DaemonRunner::new(cli.port).start().await
}
