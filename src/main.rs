use anyhow::Result;
use cassa::cli::Cli;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    cli.run().await
}
