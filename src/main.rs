//! # autounseal
//!
//! Entry point: parse the command line, initialize, run until signalled.

use anyhow::Result;
use autounseal::cli::Cli;
use autounseal::runtime::{initialize, run};
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let init_result = initialize(&cli.config).await?;
    run(init_result).await
}
