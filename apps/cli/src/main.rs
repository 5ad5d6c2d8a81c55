//! Ratsarchiv CLI: resumable harvester for council information systems.
//!
//! Walks the meeting calendar month by month and mirrors meetings, agenda
//! items and their documents into a local folder tree.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
