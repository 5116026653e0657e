//! mfdocs CLI — resumable downloader for mutual-fund regulatory documents.
//!
//! Walks the regulator portal's KIM and SID listings and saves one PDF per
//! fund, picking up where an interrupted run stopped.

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
