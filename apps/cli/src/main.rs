//! Tenderfold CLI — bid-evaluation packet organizer.
//!
//! Reshapes exported project trees (local directories or zip bundles,
//! local or on a WebDAV share) into flat canonical output sets.

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
