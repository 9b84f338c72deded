//! TileScout CLI — resilient product-catalog acquisition.
//!
//! Ingests a site's sitemap into a local frontier, then crawls product pages
//! through a rendering service into a local product database.

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
