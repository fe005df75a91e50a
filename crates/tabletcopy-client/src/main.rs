#![warn(missing_docs)]

//! `tabletcopy`: copies a tablet replica from a healthy peer.

use anyhow::Result;
use clap::Parser;
use tabletcopy_client::cli::Cli;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    cli.run().await
}
