//! LeadDesk CLI: local lead intake and daily quota-based distribution.
//!
//! Leads are handed out to the members of collaborator groups, round-robin
//! by least load, without exceeding each group's daily quota.

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
