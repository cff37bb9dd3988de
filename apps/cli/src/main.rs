//! SynthKit CLI: turn documents into fine-tuning datasets.
//!
//! Ingest a document, generate QA / chain-of-thought / summary /
//! conversation examples with an LLM, curate them with an LLM judge and
//! export them in a fine-tuning format.

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
