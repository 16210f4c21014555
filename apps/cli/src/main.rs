//! Adapt CLI: turn internal documents into a training course.
//!
//! Uploads the documents, has the course API extract text and generate
//! questions, lets the curator edit them, then saves the course.

mod commands;
mod editor;
mod interrupt;
mod progress;

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
