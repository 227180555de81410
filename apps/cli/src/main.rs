//! clipping: legislative news clipping pipeline.
//!
//! Collects headlines from the Câmara, the Senado and Agência Gov, extracts
//! article text and scores it against a weighted term dictionary.

mod commands;

use std::process::ExitCode;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
