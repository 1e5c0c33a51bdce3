//! admitbot CLI: admissions consultant bot for the AI master's programs.
//!
//! Fetches the program pages, keeps the curriculum documents in sync with
//! the model's file store and answers questions over Telegram or the console.

mod commands;
mod console;
mod telegram;

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
