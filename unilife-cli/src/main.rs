//! Binary crate for the `unilife` command-line tool.
//!
//! This crate focuses on:
//! - Parsing CLI arguments and interactive configuration
//! - Running the HTTP API alongside the refresh scheduler
//! - Seeding demo data

use clap::Parser;

mod cli;
mod seed;
mod server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = env_logger::Env::default().default_filter_or("info");
    env_logger::init_from_env(env);

    let cmd = cli::Cli::parse();
    cmd.run().await
}
