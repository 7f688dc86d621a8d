#![allow(clippy::doc_markdown)]
#![doc = include_str!("../../README.md")]

mod api;
mod cli;
mod core;
mod fmt;
mod history;
mod prelude;
mod report;
mod tables;

use std::{io, process::ExitCode};

use clap::{Parser, crate_version};
use tracing_subscriber::EnvFilter;

use crate::{
    cli::{Args, Command},
    prelude::*,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .without_time()
        .compact()
        .init();
    info!(version = crate_version!(), "starting…");

    let args = Args::parse();

    let exit_code = match args.command {
        Command::Run(args) => args.run().await?,
        Command::Compare(args) => args.run().await?,
        Command::History(args) => {
            args.run()?;
            0
        }
    };

    info!(exit_code, "done!");
    Ok(ExitCode::from(exit_code))
}
