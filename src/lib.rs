pub mod cli;
pub mod db;
pub mod export;
pub mod identity;
pub mod models;
pub mod order;
pub mod session;
pub mod settings;
pub mod storage;
pub mod trial;

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use log::LevelFilter;

pub fn run() -> anyhow::Result<()> {
    // Load .env before anything reads the environment.
    let dotenv_error = dotenvy::dotenv().err();

    let args = cli::Args::parse();

    let debug = args.verbose
        || std::env::var("MTP_DEBUG")
            .map(|value| settings::env_flag(&value))
            .unwrap_or(false);

    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(if debug {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .init();

    if let Some(err) = dotenv_error {
        if !matches!(err, dotenvy::Error::Io(_)) {
            log::warn!("Failed to load .env file: {err}");
        }
    }

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let result = runtime.block_on(async {
        let ctx = cli::initialize(&args).await?;
        cli::execute(&ctx, &args.command).await
    });
    // A pending stdin read would otherwise hold the process open.
    runtime.shutdown_timeout(Duration::from_millis(200));
    result
}
