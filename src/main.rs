use balance_scanner::{
    load_addresses, spawn_scan, Aggregator, Args, BalanceFetcher, FetcherConfig, RecordSink,
};
use clap::Parser;
use eyre::Result;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Init logging; stderr keeps the progress bar clean.
    env_logger::Builder::new()
        .filter_level(args.log_level())
        .target(env_logger::Target::Stderr)
        .init();

    // Load the address list
    let addresses = load_addresses(&args.input_list)?;
    if addresses.is_empty() {
        warn!("address list {} is empty", args.input_list.display());
        return Ok(());
    }

    // Create the fetcher
    let fetcher = Arc::new(BalanceFetcher::new(FetcherConfig {
        proxy: args.proxy.clone(),
        ..FetcherConfig::default()
    })?);

    // Optional raw-record sink
    let sink = match &args.output {
        Some(path) => Some(RecordSink::create(path)?),
        None => None,
    };

    let workers = args.worker_count();
    info!("checking {} addresses with {} workers", addresses.len(), workers);

    let bar = ProgressBar::new(addresses.len() as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("  [{bar:40}] {pos}/{len} ({eta})")
            .unwrap(),
    );

    // Fan out, then consume completions as they arrive
    let mut outcomes = spawn_scan(fetcher, addresses, workers);
    let mut aggregator = Aggregator::new(sink);

    while let Some(outcome) = outcomes.recv().await {
        aggregator.ingest(outcome)?;
        bar.inc(1);
    }
    bar.finish_and_clear();

    let report = aggregator.finish()?;
    if report.failed > 0 {
        warn!(
            "{} of {} addresses could not be checked",
            report.failed, report.processed
        );
    }

    Ok(())
}
