//! ohlcv-publisher: relay a delimited OHLCV file to a subscriber

use anyhow::{anyhow, Context};
use clap::Parser;
use ohlcv_relay::cancel::CancelToken;
use ohlcv_relay::cli::PublisherArgs;
use ohlcv_relay::config::PublisherConfig;
use ohlcv_relay::source::CsvTable;
use ohlcv_relay::transport::udp::UdpPublication;
use ohlcv_relay::{logging, publisher};
use std::process::ExitCode;

fn main() -> ExitCode {
    let args = PublisherArgs::parse();

    let config = match args.into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FAILED: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let log_dir = config.log.to_file.then(|| config.transport.transport_dir());
    let level = config.log.level.as_deref();
    let _log_guard = match logging::init(level, log_dir.as_deref(), "publisher.log") {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("FAILED: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("FAILED: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(config: &PublisherConfig) -> anyhow::Result<()> {
    let cancel = CancelToken::new();
    cancel
        .cancel_on_interrupt()
        .context("Failed to install interrupt handler")?;

    let input = config
        .input
        .as_ref()
        .ok_or_else(|| anyhow!("No input file given"))?;
    let table = CsvTable::read(input)?;
    tracing::info!(rows = table.len(), columns = ?table.headers, "Loaded {:?}", input);

    let mut publication = UdpPublication::connect(&config.transport)?;
    tracing::info!(
        channel = %config.transport.channel,
        stream_id = config.transport.stream_id,
        session_id = publication.session_id(),
        "Publishing"
    );

    let report = publisher::run(&table.rows, &mut publication, &config.publish_options(), &cancel);
    let report = report.into_result()?;

    println!(
        "Done sending: {} sent, {} skipped, {} not sent ({})",
        report.sent,
        report.skipped.len(),
        report.remaining,
        report.outcome
    );
    Ok(())
}
