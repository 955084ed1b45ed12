//! ohlcv-subscriber: receive OHLCV records and chart them as they arrive

use anyhow::Context;
use clap::Parser;
use ohlcv_relay::cancel::CancelToken;
use ohlcv_relay::cli::SubscriberArgs;
use ohlcv_relay::config::SubscriberConfig;
use ohlcv_relay::ingest::run_ingest;
use ohlcv_relay::store::TimeSeriesStore;
use ohlcv_relay::transport::udp::UdpSubscription;
use ohlcv_relay::{consumer, logging};
use std::process::ExitCode;
use std::sync::Arc;

fn main() -> ExitCode {
    let args = SubscriberArgs::parse();

    let config = match args.into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FAILED: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let log_dir = config.log.to_file.then(|| config.transport.transport_dir());
    let level = config.log.level.as_deref();
    let _log_guard = match logging::init(level, log_dir.as_deref(), "subscriber.log") {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("FAILED: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("FAILED: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(config: SubscriberConfig) -> anyhow::Result<()> {
    let cancel = CancelToken::new();
    cancel
        .cancel_on_interrupt()
        .context("Failed to install interrupt handler")?;

    let mut subscription = UdpSubscription::bind(&config.transport)?;
    tracing::info!(
        channel = %config.transport.channel,
        stream_id = config.transport.stream_id,
        "Subscribed"
    );

    let store = Arc::new(TimeSeriesStore::new());
    let ingest = {
        let store = store.clone();
        let cancel = cancel.clone();
        let mut idle = config.idle.build();
        let fragment_limit = config.fragment_limit;
        std::thread::Builder::new()
            .name("ingest".into())
            .spawn(move || {
                let result =
                    run_ingest(&mut subscription, store, &mut *idle, fragment_limit, &cancel);
                // A failed ingest takes the viewer down with it
                cancel.cancel();
                result
            })
            .context("Failed to spawn ingest thread")?
    };

    let viewer = consume(&config, store, &cancel);
    cancel.cancel();

    let summary = ingest
        .join()
        .map_err(|_| anyhow::anyhow!("Ingest thread panicked"))??;
    viewer?;

    println!(
        "Received {} records ({} decode failures, {} discarded)",
        summary.records,
        summary.decode_failures,
        summary.oversize_discards + summary.incomplete_discards
    );
    Ok(())
}

/// Consume the store until the viewer closes or the token is cancelled
fn consume(
    config: &SubscriberConfig,
    store: Arc<TimeSeriesStore>,
    cancel: &CancelToken,
) -> anyhow::Result<()> {
    if config.headless {
        let records = consumer::run_headless(&store, cancel, config.refresh_interval());
        tracing::info!(records, "Headless consumer stopped");
        return Ok(());
    }

    #[cfg(feature = "gui")]
    {
        use ohlcv_relay::frontend::{self, ViewerApp};

        let app = ViewerApp::new(
            store,
            cancel.clone(),
            config.transport.channel.clone(),
            config.transport.stream_id,
            config.refresh_interval(),
        );
        frontend::run(app).map_err(|e| anyhow::anyhow!("Viewer failed: {}", e))
    }

    #[cfg(not(feature = "gui"))]
    {
        tracing::warn!("Built without the gui feature, running headless");
        let records = consumer::run_headless(&store, cancel, config.refresh_interval());
        tracing::info!(records, "Headless consumer stopped");
        Ok(())
    }
}
