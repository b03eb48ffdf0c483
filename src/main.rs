// src/main.rs

use anyhow::{Context, Result};
use clap::Parser;
use presence_monitor::config_store::YamlConfigStore;
use presence_monitor::notify::Notifier;
use presence_monitor::pipeline::{AlertDispatcher, FrameCycleCoordinator, PipelineMetrics};
use presence_monitor::replay::JsonlReplaySource;
use presence_monitor::types::Config;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Desk presence and smartphone-usage monitor", long_about = None)]
struct Args {
    /// YAML configuration; threshold extensions are written back here
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Recorded detector output, one JSON cycle result per line
    #[arg(short, long)]
    replay: PathBuf,

    /// Post alerts to this URL instead of the configured sink
    #[arg(long)]
    webhook: Option<String>,

    /// Seconds between status lines in the log (0 disables)
    #[arg(long, default_value_t = 5)]
    status_interval: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(&args.config)?;
    if let Some(url) = args.webhook.clone() {
        config.alerts.webhook_url = Some(url);
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .context("Invalid logging.level filter")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("👀 Presence Monitor Starting");
    info!("✓ Configuration loaded from {}", args.config.display());
    info!(
        "Smoothing: hysteresis {:.2}/{:.2}, window {}, weight {:.1}, max missing {}, fade {:.2}",
        config.detection.hysteresis.high_threshold,
        config.detection.hysteresis.low_threshold,
        config.detection.moving_average.window_size,
        config.detection.moving_average.weight_recent,
        config.detection.interpolation.max_missing_frames,
        config.detection.interpolation.fade_out_factor
    );

    let metrics = PipelineMetrics::new();
    let notifier = Notifier::from_config(&config.alerts)?;
    let store = YamlConfigStore::new(&args.config);
    let dispatcher = AlertDispatcher::spawn(notifier, store, metrics.clone());

    let source = JsonlReplaySource::open(&args.replay).await?;
    let (coordinator, handle) =
        FrameCycleCoordinator::new(&config, source, dispatcher.sender(), metrics)?;

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("🛑 Ctrl-C received, shutting down"),
            Err(e) => error!("❌ Failed to listen for Ctrl-C: {}", e),
        }
        let _ = stop_tx.send(true);
    });

    if args.status_interval > 0 {
        let status_handle = handle.clone();
        let period = Duration::from_secs(args.status_interval);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let s = status_handle.status_summary();
                info!(
                    "📊 person={} phone={} away={:.1}s/{:.0}s phone={:.1}s/{:.0}s fps={:.1} skip={}",
                    s.person_detected,
                    s.smartphone_detected,
                    s.absence_time,
                    s.absence_threshold,
                    s.smartphone_use_time,
                    s.smartphone_threshold,
                    s.fps,
                    s.skip_rate
                );
            }
        });
    }

    let result = coordinator.run(stop_rx).await;
    dispatcher.shutdown().await;

    let summary = result?;
    info!("\n========================================");
    info!("✓ Session finished in {:.1}s", summary.elapsed_secs);
    info!("  Cycles: {} ({:.1} FPS)", summary.total_cycles, summary.fps);
    info!(
        "  Detector: {} runs, {} skipped, {} failed",
        summary.detection_runs, summary.skipped_cycles, summary.detection_failures
    );
    info!(
        "  Alerts: {} absence, {} smartphone, {} scheduled",
        summary.absence_alerts, summary.usage_alerts, summary.scheduled_notices
    );
    if summary.delivery_failures > 0 || summary.persist_failures > 0 {
        info!(
            "  Failures: {} deliveries, {} persists",
            summary.delivery_failures, summary.persist_failures
        );
    }
    info!("========================================");

    Ok(())
}
