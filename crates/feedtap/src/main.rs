//! feedtap - RethinkDB changefeeds to JSON lines.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use feedtap::Args;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // stdout carries the events, logs go to stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "feedtap=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting feedtap");

    let args = Args::parse();
    let config = args.into_config()?;

    tracing::info!(
        address = %config.client.address(),
        databases = ?config.watch.databases(),
        tables = config.watch.tables().len(),
        backfill = config.options.backfill,
        "configuration loaded"
    );

    let shutdown = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("received shutdown signal"),
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for ctrl+c");
                std::future::pending::<()>().await;
            }
        }
    };

    match feedtap::run(config, tokio::io::stdout(), shutdown).await {
        Ok(events) => {
            tracing::info!(events, "shutdown complete");
        }
        Err(e) => {
            tracing::error!(error = %e, "feedtap failed");
            return Err(e.into());
        }
    }

    Ok(())
}
