//! feedtap - stream RethinkDB changefeeds as JSON lines.
//!
//! Connects once, watches the configured databases and tables, and writes
//! every change as one JSON object per line until shutdown.

pub mod config;
pub mod error;
pub mod sink;
pub mod source;

use std::future::Future;

use tokio::io::AsyncWrite;
use tokio::sync::mpsc;

use feedtap_client::Connection;
use feedtap_core::SubscriptionManager;

pub use config::{Args, TapConfig};
pub use error::Error;
pub use sink::write_json_lines;
pub use source::{RethinkHandle, RethinkSource};

/// Run the tap until `shutdown` resolves. Returns how many events were
/// written to `out`.
///
/// Failing to connect is fatal; nothing is watched without a connection.
pub async fn run<W, F>(config: TapConfig, out: W, shutdown: F) -> Result<u64, Error>
where
    W: AsyncWrite + Unpin + Send + 'static,
    F: Future<Output = ()>,
{
    if config.watch.is_empty() {
        tracing::warn!("no databases or tables configured, nothing will be emitted");
    }

    let conn = Connection::connect(config.client.clone()).await?;

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_json_lines(events_rx, out));

    let mut manager = SubscriptionManager::new(RethinkSource::new(conn), events_tx, config.options)
        .with_decorator(config.decorator.clone());
    manager.start(&config.watch);

    let result = manager.run_until_shutdown(shutdown).await;
    // Dropping the manager releases the sink so the writer can finish.
    drop(manager);

    let written = writer.await??;
    result?;
    Ok(written)
}
