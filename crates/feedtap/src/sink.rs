//! json_lines output: one JSON object per event, one event per line.

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use feedtap_core::ChangeEvent;

use crate::error::Error;

/// Write events to `out` until every sender is gone. Returns how many were
/// written.
pub async fn write_json_lines<W>(
    mut events: mpsc::UnboundedReceiver<ChangeEvent>,
    mut out: W,
) -> Result<u64, Error>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0;
    while let Some(event) = events.recv().await {
        let mut line = serde_json::to_vec(&event)?;
        line.push(b'\n');
        out.write_all(&line).await?;
        out.flush().await?;
        written += 1;
    }
    Ok(written)
}
