//! Map view event reader
//!
//! Reads one JSON object per line and forwards it to the orchestrator:
//!
//! ```text
//! {"type":"click","lng":79.1210,"lat":12.8804}
//! {"type":"marker_drag_end","marker":"start","lng":79.1211,"lat":12.8805}
//! {"type":"toggle_mode"}
//! {"type":"set_profile","profile":"foot-walking"}
//! {"type":"select_place","id":2}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped. Malformed lines are
//! logged and skipped; they never stop the reader.

use crate::domain::types::MapEvent;
use crate::infra::metrics::Metrics;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Parse one input line. `Ok(None)` for blank and comment lines.
pub fn parse_map_event(line: &str) -> Result<Option<MapEvent>, serde_json::Error> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    serde_json::from_str(line).map(Some)
}

/// Forward events from `reader` until EOF, shutdown or the receiver going away.
/// Returns the number of events forwarded.
pub async fn read_map_events<R>(
    reader: R,
    event_tx: mpsc::Sender<MapEvent>,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) -> u64
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut forwarded = 0u64;
    let mut line_no = 0u64;

    loop {
        let line = tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("map_event_reader_shutdown");
                    break;
                }
                continue;
            }
            result = lines.next_line() => match result {
                Ok(Some(line)) => line,
                Ok(None) => {
                    info!(forwarded = %forwarded, "map_event_input_closed");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "map_event_read_failed");
                    break;
                }
            },
        };
        line_no += 1;

        let event = match parse_map_event(&line) {
            Ok(Some(event)) => event,
            Ok(None) => continue,
            Err(e) => {
                metrics.record_map_event_ignored();
                warn!(line_no = %line_no, error = %e, "map_event_malformed");
                continue;
            }
        };

        debug!(line_no = %line_no, event = %event.as_str(), "map_event_received");
        if event_tx.send(event).await.is_err() {
            warn!("map_event_channel_closed");
            break;
        }
        forwarded += 1;
    }

    forwarded
}
