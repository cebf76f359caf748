use crate::error::Result;
use crate::frame::WireFrame;
use crate::pipeline::IngestPipeline;
use metrics::counter;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Acknowledgement written once a stream ends cleanly.
const ACK: &[u8] = b"{\"status\":\"ok\"}\n";

/// TCP front for the agent stream: one task per connection, newline-delimited
/// JSON frames, sequential fan-out per connection.
pub struct IngestServer {
    pipeline: Arc<IngestPipeline>,
}

impl IngestServer {
    pub fn new(pipeline: Arc<IngestPipeline>) -> Self {
        Self { pipeline }
    }

    /// Accept connections until the shutdown signal flips. A receive error on
    /// one stream aborts that stream only.
    pub async fn serve(
        &self,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        info!(addr = %listener.local_addr()?, "ingest listener ready");
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let pipeline = self.pipeline.clone();
                            let shutdown = shutdown.clone();
                            tokio::spawn(async move {
                                handle_connection(pipeline, stream, peer, shutdown).await;
                            });
                        }
                        Err(err) => warn!(error = %err, "accept failed"),
                    }
                }
                _ = shutdown.changed() => {
                    info!("ingest listener stopping");
                    return Ok(());
                }
            }
        }
    }
}

async fn handle_connection(
    pipeline: Arc<IngestPipeline>,
    stream: TcpStream,
    peer: SocketAddr,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(%peer, "agent connected");
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    loop {
        let next = tokio::select! {
            line = lines.next_line() => line,
            _ = shutdown.changed() => {
                debug!(%peer, "closing agent stream on shutdown");
                return;
            }
        };
        match next {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match WireFrame::decode(&line) {
                    Ok(frame) => pipeline.handle_frame(frame).await,
                    Err(err) => {
                        counter!("gosight_ingest_malformed_total", 1);
                        warn!(%peer, error = %err, "dropping malformed frame");
                    }
                }
            }
            Ok(None) => {
                // Clean end of stream: acknowledge and close.
                if let Err(err) = writer.write_all(ACK).await {
                    debug!(%peer, error = %err, "ack write failed");
                }
                debug!(%peer, "agent stream complete");
                return;
            }
            Err(err) => {
                warn!(%peer, error = %err, "aborting agent stream");
                return;
            }
        }
    }
}
