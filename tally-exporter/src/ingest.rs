// Tally Exporter - Telemetry ingestion
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Telemetry ingestion from line-oriented input.
//!
//! Accepts the output of `mosquitto_sub -v -t 'tele/<topic>/#'`, one
//! message per line as `<topic> <payload>`.

use tally::CounterConfig;
use tally_tasmota::TasmotaDecoder;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::AgentError;
use crate::metrics;
use crate::worker::WorkerEvent;

/// Split a `<topic> <payload>` line.
pub fn split_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim_end_matches(['\r', '\n']);
    let (topic, payload) = line.split_once(' ')?;
    if topic.is_empty() {
        return None;
    }
    Some((topic, payload))
}

/// Decodes messages for one counter and hands them to the worker.
#[derive(Debug, Clone)]
pub struct Forwarder {
    name: String,
    decoder: TasmotaDecoder,
    tx: mpsc::Sender<WorkerEvent>,
}

impl Forwarder {
    /// Forwarder for the counter described by `config`.
    pub fn new(config: &CounterConfig, tx: mpsc::Sender<WorkerEvent>) -> Self {
        Self {
            name: config.name.clone(),
            decoder: TasmotaDecoder::new(config.short_topic.clone(), config.counter_id),
            tx,
        }
    }

    /// Topics to subscribe to.
    pub fn subscriptions(&self) -> [&str; 3] {
        self.decoder.topics().subscriptions()
    }

    /// Decode and forward one message.
    ///
    /// Returns whether a message reached the worker. Undecodable payloads
    /// are logged and skipped.
    pub async fn forward(&self, topic: &str, payload: &[u8]) -> Result<bool, AgentError> {
        let message = match self.decoder.decode(topic, payload) {
            Ok(Some(message)) => message,
            Ok(None) => return Ok(false),
            Err(e) => {
                warn!("{}: dropping message on {}: {}", self.name, topic, e);
                metrics::record_payload_error(&self.name);
                return Ok(false);
            }
        };

        self.tx
            .send(WorkerEvent::Telemetry(message))
            .await
            .map_err(|_| AgentError::WorkerGone)?;
        Ok(true)
    }
}

/// Forward every line of `reader` until end of input.
///
/// Returns the number of messages that reached the worker.
pub async fn read_lines<R>(reader: R, forwarder: &Forwarder) -> Result<usize, AgentError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut forwarded = 0;

    while let Some(line) = lines.next_line().await? {
        let Some((topic, payload)) = split_line(&line) else {
            debug!("Skipping malformed line {:?}", line);
            continue;
        };
        if forwarder.forward(topic, payload.as_bytes()).await? {
            forwarded += 1;
        }
    }

    info!("End of input, {} message(s) forwarded", forwarded);
    Ok(forwarded)
}
