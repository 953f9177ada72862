// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use derive_more::Display;
use reqwest::Client;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

use crate::errors::FatalError;
use crate::http::{build_request, send};
use crate::record::LogRecord;

/// Why a flush was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum FlushReason {
    #[display("full")]
    Full,
    #[display("timeout")]
    Timeout,
    #[display("shutdown")]
    Shutdown,
}

/// Delivery counters of one adapter. Diagnostics only.
#[derive(Debug, Default)]
pub struct AdapterStats {
    total_message_count: AtomicU64,
    failed_batch_count: AtomicU64,
}

impl AdapterStats {
    /// Messages that went through a dispatch attempt, delivered or not.
    pub fn total_message_count(&self) -> u64 {
        self.total_message_count.load(Ordering::Relaxed)
    }

    /// Batches lost to a delivery error while crash-on-error was off.
    pub fn failed_batch_count(&self) -> u64 {
        self.failed_batch_count.load(Ordering::Relaxed)
    }

    fn record_dispatch(&self, messages: usize) -> u64 {
        self.total_message_count
            .fetch_add(messages as u64, Ordering::Relaxed)
            + messages as u64
    }

    fn record_failure(&self) {
        self.failed_batch_count.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct FlusherConfig {
    pub client: Client,
    pub url: String,
    pub use_gzip: bool,
    pub crash: bool,
    pub stats: Arc<AdapterStats>,
    pub tracker: TaskTracker,
    pub fatal_tx: mpsc::UnboundedSender<FatalError>,
}

/// Ships detached batches. Every batch is sent from its own task, so callers
/// are never blocked on the network.
#[derive(Clone)]
pub struct Flusher {
    client: Client,
    url: Arc<str>,
    use_gzip: bool,
    crash: bool,
    stats: Arc<AdapterStats>,
    tracker: TaskTracker,
    fatal_tx: mpsc::UnboundedSender<FatalError>,
}

impl Flusher {
    pub fn new(config: FlusherConfig) -> Self {
        Flusher {
            client: config.client,
            url: config.url.into(),
            use_gzip: config.use_gzip,
            crash: config.crash,
            stats: config.stats,
            tracker: config.tracker,
            fatal_tx: config.fatal_tx,
        }
    }

    /// Serializes `batch` and hands it to a delivery task.
    ///
    /// Returns whether a task was started. Empty batches and batches that
    /// cannot be serialized are not sent.
    pub fn flush(&self, batch: Vec<LogRecord>, reason: FlushReason) -> bool {
        if batch.is_empty() {
            return false;
        }

        let payload = match serde_json::to_vec(&batch) {
            Ok(payload) => payload,
            Err(e) => {
                error!("http: error encoding JSON, dropping {} messages: {e}", batch.len());
                return false;
            }
        };
        let count = batch.len();
        drop(batch);

        let flusher = self.clone();
        let fatal_tx = self.fatal_tx.clone();
        self.tracker.spawn(async move {
            // Inner task so a panic while shipping surfaces as a JoinError.
            let shipped = tokio::spawn(async move { flusher.ship(payload, count, reason).await });
            let result = match shipped.await {
                Ok(result) => result,
                Err(e) => Err(FatalError::from(e)),
            };
            if let Err(fatal) = result {
                // The receiver only goes away once the adapter has stopped.
                let _ = fatal_tx.send(fatal);
            }
        });
        true
    }

    async fn ship(
        &self,
        payload: Vec<u8>,
        count: usize,
        reason: FlushReason,
    ) -> Result<(), FatalError> {
        let request = build_request(&self.client, &self.url, payload, self.use_gzip)?;

        let start = Instant::now();
        let result = send(request).await;
        let total = self.stats.record_dispatch(count);

        match result {
            Ok(status) => {
                debug!(
                    %reason,
                    messages = count,
                    elapsed = ?start.elapsed(),
                    total,
                    %status,
                    "http: flushed"
                );
                Ok(())
            }
            Err(e) if self.crash => {
                error!(url = %self.url, "http: delivery failed: {e}");
                Err(FatalError::Delivery {
                    url: self.url.to_string(),
                    source: e,
                })
            }
            Err(e) => {
                self.stats.record_failure();
                warn!(
                    url = %self.url,
                    %reason,
                    messages = count,
                    "http: delivery failed, batch dropped: {e}"
                );
                Ok(())
            }
        }
    }

    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }
}
