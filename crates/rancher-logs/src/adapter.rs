// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The per-route delivery engine.
//!
//! An [`HttpAdapter`] owns one buffer and one flush timer. Records are appended
//! until the buffer is full or the timer fires, then the batch is detached and
//! shipped from a background task while the loop keeps consuming.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, Sleep};
use tokio_util::task::TaskTracker;
use tracing::{debug, error};

use crate::buffer::Buffer;
use crate::config::AdapterConfig;
use crate::errors::FatalError;
use crate::fields::FieldExtractor;
use crate::flusher::{AdapterStats, FlushReason, Flusher, FlusherConfig};
use crate::http::get_client;
use crate::message::Message;
use crate::metadata::MetadataResolver;
use crate::record::build_record;

pub struct HttpAdapter {
    url: String,
    timeout: Duration,
    buffer: Buffer,
    resolver: Arc<MetadataResolver>,
    fields: FieldExtractor,
    flusher: Flusher,
    stats: Arc<AdapterStats>,
    tracker: TaskTracker,
    fatal_rx: mpsc::UnboundedReceiver<FatalError>,
}

impl HttpAdapter {
    #[must_use]
    pub fn new(
        config: AdapterConfig,
        resolver: Arc<MetadataResolver>,
        fields: FieldExtractor,
    ) -> Self {
        let stats = Arc::new(AdapterStats::default());
        let tracker = TaskTracker::new();
        let (fatal_tx, fatal_rx) = mpsc::unbounded_channel();

        let flusher = Flusher::new(FlusherConfig {
            client: get_client(config.proxy.as_ref()),
            url: config.url.clone(),
            use_gzip: config.use_gzip,
            crash: config.crash,
            stats: Arc::clone(&stats),
            tracker: tracker.clone(),
            fatal_tx,
        });

        HttpAdapter {
            url: config.url,
            timeout: config.timeout,
            buffer: Buffer::new(config.capacity),
            resolver,
            fields,
            flusher,
            stats,
            tracker,
            fatal_rx,
        }
    }

    pub fn stats(&self) -> Arc<AdapterStats> {
        Arc::clone(&self.stats)
    }

    /// Consumes `logstream` until it closes.
    ///
    /// On close the remaining records are flushed and in-flight deliveries are
    /// awaited. A delivery failure under the crash policy stops the loop and
    /// is returned.
    pub async fn stream(
        mut self,
        mut logstream: mpsc::Receiver<Message>,
    ) -> Result<(), FatalError> {
        debug!(url = %self.url, capacity = self.buffer.capacity(), timeout = ?self.timeout, "http: adapter started");

        let timer = time::sleep(self.timeout);
        tokio::pin!(timer);

        loop {
            // The timer is polled before the input so a busy stream cannot
            // hold back a due timeout flush.
            tokio::select! {
                biased;
                Some(fatal) = self.fatal_rx.recv() => {
                    return Err(fatal);
                }
                () = &mut timer => {
                    self.flush(FlushReason::Timeout, timer.as_mut());
                }
                message = logstream.recv() => match message {
                    Some(message) => {
                        if self.process(message).await {
                            self.flush(FlushReason::Full, timer.as_mut());
                        }
                    }
                    None => {
                        self.flush(FlushReason::Shutdown, timer.as_mut());
                        break;
                    }
                },
            }
        }

        self.finish().await
    }

    /// Enriches and buffers `message`. Returns whether the buffer is full.
    async fn process(&self, message: Message) -> bool {
        let fields = self.fields.extract_fields(&message.container);

        let Some(rancher) = self.resolver.resolve(&message.container.id).await else {
            return false;
        };

        let record = match build_record(&message, &fields, &rancher) {
            Ok(record) => record,
            Err(e) => {
                error!("http: unable to build record for {}: {e}", message.container.id);
                return false;
            }
        };

        self.buffer.push(record) >= self.buffer.capacity()
    }

    fn flush(&self, reason: FlushReason, timer: Pin<&mut Sleep>) {
        if let Some(batch) = self.buffer.detach() {
            let messages = batch.len();
            if self.flusher.flush(batch, reason) {
                debug!(
                    %reason,
                    messages,
                    in_flight = self.flusher.in_flight(),
                    "http: batch handed off"
                );
            }
        }
        // Rearming also cancels a deadline that is already due.
        timer.reset(Instant::now() + self.timeout);
    }

    async fn finish(mut self) -> Result<(), FatalError> {
        self.tracker.close();
        debug!(url = %self.url, in_flight = self.flusher.in_flight(), "http: waiting for pending flushes");

        tokio::select! {
            biased;
            Some(fatal) = self.fatal_rx.recv() => return Err(fatal),
            () = self.tracker.wait() => {}
        }

        match self.fatal_rx.try_recv() {
            Ok(fatal) => Err(fatal),
            Err(_) => {
                debug!(
                    url = %self.url,
                    total = self.stats.total_message_count(),
                    failed = self.stats.failed_batch_count(),
                    "http: adapter stopped"
                );
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Route;
    use crate::errors::RancherError;
    use crate::message::Container;
    use crate::metadata::MetadataCache;
    use crate::rancher::{ApiContainer, ContainerLister};
    use async_trait::async_trait;
    use tracing_test::traced_test;

    struct FixedLister;

    #[async_trait]
    impl ContainerLister for FixedLister {
        async fn list_by_external_id(
            &self,
            external_id: &str,
        ) -> Result<Vec<ApiContainer>, RancherError> {
            if external_id == "unknown" {
                return Ok(vec![]);
            }
            Ok(vec![ApiContainer {
                external_id: Some(external_id.to_string()),
                name: Some("web-1".to_string()),
                ..Default::default()
            }])
        }
    }

    fn adapter(uri: &str) -> HttpAdapter {
        let route: Route = uri.parse().unwrap();
        let cache = Arc::new(MetadataCache::new());
        let resolver = Arc::new(MetadataResolver::new(Arc::new(FixedLister), Arc::clone(&cache)));
        HttpAdapter::new(
            AdapterConfig::from_route(&route),
            resolver,
            FieldExtractor::new(None, cache),
        )
    }

    fn message(id: &str) -> Message {
        Message {
            container: Container {
                id: id.to_string(),
                ..Default::default()
            },
            data: "line".to_string(),
        }
    }

    #[tokio::test]
    async fn test_process_reports_full_buffer() {
        let adapter = adapter("http://127.0.0.1:1?http.buffer.capacity=2");
        assert!(!adapter.process(message("abc")).await);
        assert!(adapter.process(message("abc")).await);
        assert_eq!(adapter.buffer.len(), 2);
    }

    #[tokio::test]
    async fn test_process_drops_unknown_container() {
        let adapter = adapter("http://127.0.0.1:1");
        assert!(!adapter.process(message("unknown")).await);
        assert!(adapter.buffer.is_empty());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_flush_logs_in_flight_deliveries() {
        let adapter = adapter("http://127.0.0.1:1?http.crash=false");
        let timer = time::sleep(Duration::from_secs(60));
        tokio::pin!(timer);

        assert!(!adapter.process(message("abc")).await);
        adapter.flush(FlushReason::Timeout, timer.as_mut());

        // Spawned deliveries have not run yet on the test runtime.
        assert!(logs_contain("http: batch handed off"));
        assert!(logs_contain("in_flight=1"));
        assert!(adapter.buffer.is_empty());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_empty_stream_stops_cleanly() {
        let adapter = adapter("http://127.0.0.1:1");
        let stats = adapter.stats();
        let (tx, rx) = mpsc::channel(1);
        drop(tx);

        adapter.stream(rx).await.unwrap();
        assert_eq!(stats.total_message_count(), 0);
        assert!(logs_contain("http: adapter stopped"));
    }
}
