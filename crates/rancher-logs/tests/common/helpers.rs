// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helpers to run an adapter against a mock collector

use mockito::Mock;
use rancher_logs::adapter::HttpAdapter;
use rancher_logs::config::{AdapterConfig, Route};
use rancher_logs::errors::FatalError;
use rancher_logs::fields::FieldExtractor;
use rancher_logs::flusher::AdapterStats;
use rancher_logs::message::{Container, Message};
use rancher_logs::metadata::{MetadataCache, MetadataResolver};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::mocks::StaticLister;

pub struct RunningAdapter {
    pub tx: mpsc::Sender<Message>,
    pub handle: JoinHandle<Result<(), FatalError>>,
    pub stats: Arc<AdapterStats>,
}

/// The API lister behind [`spawn_adapter`]: only `abc123` (named `web-1`) exists.
pub fn known_lister() -> StaticLister {
    StaticLister::default().with_container("abc123", "web-1", "10.42.0.7")
}

/// Starts an adapter for `uri` backed by [`known_lister`].
pub fn spawn_adapter(uri: &str) -> RunningAdapter {
    spawn_adapter_with(uri, Arc::new(known_lister()))
}

pub fn spawn_adapter_with(uri: &str, lister: Arc<StaticLister>) -> RunningAdapter {
    let route: Route = uri.parse().expect("test route should parse");
    let cache = Arc::new(MetadataCache::new());
    let resolver = Arc::new(MetadataResolver::new(lister, Arc::clone(&cache)));

    let adapter = HttpAdapter::new(
        AdapterConfig::from_route(&route),
        resolver,
        FieldExtractor::new(Some("env=test".to_string()), cache),
    );
    let stats = adapter.stats();
    let (tx, rx) = mpsc::channel(16);
    let handle = tokio::spawn(adapter.stream(rx));

    RunningAdapter { tx, handle, stats }
}

pub fn message(container_id: &str, data: &str) -> Message {
    Message {
        container: Container {
            id: container_id.to_string(),
            name: "/web-1".to_string(),
            image: "nginx:1.25".to_string(),
            hostname: "web-1".to_string(),
            env: vec![],
        },
        data: data.to_string(),
    }
}

/// The record an adapter from [`spawn_adapter`] sends for a plain-text line
/// of `abc123`.
pub fn expected_record(data: &str) -> Value {
    json!({
        "message": data,
        "env": "test",
        "docker": {
            "name": "/web-1",
            "id": "abc123",
            "image": "nginx:1.25",
            "hostname": "web-1"
        },
        "rancher": {
            "container": {
                "name": "web-1",
                "ip": "10.42.0.7",
                "rancherId": "1i1",
                "dockerId": "abc123"
            }
        }
    })
}

/// Polls `mock` until it has been hit as expected or `limit` elapses.
pub async fn wait_for(mock: &Mock, limit: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if mock.matched_async().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    mock.matched_async().await
}
