// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory stand-ins for the Rancher API

use async_trait::async_trait;
use rancher_logs::errors::RancherError;
use rancher_logs::rancher::{ApiContainer, ContainerLister};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Knows a fixed set of containers, keyed by Docker id.
#[derive(Default)]
pub struct StaticLister {
    containers: HashMap<String, ApiContainer>,
    latency: Option<Duration>,
    calls: AtomicUsize,
}

impl StaticLister {
    /// Delays every lookup, like a round-trip to a real API.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_container(mut self, docker_id: &str, name: &str, ip: &str) -> Self {
        self.containers.insert(
            docker_id.to_string(),
            ApiContainer {
                id: Some(format!("1i{}", self.containers.len() + 1)),
                external_id: Some(docker_id.to_string()),
                name: Some(name.to_string()),
                primary_ip_address: Some(ip.to_string()),
                ..Default::default()
            },
        );
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContainerLister for StaticLister {
    async fn list_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Vec<ApiContainer>, RancherError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        Ok(self.containers.get(external_id).cloned().into_iter().collect())
    }
}
