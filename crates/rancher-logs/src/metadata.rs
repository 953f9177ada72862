// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Rancher metadata for containers, resolved through the API and cached per
//! Docker container id.

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use crate::fields::StaticFields;
use crate::rancher::{ApiContainer, ContainerLister};

/// The `rancher` block attached to every record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RancherInfo {
    pub container: RancherContainer,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RancherContainer {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub ip: String,
    #[serde(rename = "rancherId", skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(rename = "hostId", skip_serializing_if = "String::is_empty")]
    pub host_id: String,
    #[serde(rename = "dockerId", skip_serializing_if = "String::is_empty")]
    pub docker_id: String,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, Value>,
}

impl RancherInfo {
    /// Normalizes an API record for the Docker container `docker_id`.
    pub fn from_api(container: ApiContainer, docker_id: &str) -> Self {
        let ip = container.ip_address().unwrap_or_default().to_string();
        RancherInfo {
            container: RancherContainer {
                name: container.name.unwrap_or_default(),
                ip,
                id: container.id.unwrap_or_default(),
                host_id: container.host_id.unwrap_or_default(),
                docker_id: docker_id.to_string(),
                labels: container.labels.unwrap_or_default(),
            },
        }
    }
}

#[derive(Debug)]
struct CachedInfo {
    info: Arc<RancherInfo>,
    resolved_at: Instant,
}

/// Per-container cache of Rancher records and static fields.
///
/// Shared between adapters through an `Arc`. Locks are never held across an
/// `.await`.
#[derive(Debug, Default)]
pub struct MetadataCache {
    containers: Mutex<HashMap<String, CachedInfo>>,
    fields: Mutex<HashMap<String, Arc<StaticFields>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MetadataCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, container_id: &str) -> Option<Arc<RancherInfo>> {
        lock(&self.containers)
            .get(container_id)
            .map(|cached| Arc::clone(&cached.info))
    }

    /// Like [`MetadataCache::get`], but ignores entries older than `ttl`.
    fn get_fresh(&self, container_id: &str, ttl: Option<Duration>) -> Option<Arc<RancherInfo>> {
        let containers = lock(&self.containers);
        let cached = containers.get(container_id)?;
        match ttl {
            Some(ttl) if cached.resolved_at.elapsed() >= ttl => None,
            _ => Some(Arc::clone(&cached.info)),
        }
    }

    /// Caches `info` under its Docker container id.
    pub fn insert(&self, info: Arc<RancherInfo>) {
        let key = info.container.docker_id.clone();
        lock(&self.containers).insert(
            key,
            CachedInfo {
                info,
                resolved_at: Instant::now(),
            },
        );
    }

    /// Removes the record for `container_id`. Returns whether one was cached.
    pub fn remove(&self, container_id: &str) -> bool {
        lock(&self.containers).remove(container_id).is_some()
    }

    pub fn contains(&self, container_id: &str) -> bool {
        lock(&self.containers).contains_key(container_id)
    }

    pub fn len(&self) -> usize {
        lock(&self.containers).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get_fields(&self, container_id: &str) -> Option<Arc<StaticFields>> {
        lock(&self.fields).get(container_id).cloned()
    }

    pub fn insert_fields(&self, container_id: &str, fields: Arc<StaticFields>) {
        lock(&self.fields).insert(container_id.to_string(), fields);
    }
}

/// Resolves Docker container ids to Rancher records, going through the cache.
pub struct MetadataResolver {
    lister: Arc<dyn ContainerLister>,
    cache: Arc<MetadataCache>,
    ttl: Option<Duration>,
}

impl MetadataResolver {
    pub fn new(lister: Arc<dyn ContainerLister>, cache: Arc<MetadataCache>) -> Self {
        MetadataResolver {
            lister,
            cache,
            ttl: None,
        }
    }

    /// Re-queries the API for entries older than `ttl`. `None` caches forever.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn cache(&self) -> &Arc<MetadataCache> {
        &self.cache
    }

    /// Returns the Rancher record for `container_id`, from the cache when
    /// possible. `None` means the line cannot be enriched and must be dropped.
    pub async fn resolve(&self, container_id: &str) -> Option<Arc<RancherInfo>> {
        if let Some(info) = self.cache.get_fresh(container_id, self.ttl) {
            return Some(info);
        }
        self.refresh(container_id).await
    }

    /// Queries the API for `container_id` regardless of the cache.
    ///
    /// A cached record is evicted when the API no longer knows the container.
    /// API errors leave the cache untouched.
    pub async fn refresh(&self, container_id: &str) -> Option<Arc<RancherInfo>> {
        let containers = match self.lister.list_by_external_id(container_id).await {
            Ok(containers) => containers,
            Err(e) => {
                error!("rancher: unable to list containers for {container_id}: {e}");
                return None;
            }
        };

        // The API filter is not trusted on its own.
        let Some(container) = containers
            .into_iter()
            .find(|c| c.has_external_id(container_id))
        else {
            if self.cache.remove(container_id) {
                info!("Removed container ID {container_id} from cache");
            }
            debug!("Could not find rancher metadata in the API for {container_id}");
            return None;
        };

        let info = Arc::new(RancherInfo::from_api(container, container_id));
        self.cache.insert(Arc::clone(&info));
        Some(info)
    }
}
