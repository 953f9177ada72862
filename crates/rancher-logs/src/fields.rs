// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Static tag fields attached to every record of a container.
//!
//! Fields come from the container's `LOGSTASH_FIELDS` variable, a comma-separated
//! list of `key=value` pairs, or from the process-wide variable of the same name
//! when the container does not set one.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::config::ENV_LOGSTASH_FIELDS;
use crate::message::Container;
use crate::metadata::MetadataCache;

pub type StaticFields = HashMap<String, String>;

/// Parses `key=value,key=value` into a map.
///
/// Entries that do not contain exactly one `=` are skipped.
pub fn parse_fields(raw: &str) -> StaticFields {
    let mut fields = StaticFields::new();
    for entry in raw.split(',') {
        if entry.is_empty() {
            continue;
        }
        let mut parts = entry.split('=');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(key), Some(value), None) => {
                fields.insert(key.to_string(), value.to_string());
            }
            _ => debug!("{ENV_LOGSTASH_FIELDS}: skipping malformed entry '{entry}'"),
        }
    }
    fields
}

#[derive(Debug, Clone)]
pub struct FieldExtractor {
    global_fields: Option<String>,
    cache: Arc<MetadataCache>,
}

impl FieldExtractor {
    pub fn new(global_fields: Option<String>, cache: Arc<MetadataCache>) -> Self {
        FieldExtractor {
            global_fields,
            cache,
        }
    }

    /// Returns the static fields for `container`, parsing them on first use.
    pub fn extract_fields(&self, container: &Container) -> Arc<StaticFields> {
        if let Some(fields) = self.cache.get_fields(&container.id) {
            return fields;
        }

        let raw = container
            .env_var(ENV_LOGSTASH_FIELDS)
            .or(self.global_fields.as_deref())
            .unwrap_or_default();
        let fields = Arc::new(parse_fields(raw));
        self.cache
            .insert_fields(&container.id, Arc::clone(&fields));
        fields
    }
}
