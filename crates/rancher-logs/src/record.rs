// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::Serialize;
use serde_json::{Map, Value};

use crate::fields::StaticFields;
use crate::message::{Container, Message};
use crate::metadata::RancherInfo;

/// One enriched log line, as sent to the collector.
pub type LogRecord = Map<String, Value>;

/// The `docker` block attached to every record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DockerInfo<'a> {
    pub name: &'a str,
    pub id: &'a str,
    pub image: &'a str,
    pub hostname: &'a str,
}

impl<'a> From<&'a Container> for DockerInfo<'a> {
    fn from(container: &'a Container) -> Self {
        DockerInfo {
            name: &container.name,
            id: &container.id,
            image: &container.image,
            hostname: &container.hostname,
        }
    }
}

/// Builds the record for `message`.
///
/// A payload holding a JSON object is merged into the record; anything else is
/// kept verbatim under `message`. Static fields, then the `docker` and
/// `rancher` blocks are written on top.
pub fn build_record(
    message: &Message,
    fields: &StaticFields,
    rancher: &RancherInfo,
) -> Result<LogRecord, serde_json::Error> {
    let mut record = match serde_json::from_str::<LogRecord>(&message.data) {
        Ok(parsed) => parsed,
        Err(_) => {
            let mut record = LogRecord::new();
            record.insert("message".to_string(), Value::String(message.data.clone()));
            record
        }
    };

    for (key, value) in fields {
        record.insert(key.clone(), Value::String(value.clone()));
    }

    record.insert(
        "docker".to_string(),
        serde_json::to_value(DockerInfo::from(&message.container))?,
    );
    record.insert("rancher".to_string(), serde_json::to_value(rancher)?);

    Ok(record)
}
