// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

/// Container details attached to every log line by the log router.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub hostname: String,
    /// Environment in `KEY=VALUE` form, as reported by the container runtime.
    #[serde(default)]
    pub env: Vec<String>,
}

impl Container {
    /// Returns the value of `key` from the container environment.
    ///
    /// When a variable is defined more than once the last definition wins.
    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .rev()
            .find_map(|entry| entry.strip_prefix(key)?.strip_prefix('='))
    }
}

/// A single raw log line from a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub container: Container,
    #[serde(default)]
    pub data: String,
}
