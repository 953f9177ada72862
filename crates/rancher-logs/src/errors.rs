// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use reqwest::StatusCode;
use thiserror::Error;

/// Problems found while reading routes or process configuration.
///
/// Out-of-range option values never end up here: they fall back to defaults.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid route uri {uri}: {reason}")]
    InvalidRoute { uri: String, reason: String },

    #[error("unsupported adapter scheme: {0}")]
    UnsupportedScheme(String),

    #[error("{0} environment variable is not set")]
    MissingEnv(&'static str),
}

/// Errors returned by the orchestrator (Rancher) API client.
#[derive(Debug, Error)]
pub enum RancherError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("rancher api responded with status {0}")]
    Status(StatusCode),
}

/// A batch could not be delivered to the collector.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("error sending request: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("response not successful but {0}")]
    Status(StatusCode),
}

/// Errors that must terminate the process.
///
/// The library never exits on its own; [`crate::adapter::HttpAdapter::stream`]
/// returns one of these and the driver decides what to do with it.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("delivery to {url} failed: {source}")]
    Delivery {
        url: String,
        #[source]
        source: DeliveryError,
    },

    #[error("unable to gzip payload: {0}")]
    Compression(#[from] std::io::Error),

    #[error("flush task failed: {0}")]
    FlushTask(#[from] tokio::task::JoinError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let error = ConfigError::MissingEnv("CATTLE_URL");
        assert_eq!(
            error.to_string(),
            "CATTLE_URL environment variable is not set"
        );

        let error = ConfigError::UnsupportedScheme("syslog".to_string());
        assert_eq!(error.to_string(), "unsupported adapter scheme: syslog");
    }

    #[test]
    fn test_fatal_delivery_display() {
        let error = FatalError::Delivery {
            url: "http://collector:8080/logs".to_string(),
            source: DeliveryError::Status(StatusCode::INTERNAL_SERVER_ERROR),
        };
        assert_eq!(
            error.to_string(),
            "delivery to http://collector:8080/logs failed: response not successful but 500 Internal Server Error"
        );
    }
}
