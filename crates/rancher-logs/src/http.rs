// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Collector transport: client construction, request building and sending.
//!
//! The client is built once per adapter. When an outbound proxy is configured,
//! TLS certificate verification is turned off so intercepting proxies work
//! without extra CA setup.

use flate2::{write::GzEncoder, Compression};
use reqwest::header::CONTENT_ENCODING;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use std::io::Write;
use tracing::{debug, error};

use crate::errors::{DeliveryError, FatalError};

/// Creates the collector client, falling back to a direct connection when the
/// proxy cannot be used.
#[must_use]
pub fn get_client(proxy: Option<&Url>) -> Client {
    match build_client(proxy) {
        Ok(client) => client,
        Err(e) => {
            error!("http: unable to use proxy configuration: {e}, falling back to direct connection");
            match build_client(None) {
                Ok(client) => client,
                Err(inner) => {
                    error!("http: failed to build client: {inner}, using reqwest defaults");
                    Client::new()
                }
            }
        }
    }
}

fn build_client(proxy: Option<&Url>) -> Result<Client, reqwest::Error> {
    // New connections are logged by reqwest at debug. Their reads and writes
    // are only dumped at trace.
    let mut builder =
        Client::builder().connection_verbose(tracing::enabled!(tracing::Level::TRACE));

    if let Some(proxy) = proxy {
        builder = builder
            .proxy(reqwest::Proxy::all(proxy.clone())?)
            .danger_accept_invalid_certs(true);
    }

    builder.build()
}

/// Compresses `payload` into an in-memory gzip stream.
pub fn gzip(payload: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(payload.len() / 4), Compression::default());
    encoder.write_all(payload)?;
    encoder.finish()
}

/// Builds the POST for one batch.
///
/// With `use_gzip` the body is compressed and `Content-Encoding: gzip` is set.
/// A compression failure is fatal.
pub fn build_request(
    client: &Client,
    url: &str,
    payload: Vec<u8>,
    use_gzip: bool,
) -> Result<RequestBuilder, FatalError> {
    let request = client.post(url);
    if !use_gzip {
        return Ok(request.body(payload));
    }

    let compressed = gzip(&payload)?;
    debug!(
        "http: compressed {} -> {} bytes",
        payload.len(),
        compressed.len()
    );
    Ok(request.header(CONTENT_ENCODING, "gzip").body(compressed))
}

/// Sends `request` and drains the response body so the connection can be
/// reused. Any status outside 2xx is an error.
pub async fn send(request: RequestBuilder) -> Result<StatusCode, DeliveryError> {
    let response = request.send().await?;
    let status = response.status();

    if let Err(e) = response.bytes().await {
        debug!("http: unable to drain response body: {e}");
    }

    if status.is_success() {
        Ok(status)
    } else {
        Err(DeliveryError::Status(status))
    }
}
