// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

//! Reads container log messages from stdin, one JSON object per line, and fans
//! them out to one adapter per route in `ROUTE_URIS`.

use anyhow::{bail, Context};
use std::{env, sync::Arc};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
    task::JoinSet,
};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt::MakeWriter, util::SubscriberInitExt, EnvFilter};

use rancher_logs::{
    adapter::HttpAdapter,
    config::{AdapterConfig, EnvConfig},
    errors::FatalError,
    fields::FieldExtractor,
    message::Message,
    metadata::{MetadataCache, MetadataResolver},
    rancher::{ContainerLister, RancherClient},
};

const MESSAGE_CHANNEL_CAPACITY: usize = 1024;

#[tokio::main]
pub async fn main() {
    let config = EnvConfig::from_env();
    init_logging(log_filter(config.debug), std::io::stdout);

    match run(config).await {
        Ok(()) => info!("input closed, all adapters stopped"),
        Err(e) => {
            error!("{e:#}");
            // Exiting here avoids waiting on the blocking stdin reader.
            std::process::exit(1);
        }
    }
}

/// Default filter: `debug` or `info`, without HTTP/2 and TLS internals.
/// reqwest stays visible so new collector connections are logged at debug.
fn default_directives(debug: bool) -> String {
    let level = if debug { "debug" } else { "info" };
    format!("h2=off,hyper=off,rustls=off,{level}")
}

fn log_filter(debug: bool) -> EnvFilter {
    let directives = env::var("RUST_LOG").unwrap_or_else(|_| default_directives(debug));
    EnvFilter::try_new(&directives).unwrap_or_else(|e| {
        eprintln!("invalid log filter {directives}: {e}, using defaults");
        EnvFilter::new(default_directives(debug))
    })
}

/// Installs the global subscriber. `try_init` also routes `log` records
/// (reqwest, hyper-util) into it.
fn init_logging<W>(filter: EnvFilter, writer: W)
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let result = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .with_writer(writer)
        .finish()
        .try_init();

    if let Err(e) = result {
        eprintln!("setting default subscriber failed: {e}");
    }
}

async fn run(config: EnvConfig) -> anyhow::Result<()> {
    let cattle_url = config.cattle_url()?;
    let routes = config.routes()?;
    if routes.is_empty() {
        bail!("no routes configured");
    }

    let lister: Arc<dyn ContainerLister> = Arc::new(
        RancherClient::new(
            cattle_url,
            config.cattle_access_key.clone(),
            config.cattle_secret_key.clone(),
        )
        .context("unable to create the Rancher API client")?,
    );
    let cache = Arc::new(MetadataCache::new());
    let resolver = Arc::new(
        MetadataResolver::new(lister, Arc::clone(&cache)).with_ttl(config.cache_ttl),
    );

    let mut adapters = JoinSet::new();
    let mut senders = Vec::with_capacity(routes.len());
    for route in &routes {
        let adapter_config = AdapterConfig::from_route(route);
        info!("starting adapter for {}", adapter_config.url);

        let (tx, rx) = mpsc::channel(MESSAGE_CHANNEL_CAPACITY);
        let adapter = HttpAdapter::new(
            adapter_config,
            Arc::clone(&resolver),
            FieldExtractor::new(config.logstash_fields.clone(), Arc::clone(&cache)),
        );
        adapters.spawn(adapter.stream(rx));
        senders.push(tx);
    }

    let reader = read_messages(senders);
    tokio::pin!(reader);

    loop {
        tokio::select! {
            result = &mut reader => {
                result.context("unable to read messages from stdin")?;
                break;
            }
            Some(joined) = adapters.join_next() => check_adapter(joined)?,
        }
    }

    while let Some(joined) = adapters.join_next().await {
        check_adapter(joined)?;
    }
    Ok(())
}

fn check_adapter(
    joined: Result<Result<(), FatalError>, tokio::task::JoinError>,
) -> anyhow::Result<()> {
    joined.context("adapter task failed")??;
    Ok(())
}

/// Forwards every message read from stdin to all adapters. Dropping the
/// senders on return ends the adapters' streams.
async fn read_messages(senders: Vec<mpsc::Sender<Message>>) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let message: Message = match serde_json::from_str(&line) {
            Ok(message) => message,
            Err(e) => {
                warn!("skipping malformed message: {e}");
                continue;
            }
        };

        for tx in &senders {
            if tx.send(message.clone()).await.is_err() {
                debug!("adapter stopped, message for {} not delivered", message.container.id);
            }
        }
    }
    Ok(())
}
