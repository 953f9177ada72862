// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use reqwest::Url;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::errors::ConfigError;

pub const DEFAULT_BUFFER_CAPACITY: usize = 100;
pub const MIN_BUFFER_CAPACITY: i64 = 1;
pub const MAX_BUFFER_CAPACITY: i64 = 10_000;

pub const DEFAULT_BUFFER_TIMEOUT: Duration = Duration::from_millis(1000);
pub const MIN_BUFFER_TIMEOUT: Duration = Duration::from_millis(100);
pub const MAX_BUFFER_TIMEOUT: Duration = Duration::from_secs(600);

pub const OPTION_PATH: &str = "http.path";
pub const OPTION_PROXY: &str = "http.proxy";
pub const OPTION_BUFFER_CAPACITY: &str = "http.buffer.capacity";
pub const OPTION_BUFFER_TIMEOUT: &str = "http.buffer.timeout";
pub const OPTION_GZIP: &str = "http.gzip";
pub const OPTION_CRASH: &str = "http.crash";

/// Schemes served by the HTTP adapter.
const SUPPORTED_SCHEMES: [&str; 2] = ["http", "https"];

/// A configured destination, e.g. `https://collector:8443?http.gzip=true`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Adapter name, which doubles as the endpoint scheme.
    pub adapter: String,
    /// `host[:port]` of the collector.
    pub address: String,
    pub options: HashMap<String, String>,
}

impl Route {
    /// Parses a comma-separated list of route URIs, skipping empty entries.
    pub fn parse_list(uris: &str) -> Result<Vec<Route>, ConfigError> {
        uris.split(',')
            .map(str::trim)
            .filter(|uri| !uri.is_empty())
            .map(Route::from_str)
            .collect()
    }

    fn option(&self, name: &str) -> Option<&str> {
        self.options.get(name).map(String::as_str)
    }
}

impl FromStr for Route {
    type Err = ConfigError;

    fn from_str(uri: &str) -> Result<Self, Self::Err> {
        let parsed = Url::parse(uri).map_err(|e| ConfigError::InvalidRoute {
            uri: uri.to_string(),
            reason: e.to_string(),
        })?;

        let adapter = parsed.scheme().to_string();
        if !SUPPORTED_SCHEMES.contains(&adapter.as_str()) {
            return Err(ConfigError::UnsupportedScheme(adapter));
        }

        let host = parsed.host_str().ok_or_else(|| ConfigError::InvalidRoute {
            uri: uri.to_string(),
            reason: "missing host".to_string(),
        })?;
        let address = match parsed.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        let options = parsed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        Ok(Route {
            adapter,
            address,
            options,
        })
    }
}

/// Per-route delivery settings. Immutable once the adapter is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterConfig {
    pub url: String,
    pub proxy: Option<Url>,
    pub capacity: usize,
    pub timeout: Duration,
    pub use_gzip: bool,
    pub crash: bool,
}

impl AdapterConfig {
    /// Builds the adapter settings for `route`.
    ///
    /// Values that cannot be parsed or fall outside their allowed range are
    /// replaced by the defaults; this is logged at debug level only.
    #[must_use]
    pub fn from_route(route: &Route) -> Self {
        let path = route.option(OPTION_PATH).unwrap_or_default();
        let url = format!("{}://{}{}", route.adapter, route.address, path);
        debug!("http: url: {url}");

        let proxy = route
            .option(OPTION_PROXY)
            .filter(|value| !value.is_empty())
            .and_then(|value| match Url::parse(value) {
                Ok(proxy) => {
                    debug!("http: proxy url: {proxy}");
                    Some(proxy)
                }
                Err(e) => {
                    debug!("http: cannot parse proxy url {value}: {e}, connecting directly");
                    None
                }
            });

        let capacity = match route.option(OPTION_BUFFER_CAPACITY) {
            None => DEFAULT_BUFFER_CAPACITY,
            Some(value) => match value.parse::<i64>() {
                Ok(capacity) if (MIN_BUFFER_CAPACITY..=MAX_BUFFER_CAPACITY).contains(&capacity) => {
                    capacity as usize
                }
                Ok(capacity) => {
                    debug!(
                        "http: non-sensical value for parameter: {OPTION_BUFFER_CAPACITY} {capacity}, using default: {DEFAULT_BUFFER_CAPACITY}"
                    );
                    DEFAULT_BUFFER_CAPACITY
                }
                Err(_) => {
                    debug!("http: invalid value for parameter: {OPTION_BUFFER_CAPACITY} {value}");
                    DEFAULT_BUFFER_CAPACITY
                }
            },
        };

        let timeout = match route.option(OPTION_BUFFER_TIMEOUT) {
            None => DEFAULT_BUFFER_TIMEOUT,
            Some(value) => match parse_go_duration(value) {
                Some(timeout) if (MIN_BUFFER_TIMEOUT..=MAX_BUFFER_TIMEOUT).contains(&timeout) => {
                    timeout
                }
                Some(timeout) => {
                    debug!(
                        "http: non-sensical value for parameter: {OPTION_BUFFER_TIMEOUT} {timeout:?}, using default: {DEFAULT_BUFFER_TIMEOUT:?}"
                    );
                    DEFAULT_BUFFER_TIMEOUT
                }
                None => {
                    debug!("http: invalid value for parameter: {OPTION_BUFFER_TIMEOUT} {value}");
                    DEFAULT_BUFFER_TIMEOUT
                }
            },
        };

        let use_gzip = route.option(OPTION_GZIP) == Some("true");
        if use_gzip {
            debug!("http: gzip compression enabled");
        }

        let crash = route.option(OPTION_CRASH) != Some("false");
        if !crash {
            debug!("http: don't crash, keep going");
        }

        AdapterConfig {
            url,
            proxy,
            capacity,
            timeout,
            use_gzip,
            crash,
        }
    }
}

/// Parses a duration written the way Go's `time.ParseDuration` accepts it,
/// e.g. `300ms`, `1.5s` or `1h30m`. Negative durations are rejected.
pub fn parse_go_duration(input: &str) -> Option<Duration> {
    let input = input.trim();
    let input = input.strip_prefix('+').unwrap_or(input);
    if input == "0" {
        return Some(Duration::ZERO);
    }
    if input.is_empty() {
        return None;
    }

    let is_number = |c: char| c.is_ascii_digit() || c == '.';
    let mut rest = input;
    let mut total_nanos = 0f64;
    while !rest.is_empty() {
        let number_end = rest.find(|c: char| !is_number(c)).unwrap_or(rest.len());
        if number_end == 0 {
            return None;
        }
        let value: f64 = rest[..number_end].parse().ok()?;
        rest = &rest[number_end..];

        let unit_end = rest.find(is_number).unwrap_or(rest.len());
        let nanos_per_unit = match &rest[..unit_end] {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return None,
        };
        total_nanos += value * nanos_per_unit;
        rest = &rest[unit_end..];
    }

    Some(Duration::from_nanos(total_nanos.round() as u64))
}

pub const ENV_CATTLE_URL: &str = "CATTLE_URL";
pub const ENV_CATTLE_ACCESS_KEY: &str = "CATTLE_ACCESS_KEY";
pub const ENV_CATTLE_SECRET_KEY: &str = "CATTLE_SECRET_KEY";
pub const ENV_DEBUG: &str = "DEBUG";
pub const ENV_LOGSTASH_FIELDS: &str = "LOGSTASH_FIELDS";
pub const ENV_RANCHER_CACHE_TTL: &str = "RANCHER_CACHE_TTL";
pub const ENV_ROUTE_URIS: &str = "ROUTE_URIS";

/// Process-wide settings, read once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvConfig {
    pub cattle_url: Option<String>,
    pub cattle_access_key: Option<String>,
    pub cattle_secret_key: Option<String>,
    pub debug: bool,
    /// Global fallback for the per-container `LOGSTASH_FIELDS`.
    pub logstash_fields: Option<String>,
    /// How long a resolved Rancher record stays valid. `None` keeps it forever.
    pub cache_ttl: Option<Duration>,
    pub route_uris: Option<String>,
}

impl EnvConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.is_empty());

        let cache_ttl = non_empty(ENV_RANCHER_CACHE_TTL).and_then(|value| {
            let ttl = parse_go_duration(&value).filter(|ttl| !ttl.is_zero());
            if ttl.is_none() {
                debug!("invalid value for {ENV_RANCHER_CACHE_TTL}: {value}, caching indefinitely");
            }
            ttl
        });

        EnvConfig {
            cattle_url: non_empty(ENV_CATTLE_URL),
            cattle_access_key: non_empty(ENV_CATTLE_ACCESS_KEY),
            cattle_secret_key: non_empty(ENV_CATTLE_SECRET_KEY),
            debug: non_empty(ENV_DEBUG).is_some(),
            logstash_fields: non_empty(ENV_LOGSTASH_FIELDS),
            cache_ttl,
            route_uris: non_empty(ENV_ROUTE_URIS),
        }
    }

    pub fn cattle_url(&self) -> Result<&str, ConfigError> {
        self.cattle_url
            .as_deref()
            .ok_or(ConfigError::MissingEnv(ENV_CATTLE_URL))
    }

    pub fn routes(&self) -> Result<Vec<Route>, ConfigError> {
        let uris = self
            .route_uris
            .as_deref()
            .ok_or(ConfigError::MissingEnv(ENV_ROUTE_URIS))?;
        Route::parse_list(uris)
    }
}
