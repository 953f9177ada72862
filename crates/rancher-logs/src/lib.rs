// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Buffered HTTP delivery of container logs enriched with Rancher metadata.
//!
//! Each configured route gets its own [`adapter::HttpAdapter`], which consumes a
//! stream of [`message::Message`]s, tags every line with static fields and the
//! container's Rancher record, batches the results and POSTs them as a JSON array.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod adapter;
pub mod buffer;
pub mod config;
pub mod errors;
pub mod fields;
pub mod flusher;
pub mod http;
pub mod message;
pub mod metadata;
pub mod rancher;
pub mod record;
