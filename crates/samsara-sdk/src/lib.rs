// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # Samsara SDK
//!
//! Client-side buffering and publishing of telemetry events to the Samsara
//! ingestion API.
//!
//! Events are enriched and validated on the way in, stored in a bounded ring
//! buffer that drops the oldest record when full, and periodically flushed to
//! a [`Sink`] by a background task. Delivery is at-least-once: a batch stays
//! buffered until the sink accepts it.
//!
//! - [`ring_buffer`]: bounded concurrent buffer with the snapshot/commit protocol
//! - [`coordinator`]: interval-driven flush task
//! - [`event`]: event type, enrichment and validation
//! - [`publisher`]: the [`Sink`] seam and the HTTP implementation
//! - [`client`]: facade tying the above together
//!
//! ```rust,no_run
//! use samsara_sdk::{Client, Config, Event};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::new(Config {
//!     url: "http://samsara-ingestion.local".to_string(),
//!     default_source_id: "device-1".to_string(),
//!     ..Default::default()
//! })?;
//!
//! client.record_event(Event::new().with("eventName", "app.started"))?;
//! client.stop_publishing().await;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod event;
pub mod http_utils;
pub mod publisher;
pub mod ring_buffer;

pub use client::Client;
pub use config::{Compression, Config};
pub use coordinator::{CoordinatorHandle, FlushCoordinator, FlushOutcome};
pub use error::{ConfigError, ValidationError};
pub use event::{EnrichmentDefaults, Event};
pub use publisher::{HttpPublisher, Sink};
pub use ring_buffer::RingBuffer;
