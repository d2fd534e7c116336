// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery of event batches to the Samsara ingestion API.
//!
//! [`Sink`] is the seam between the buffer and the outside world: it takes a
//! batch and answers whether it was accepted. [`HttpPublisher`] is the
//! production implementation, posting JSON (optionally gzipped) to
//! `<url>/v1/events`. Tests substitute scripted sinks.

use async_trait::async_trait;
use flate2::{write::GzEncoder, Compression as GzLevel};
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_ENCODING, CONTENT_TYPE,
};
use reqwest::StatusCode;
use std::error::Error;
use std::io::Write;
use std::time::Instant;
use tracing::{debug, error};

use crate::config::{Compression, Config};
use crate::error::ConfigError;
use crate::event::{timestamp_millis, Event};
use crate::http_utils::build_client;

/// Samsara specific HTTP header carrying the publish time in epoch milliseconds.
pub const PUBLISHED_TIMESTAMP_HEADER: &str = "X-Samsara-publishedTimestamp";

const PUBLISHED_TIMESTAMP: HeaderName = HeaderName::from_static("x-samsara-publishedtimestamp");

/// Ingestion API endpoint, relative to the configured URL.
pub const API_PATH: &str = "/v1/events";

/// Destination for batches of records.
///
/// Implementations must not fail loudly: any transport or encoding problem is
/// reported as `false`, meaning "not accepted, retry later".
#[async_trait]
pub trait Sink<T = Event>: Send + Sync
where
    T: Sync,
{
    async fn post(&self, batch: &[T]) -> bool;
}

#[async_trait]
impl<T, S> Sink<T> for std::sync::Arc<S>
where
    T: Sync,
    S: Sink<T> + ?Sized,
{
    async fn post(&self, batch: &[T]) -> bool {
        (**self).post(batch).await
    }
}

/// Posts event batches to the ingestion API over HTTP.
#[derive(Debug, Clone)]
pub struct HttpPublisher {
    client: reqwest::Client,
    endpoint: String,
    compression: Compression,
}

impl HttpPublisher {
    /// Builds a publisher from `config`, rejecting a missing URL.
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        let base = config.url.trim();
        if base.is_empty() {
            return Err(ConfigError::MissingUrl);
        }

        let client = build_client(config.https_proxy.as_deref(), config.send_timeout)?;
        Ok(HttpPublisher {
            client,
            endpoint: format!("{}{API_PATH}", base.trim_end_matches('/')),
            compression: config.compression,
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            CONTENT_ENCODING,
            HeaderValue::from_static(self.compression.content_encoding()),
        );
        headers.insert(PUBLISHED_TIMESTAMP, HeaderValue::from(timestamp_millis()));
        headers
    }

    fn prepare(&self, batch: &[Event]) -> Result<Vec<u8>, Box<dyn Error>> {
        let json = serde_json::to_vec(batch)?;
        match self.compression {
            Compression::None => Ok(json),
            Compression::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), GzLevel::default());
                encoder.write_all(&json)?;
                Ok(encoder.finish()?)
            }
        }
    }
}

#[async_trait]
impl Sink<Event> for HttpPublisher {
    async fn post(&self, batch: &[Event]) -> bool {
        let body = match self.prepare(batch) {
            Ok(body) => body,
            Err(e) => {
                error!("Failed to prepare payload of {} events: {e}", batch.len());
                return false;
            }
        };

        let time = Instant::now();
        let response = self
            .client
            .post(&self.endpoint)
            .headers(self.headers())
            .body(body)
            .send()
            .await;
        let elapsed = time.elapsed();

        match response {
            Ok(resp) if resp.status() == StatusCode::ACCEPTED => {
                debug!(
                    "Published {} events in {} ms",
                    batch.len(),
                    elapsed.as_millis()
                );
                true
            }
            Ok(resp) => {
                let status = resp.status();
                error!(
                    "{status}: Failed to publish {} events: {:?}",
                    batch.len(),
                    resp.text().await.unwrap_or_default()
                );
                false
            }
            Err(e) => {
                error!(
                    "Error publishing {} events after {} ms: {e:?}",
                    batch.len(),
                    elapsed.as_millis()
                );
                false
            }
        }
    }
}
