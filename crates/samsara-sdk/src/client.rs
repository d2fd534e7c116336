// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Entry point for applications recording events.
//!
//! A [`Client`] owns the event buffer and the sink. Events go in through
//! [`Client::record_event`] (buffered) or [`Client::publish_events`] (sent
//! right away), and the background coordinator drains the buffer on its own
//! schedule between [`Client::start_publishing`] and
//! [`Client::stop_publishing`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, error};

use crate::config::Config;
use crate::coordinator::{CoordinatorHandle, FlushCoordinator, FlushOutcome};
use crate::error::{ConfigError, ValidationError};
use crate::event::{enrich, validate, validate_batch, EnrichmentDefaults, Event};
use crate::publisher::{HttpPublisher, Sink};
use crate::ring_buffer::RingBuffer;

pub struct Client<S = HttpPublisher>
where
    S: Sink<Event> + 'static,
{
    config: Config,
    defaults: EnrichmentDefaults,
    buffer: Arc<RingBuffer<Event>>,
    sink: Arc<S>,
    flush_gate: Arc<TokioMutex<()>>,
    publishing: Mutex<Option<CoordinatorHandle<S>>>,
}

impl Client<HttpPublisher> {
    /// Builds a client publishing to the ingestion API at `config.url`.
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        let publisher = HttpPublisher::new(&config)?;
        Self::with_sink(config, publisher)
    }
}

impl<S> Client<S>
where
    S: Sink<Event> + 'static,
{
    /// Builds a client delivering to `sink`.
    ///
    /// When `config.start_publishing` is set the background coordinator is
    /// started here, which requires a running tokio runtime.
    pub fn with_sink(config: Config, sink: S) -> Result<Self, ConfigError> {
        config.validate()?;

        let client = Client {
            defaults: EnrichmentDefaults {
                source_id: config.default_source_id.clone(),
            },
            buffer: Arc::new(RingBuffer::new(config.capacity)),
            sink: Arc::new(sink),
            flush_gate: Arc::new(TokioMutex::new(())),
            publishing: Mutex::new(None),
            config,
        };

        if client.config.start_publishing {
            if tokio::runtime::Handle::try_current().is_err() {
                return Err(ConfigError::Invalid(
                    "start_publishing requires a running tokio runtime".to_string(),
                ));
            }
            client.start_publishing();
        }
        Ok(client)
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn buffer(&self) -> &Arc<RingBuffer<Event>> {
        &self.buffer
    }

    /// Enriches, validates and buffers a single event.
    ///
    /// A rejected event is not buffered. Never blocks on a flush in progress.
    pub fn record_event(&self, mut event: Event) -> Result<(), ValidationError> {
        enrich(&mut event, &self.defaults);
        validate(&event)?;
        self.buffer.push(event);
        Ok(())
    }

    /// Enriches and validates every event, then posts them as one batch,
    /// bypassing the buffer.
    ///
    /// If any event is invalid nothing is sent. Otherwise returns whether the
    /// sink accepted the batch.
    pub async fn publish_events(&self, mut events: Vec<Event>) -> Result<bool, ValidationError> {
        for event in &mut events {
            enrich(event, &self.defaults);
        }
        validate_batch(&events)?;

        if events.is_empty() {
            return Ok(true);
        }
        Ok(self.sink.post(&events).await)
    }

    /// Starts the background coordinator. Returns `false` if it was already
    /// running or no tokio runtime is available.
    pub fn start_publishing(&self) -> bool {
        let mut publishing = self.publishing();
        if publishing.is_some() {
            return false;
        }
        if tokio::runtime::Handle::try_current().is_err() {
            error!("Cannot start publishing events outside of a tokio runtime");
            return false;
        }

        let handle = self.coordinator().spawn();
        *publishing = Some(handle);
        debug!("Started publishing events");
        true
    }

    /// Stops the background coordinator, then flushes whatever is buffered.
    ///
    /// Calling it while not publishing only performs the final flush.
    pub async fn stop_publishing(&self) -> FlushOutcome {
        let handle = self.publishing().take();
        match handle {
            Some(handle) => {
                debug!("Stopping event publishing");
                handle.shutdown().await
            }
            None => self.flush().await,
        }
    }

    #[must_use]
    pub fn is_publishing(&self) -> bool {
        self.publishing()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Flushes the buffer once, ignoring the flush threshold.
    pub async fn flush(&self) -> FlushOutcome {
        self.coordinator().flush().await
    }

    fn coordinator(&self) -> FlushCoordinator<S> {
        FlushCoordinator::new(
            Arc::clone(&self.buffer),
            Arc::clone(&self.sink),
            self.config.flush_threshold,
            self.config.flush_interval,
        )
        .with_gate(Arc::clone(&self.flush_gate))
    }

    fn publishing(&self) -> MutexGuard<'_, Option<CoordinatorHandle<S>>> {
        self.publishing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S> Drop for Client<S>
where
    S: Sink<Event> + 'static,
{
    fn drop(&mut self) {
        if let Some(handle) = self.publishing().take() {
            handle.cancel();
        }
    }
}
