// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Periodic flushing of the event buffer.
//!
//! A single tokio task ticks on a fixed interval. On each tick it reads the
//! buffer's pending count and, once the threshold is met, runs one
//! snapshot/flush cycle against the sink. A failed delivery is not retried
//! within the tick; the records stay buffered for the next one.
//!
//! Ticks never overlap: the task awaits each flush before waiting for the
//! next tick, and missed ticks are delayed rather than bunched up.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as TokioMutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::event::Event;
use crate::publisher::Sink;
use crate::ring_buffer::RingBuffer;

/// What a single coordinator tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Fewer records than the threshold were pending.
    Skipped,
    /// The sink accepted this many records.
    Delivered(usize),
    /// The sink rejected this many records; they remain buffered.
    Retained(usize),
}

pub struct FlushCoordinator<S> {
    buffer: Arc<RingBuffer<Event>>,
    sink: Arc<S>,
    threshold: usize,
    interval: Duration,
    last_evicted: u64,
    // Held for the whole snapshot/post/commit cycle.
    gate: Arc<TokioMutex<()>>,
}

impl<S> FlushCoordinator<S>
where
    S: Sink<Event> + 'static,
{
    #[must_use]
    pub fn new(
        buffer: Arc<RingBuffer<Event>>,
        sink: Arc<S>,
        threshold: usize,
        interval: Duration,
    ) -> Self {
        let last_evicted = buffer.evicted();
        FlushCoordinator {
            buffer,
            sink,
            threshold,
            interval,
            last_evicted,
            gate: Arc::new(TokioMutex::new(())),
        }
    }

    /// Shares a flush gate with other flushers of the same buffer, so that
    /// at most one of them runs the flush protocol at a time.
    #[must_use]
    pub fn with_gate(mut self, gate: Arc<TokioMutex<()>>) -> Self {
        self.gate = gate;
        self
    }

    /// Checks the threshold and flushes once if it is met.
    pub async fn tick(&mut self) -> FlushOutcome {
        self.report_evictions();

        let pending = self.buffer.count();
        if pending == 0 || pending < self.threshold {
            return FlushOutcome::Skipped;
        }
        self.flush().await
    }

    /// Flushes whatever is buffered, ignoring the threshold.
    pub async fn flush(&mut self) -> FlushOutcome {
        let _gate = self.gate.lock().await;
        let (batch, delivered) = self.buffer.flush_and_report(self.sink.as_ref()).await;
        if batch.is_empty() {
            return FlushOutcome::Skipped;
        }

        if delivered {
            debug!("Flushed {} buffered events", batch.len());
            FlushOutcome::Delivered(batch.len())
        } else {
            warn!(
                "Failed to publish {} buffered events, keeping them for the next flush",
                batch.len()
            );
            FlushOutcome::Retained(batch.len())
        }
    }

    /// Starts the periodic flush loop on the current tokio runtime.
    ///
    /// The loop runs until the returned handle is shut down.
    #[must_use]
    pub fn spawn(mut self) -> CoordinatorHandle<S> {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let fallback = FlushCoordinator::new(
            Arc::clone(&self.buffer),
            Arc::clone(&self.sink),
            self.threshold,
            self.interval,
        )
        .with_gate(Arc::clone(&self.gate));

        let task = tokio::spawn(async move {
            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await; // discard first tick, which is instantaneous

            debug!(
                "Flush coordinator started, interval {} ms, threshold {}",
                self.interval.as_millis(),
                self.threshold
            );

            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {
                        self.tick().await;
                    }
                }
            }

            debug!("Flush coordinator stopped");
            self
        });

        CoordinatorHandle {
            cancel,
            task,
            fallback,
        }
    }

    fn report_evictions(&mut self) {
        let evicted = self.buffer.evicted();
        let dropped = evicted - self.last_evicted;
        if dropped > 0 {
            warn!(
                "Event buffer full ({} items), dropped {dropped} oldest events since last check",
                self.buffer.capacity()
            );
        }
        self.last_evicted = evicted;
    }
}

/// Handle to a running [`FlushCoordinator`] loop.
pub struct CoordinatorHandle<S> {
    cancel: CancellationToken,
    task: JoinHandle<FlushCoordinator<S>>,
    // Shares the buffer, sink and gate of the task, for when the task is lost.
    fallback: FlushCoordinator<S>,
}

impl<S> CoordinatorHandle<S>
where
    S: Sink<Event> + 'static,
{
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Asks the loop to stop after its current tick, without waiting for it.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Stops the loop, waiting for an in-flight flush to complete, and hands
    /// back a coordinator over the same buffer so a final flush can be run.
    ///
    /// If the task panicked, the returned coordinator is a fresh one sharing
    /// the task's buffer, sink and gate.
    pub async fn stop(self) -> FlushCoordinator<S> {
        self.cancel.cancel();
        match self.task.await {
            Ok(coordinator) => coordinator,
            Err(e) => {
                error!("Flush coordinator task failed: {e}");
                self.fallback
            }
        }
    }

    /// Stops the loop and flushes whatever is left, regardless of threshold.
    pub async fn shutdown(self) -> FlushOutcome {
        let mut coordinator = self.stop().await;
        debug!("Final flush of buffered events");
        coordinator.flush().await
    }
}
