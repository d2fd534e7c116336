// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded, thread-safe ring buffer with a snapshot/commit flush protocol.
//!
//! Producers push records from any thread. A single flusher takes a FIFO
//! snapshot of the live range, hands it to a consumer outside of any lock, and
//! only deletes that range once the consumer reports success.
//!
//! # Cursors
//!
//! Records are addressed through two logical cursors, `low` and `high`, that
//! only ever move forward. The live range is `(low, high]`, so
//! `count = high - low`, and logical index `i` lives in slot `i % capacity`.
//!
//! ```text
//!   low = 2          high = 6            capacity = 5
//!     │                 │
//!     v                 v
//!   ... 3   4   5   6        logical indices in the live range
//!       │   │   │   │
//!   [ 5 | 6 | _ | 3 | 4 ]    physical slots
//! ```
//!
//! # Overflow
//!
//! Pushing into a full buffer advances both cursors and overwrites the oldest
//! record (drop-oldest). The number of records lost this way is exposed by
//! [`RingBuffer::evicted`].
//!
//! # Flush protocol
//!
//! 1. Snapshot `(low, high]` under the lock.
//! 2. Call the consumer with the snapshot, lock released.
//! 3. On success, move `low` and `high` to at least the snapshot's `high`.
//!    Using `max` keeps concurrent evictions from being rolled back.
//! 4. On failure nothing moves; the next flush sees the same records again
//!    (at-least-once delivery).
//!
//! Flushes must be serialized by the caller: two concurrent flushers race on
//! the commit step.

use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::trace;

use crate::publisher::Sink;

#[derive(Debug)]
struct State<T> {
    slots: Vec<Option<T>>,
    low: i64,
    high: i64,
    evicted: u64,
}

impl<T> State<T> {
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    fn count(&self) -> usize {
        (self.high - self.low) as usize
    }

    #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    fn position(&self, cursor: i64) -> usize {
        cursor.rem_euclid(self.slots.len() as i64) as usize
    }
}

/// FIFO view of the buffer taken at one instant, together with the `high`
/// cursor it was taken at.
struct Snapshot<T> {
    items: Vec<T>,
    mark: i64,
}

/// Fixed-capacity circular store shared between producers and one flusher.
///
/// # Example
///
/// ```rust
/// use samsara_sdk::ring_buffer::RingBuffer;
///
/// let buffer = RingBuffer::new(3);
/// for i in 0..5 {
///     buffer.push(i);
/// }
///
/// assert_eq!(buffer.count(), 3);
/// assert_eq!(buffer.drain(), vec![2, 3, 4]);
/// assert!(buffer.is_empty());
/// ```
#[derive(Debug)]
pub struct RingBuffer<T> {
    capacity: usize,
    state: Mutex<State<T>>,
}

impl<T: Clone> RingBuffer<T> {
    /// Creates an empty buffer holding at most `capacity` records.
    ///
    /// A capacity of zero is legal: every push is discarded.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        RingBuffer {
            capacity,
            state: Mutex::new(State {
                slots,
                low: -1,
                high: -1,
                evicted: 0,
            }),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of live records, read together with both cursors so it always
    /// lies in `[0, capacity]`.
    #[must_use]
    pub fn count(&self) -> usize {
        self.lock().count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.count() == self.capacity
    }

    /// Total number of records overwritten by drop-oldest eviction.
    #[must_use]
    pub fn evicted(&self) -> u64 {
        self.lock().evicted
    }

    /// Inserts `item` as the newest record, evicting the oldest one when full.
    ///
    /// Never blocks on a flush in progress and never fails.
    pub fn push(&self, item: T) {
        if self.capacity == 0 {
            return;
        }

        let mut state = self.lock();
        state.high += 1;
        if state.count() > self.capacity {
            state.low += 1;
            state.evicted += 1;
            trace!("Ring buffer full ({} items), evicted oldest record", self.capacity);
        }
        let position = state.position(state.high);
        state.slots[position] = Some(item);
    }

    /// Removes and returns every live record, oldest first.
    pub fn drain(&self) -> Vec<T> {
        self.flush_with(|_| true)
    }

    /// Runs the flush protocol with a synchronous consumer.
    ///
    /// Returns the snapshot handed to `consumer`, whether or not it was
    /// accepted. The consumer is not called for an empty snapshot.
    pub fn flush_with<F>(&self, consumer: F) -> Vec<T>
    where
        F: FnOnce(&[T]) -> bool,
    {
        let snapshot = self.take_snapshot();
        if snapshot.items.is_empty() {
            return snapshot.items;
        }

        if consumer(&snapshot.items) {
            self.commit(snapshot.mark);
        }
        snapshot.items
    }

    /// Runs the flush protocol against an asynchronous [`Sink`].
    ///
    /// The lock is only held while taking the snapshot and while committing,
    /// never across the call to [`Sink::post`].
    pub async fn flush<S>(&self, sink: &S) -> Vec<T>
    where
        S: Sink<T> + ?Sized,
        T: Sync,
    {
        self.flush_and_report(sink).await.0
    }

    /// Same as [`RingBuffer::flush`], also reporting whether the snapshot was
    /// committed.
    pub(crate) async fn flush_and_report<S>(&self, sink: &S) -> (Vec<T>, bool)
    where
        S: Sink<T> + ?Sized,
        T: Sync,
    {
        let snapshot = self.take_snapshot();
        if snapshot.items.is_empty() {
            return (snapshot.items, true);
        }

        let accepted = sink.post(&snapshot.items).await;
        if accepted {
            self.commit(snapshot.mark);
        }
        (snapshot.items, accepted)
    }

    fn take_snapshot(&self) -> Snapshot<T> {
        let state = self.lock();
        let items = ((state.low + 1)..=state.high)
            .filter_map(|cursor| state.slots[state.position(cursor)].clone())
            .collect();
        Snapshot {
            items,
            mark: state.high,
        }
    }

    /// Deletes everything up to and including `mark`.
    ///
    /// Slots between the current `low` and the new one are no longer reachable
    /// from the live range, so their records are released.
    fn commit(&self, mark: i64) {
        let mut state = self.lock();
        let new_low = state.low.max(mark);
        for cursor in (state.low + 1)..=new_low {
            let position = state.position(cursor);
            state.slots[position] = None;
        }
        state.low = new_low;
        state.high = state.high.max(mark);
    }

    // Every critical section leaves the cursors consistent, so a poisoned
    // lock still guards valid state.
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_new_buffer_is_empty() {
        let buffer: RingBuffer<u32> = RingBuffer::new(4);
        assert_eq!(buffer.capacity(), 4);
        assert_eq!(buffer.count(), 0);
        assert!(buffer.is_empty());
        assert!(!buffer.is_full());
    }

    #[test]
    fn test_count_tracks_pushes_until_full() {
        let buffer = RingBuffer::new(4);
        for n in 1..=4 {
            buffer.push(n);
            assert_eq!(buffer.count(), n);
        }
        assert!(buffer.is_full());

        buffer.push(5);
        assert_eq!(buffer.count(), 4);
        assert_eq!(buffer.evicted(), 1);
    }

    #[test]
    fn test_overflow_keeps_latest_records() {
        let buffer = RingBuffer::new(5);
        for i in 0..6 {
            buffer.push(format!("e{i}"));
        }

        assert_eq!(buffer.drain(), vec!["e1", "e2", "e3", "e4", "e5"]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_flush_empty_buffer() {
        let buffer: RingBuffer<u32> = RingBuffer::new(3);
        let mut called = false;
        let flushed = buffer.flush_with(|_| {
            called = true;
            true
        });

        assert!(flushed.is_empty());
        assert!(!called);
    }

    #[test]
    fn test_zero_capacity_discards_everything() {
        let buffer = RingBuffer::new(0);
        for i in 0..10 {
            buffer.push(i);
        }

        assert_eq!(buffer.count(), 0);
        assert!(buffer.is_empty());
        assert!(buffer.is_full());
        assert_eq!(buffer.evicted(), 0);
        for _ in 0..3 {
            assert!(buffer.drain().is_empty());
        }
    }

    #[test]
    fn test_failed_flush_retains_records() {
        let buffer = RingBuffer::new(4);
        buffer.push('a');
        buffer.push('b');

        let flushed = buffer.flush_with(|_| false);
        assert_eq!(flushed, vec!['a', 'b']);
        assert_eq!(buffer.count(), 2);

        buffer.push('c');
        assert_eq!(buffer.flush_with(|_| true), vec!['a', 'b', 'c']);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_push_during_failed_flush_keeps_fifo_position() {
        let buffer = RingBuffer::new(4);
        for item in ['a', 'b', 'c', 'd'] {
            buffer.push(item);
        }

        let flushed = buffer.flush_with(|batch| {
            assert_eq!(batch, ['a', 'b', 'c', 'd']);
            buffer.push('f');
            false
        });
        assert_eq!(flushed, vec!['a', 'b', 'c', 'd']);

        assert_eq!(buffer.drain(), vec!['b', 'c', 'd', 'f']);
    }

    #[test]
    fn test_push_during_successful_flush_survives_commit() {
        let buffer = RingBuffer::new(4);
        buffer.push(1);
        buffer.push(2);

        let flushed = buffer.flush_with(|_| {
            buffer.push(3);
            true
        });
        assert_eq!(flushed, vec![1, 2]);
        assert_eq!(buffer.drain(), vec![3]);
    }

    #[test]
    fn test_commit_never_moves_cursors_backward() {
        let buffer = RingBuffer::new(3);
        for i in 0..3 {
            buffer.push(i);
        }

        // A full burst during the consumer call evicts the whole snapshot.
        let flushed = buffer.flush_with(|_| {
            for i in 3..7 {
                buffer.push(i);
            }
            true
        });
        assert_eq!(flushed, vec![0, 1, 2]);
        assert_eq!(buffer.count(), 3);
        assert_eq!(buffer.drain(), vec![4, 5, 6]);
    }

    #[test]
    fn test_commit_releases_delivered_records() {
        let record = Arc::new(42);
        let buffer = RingBuffer::new(2);
        buffer.push(Arc::clone(&record));
        assert_eq!(Arc::strong_count(&record), 2);

        let flushed = buffer.drain();
        drop(flushed);
        assert_eq!(Arc::strong_count(&record), 1);
    }

    #[test]
    fn test_mutating_snapshot_does_not_affect_buffer() {
        let buffer = RingBuffer::new(2);
        buffer.push(vec![1]);

        let mut snapshot = buffer.flush_with(|_| false);
        snapshot[0].push(2);

        assert_eq!(buffer.drain(), vec![vec![1]]);
    }

    #[test]
    fn test_concurrent_pushes_are_all_counted() {
        let buffer = Arc::new(RingBuffer::new(10_000));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let buffer = Arc::clone(&buffer);
                thread::spawn(move || {
                    for i in 0..1000 {
                        buffer.push((t, i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let flushed = buffer.drain();
        assert_eq!(flushed.len(), 8000);
        // Per-producer order is preserved by the linearization.
        for t in 0..8 {
            let own: Vec<_> = flushed.iter().filter(|(p, _)| *p == t).map(|(_, i)| *i).collect();
            assert_eq!(own, (0..1000).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_concurrent_push_and_flush_never_duplicates() {
        let buffer = Arc::new(RingBuffer::new(100_000));

        let producer = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || {
                for i in 0..10_000u32 {
                    buffer.push(i);
                }
            })
        };

        let flusher = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || {
                let mut delivered = Vec::new();
                let mut attempt = 0u32;
                for _ in 0..200 {
                    attempt += 1;
                    // Every third attempt fails and must be retried later.
                    let accept = attempt % 3 != 0;
                    let flushed = buffer.flush_with(|_| accept);
                    if accept {
                        delivered.extend(flushed);
                    }
                    thread::yield_now();
                }
                delivered
            })
        };

        producer.join().unwrap();
        let mut delivered = flusher.join().unwrap();
        delivered.extend(buffer.drain());

        assert_eq!(delivered, (0..10_000).collect::<Vec<_>>());
    }

    mod properties {
        use super::super::RingBuffer;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn count_never_exceeds_capacity(capacity in 1usize..64, pushes in 0usize..256) {
                let buffer = RingBuffer::new(capacity);
                for i in 0..pushes {
                    buffer.push(i);
                    prop_assert!(buffer.count() <= capacity);
                }
                prop_assert_eq!(buffer.count(), pushes.min(capacity));
            }

            #[test]
            fn drain_yields_last_capacity_pushes(capacity in 1usize..64, pushes in 0usize..256) {
                let buffer = RingBuffer::new(capacity);
                for i in 0..pushes {
                    buffer.push(i);
                }
                let expected: Vec<usize> = (pushes.saturating_sub(capacity)..pushes).collect();
                prop_assert_eq!(buffer.drain(), expected);
                prop_assert_eq!(buffer.evicted(), pushes.saturating_sub(capacity) as u64);
            }

            #[test]
            fn failed_flush_then_success_loses_nothing_but_evictions(
                capacity in 1usize..32,
                // An empty snapshot never reaches the consumer.
                before in 1usize..64,
                during in 0usize..64,
            ) {
                let buffer = RingBuffer::new(capacity);
                for i in 0..before {
                    buffer.push(i);
                }
                let first = buffer.flush_with(|_| {
                    for i in before..before + during {
                        buffer.push(i);
                    }
                    false
                });
                prop_assert_eq!(first.len(), before.min(capacity));

                let total = before + during;
                let expected: Vec<usize> = (total.saturating_sub(capacity)..total).collect();
                prop_assert_eq!(buffer.drain(), expected);
            }
        }
    }
}
