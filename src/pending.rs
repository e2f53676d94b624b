//! In-flight request bookkeeping.
//!
//! The table is insertion-ordered so the timeout sweep can walk oldest-first
//! and stop at the first entry still young enough. It is a queue+index
//! combination: an id→waiter map for O(1) completion plus a queue of ids in
//! insertion order. Completion removes from the map only; the queue is
//! reconciled lazily during sweeps.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::Result;
use crate::schema::BoxedValue;

/// Completion payload delivered to a waiter: a decoded response value, or
/// `None` for void responses.
pub(crate) type Completion = Result<Option<BoxedValue>>;

/// The pending half of an in-flight request.
pub(crate) struct Waiter {
    /// Method the request was sent for; selects the response constructor.
    pub(crate) method: u16,
    /// One-shot completion channel back to the caller.
    pub(crate) tx: oneshot::Sender<Completion>,
    /// When the request was enqueued (monotonic).
    pub(crate) enqueued_at: Instant,
}

/// Insertion-ordered table of in-flight requests, keyed by correlation id.
#[derive(Default)]
pub(crate) struct PendingTable {
    waiters: HashMap<u32, Waiter>,
    order: VecDeque<u32>,
}

impl PendingTable {
    pub(crate) fn new() -> Self {
        Self {
            waiters: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Record a waiter. Correlation ids are unique among pending entries.
    pub(crate) fn insert(&mut self, id: u32, waiter: Waiter) {
        self.order.push_back(id);
        self.waiters.insert(id, waiter);
    }

    /// Remove a waiter by correlation id.
    pub(crate) fn remove(&mut self, id: u32) -> Option<Waiter> {
        self.waiters.remove(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.waiters.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }

    /// Pop every waiter older than `timeout`, walking insertion order.
    ///
    /// The timeout is constant and entries arrive in monotonic-time order,
    /// so the walk stops at the first entry still young enough; the cost
    /// per sweep is proportional to the number of expired entries, not the
    /// table size. Ids whose waiter already completed are discarded on the
    /// way.
    pub(crate) fn sweep_expired(&mut self, timeout: Duration, now: Instant) -> Vec<(u32, Waiter)> {
        let mut expired = Vec::new();
        while let Some(&id) = self.order.front() {
            let is_expired = match self.waiters.get(&id) {
                // completed earlier; the queue entry is stale
                None => {
                    self.order.pop_front();
                    continue;
                }
                Some(waiter) => now.duration_since(waiter.enqueued_at) >= timeout,
            };
            if !is_expired {
                break;
            }
            self.order.pop_front();
            if let Some(waiter) = self.waiters.remove(&id) {
                expired.push((id, waiter));
            }
        }
        expired
    }

    /// Remove everything, in insertion order.
    pub(crate) fn drain(&mut self) -> Vec<(u32, Waiter)> {
        let mut drained = Vec::with_capacity(self.waiters.len());
        for id in self.order.drain(..) {
            if let Some(waiter) = self.waiters.remove(&id) {
                drained.push((id, waiter));
            }
        }
        drained
    }
}
