//! BFS frontier with visited/queued de-duplication
//!
//! All shared crawl state (queue, visited set, queued set, in-flight count)
//! lives behind one mutex, so the dedup check and the claim that follows it
//! are a single step. Two `Notify`s wake workers when items arrive and wake
//! the orchestrator when the frontier runs dry.

use crate::state::{FrontierItem, ShutdownReason, ThresholdPolicy};
use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;

/// Outcome of claiming a pulled item for processing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// Item is now visited; process it
    Proceed,

    /// Node was already visited through another edge
    Duplicate,

    /// A threshold is breached; the item went back to the queue
    Breached(ShutdownReason),
}

#[derive(Debug, Default)]
struct FrontierState {
    queue: VecDeque<FrontierItem>,
    visited: HashSet<String>,
    queued: HashSet<String>,
    in_flight: usize,
}

impl FrontierState {
    fn is_exhausted(&self) -> bool {
        self.queue.is_empty() && self.in_flight == 0
    }
}

/// Shared frontier for one crawl run
#[derive(Debug, Default)]
pub struct Frontier {
    state: Mutex<FrontierState>,
    available: Notify,
    idle: Notify,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FrontierState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Enqueues the item unless its node is visited or already queued
    pub fn enqueue_if_new(&self, item: FrontierItem) -> bool {
        let mut state = self.lock();
        if state.visited.contains(&item.node_id) || state.queued.contains(&item.node_id) {
            return false;
        }

        state.queued.insert(item.node_id.clone());
        state.queue.push_back(item);
        drop(state);

        self.available.notify_one();
        true
    }

    /// True if the node is visited or queued
    pub fn is_known(&self, node_id: &str) -> bool {
        let state = self.lock();
        state.visited.contains(node_id) || state.queued.contains(node_id)
    }

    fn try_pop(&self) -> Option<FrontierItem> {
        let mut state = self.lock();
        let item = state.queue.pop_front()?;
        state.in_flight += 1;
        Some(item)
    }

    /// Waits up to `timeout` for an item
    ///
    /// A pulled item counts as in flight until [`Frontier::task_done`].
    pub async fn pull(&self, timeout: Duration) -> Option<FrontierItem> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(item) = self.try_pop() {
                return Some(item);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.try_pop();
            }
        }
    }

    /// Claims a pulled item, checking thresholds and the visited set
    /// under the same lock
    ///
    /// On [`Claim::Breached`] the item is put back at the head of the queue
    /// so it survives into the unprocessed snapshot.
    pub fn claim(
        &self,
        item: &FrontierItem,
        policy: &ThresholdPolicy,
        elapsed: Duration,
    ) -> Claim {
        let mut state = self.lock();

        if state.visited.contains(&item.node_id) {
            return Claim::Duplicate;
        }

        if let Some(reason) = policy.check(state.visited.len() as u64, elapsed) {
            state.queue.push_front(item.clone());
            return Claim::Breached(reason);
        }

        state.queued.remove(&item.node_id);
        state.visited.insert(item.node_id.clone());
        Claim::Proceed
    }

    /// Guard that marks a pulled item as finished when dropped, including
    /// during unwinding
    pub fn in_flight(&self) -> InFlight<'_> {
        InFlight { frontier: self }
    }

    /// Marks a pulled item as finished
    pub fn task_done(&self) {
        let mut state = self.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        let exhausted = state.is_exhausted();
        drop(state);

        if exhausted {
            self.idle.notify_waiters();
        }
    }

    /// True when nothing is queued and nothing is in flight
    pub fn is_exhausted(&self) -> bool {
        self.lock().is_exhausted()
    }

    /// Resolves once the frontier is exhausted
    pub async fn wait_exhausted(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_exhausted() {
                return;
            }
            notified.await;
        }
    }

    /// Removes and returns every queued item
    pub fn drain(&self) -> Vec<FrontierItem> {
        self.lock().queue.drain(..).collect()
    }

    /// Number of processed nodes
    pub fn visited_count(&self) -> usize {
        self.lock().visited.len()
    }

    pub fn is_visited(&self, node_id: &str) -> bool {
        self.lock().visited.contains(node_id)
    }
}

/// Pending [`Frontier::task_done`] for one pulled item
#[must_use = "dropping the guard marks the item finished immediately"]
pub struct InFlight<'a> {
    frontier: &'a Frontier,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.frontier.task_done();
    }
}
