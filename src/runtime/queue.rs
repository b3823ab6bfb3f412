// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Coalescing work queue with per-key in-flight exclusion and bounded
//! exponential retry backoff.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::sleep;

use crate::constants::queue as defaults;

#[derive(Default)]
struct QueueState {
    /// Keys ready for processing, in arrival order
    ready: VecDeque<String>,
    /// Keys currently in `ready`
    pending: HashSet<String>,
    /// Keys currently being processed by a worker
    active: HashSet<String>,
    /// Keys re-enqueued while active; moved to ready on done
    dirty: HashSet<String>,
    /// Consecutive failure count per key
    retries: HashMap<String, u32>,
    shutting_down: bool,
}

/// Work queue of `namespace/name` keys.
///
/// Multiple adds of the same key before it is processed collapse to one
/// pending item, and a key is never handed to two workers at once: an add
/// while the key is in flight marks it dirty, and it returns to the ready
/// list when the in-flight pass finishes.
pub struct WorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    base_delay: Duration,
    max_delay: Duration,
    max_retries: u32,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::with_policy(defaults::BASE_DELAY, defaults::MAX_DELAY, defaults::MAX_RETRIES)
    }

    pub fn with_policy(base_delay: Duration, max_delay: Duration, max_retries: u32) -> Self {
        WorkQueue {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            base_delay,
            max_delay,
            max_retries,
        }
    }

    /// Enqueue a key. Idempotent while the key is already pending.
    pub async fn add(&self, key: &str) {
        let mut state = self.state.lock().await;
        if state.shutting_down {
            return;
        }
        if state.active.contains(key) {
            state.dirty.insert(key.to_string());
            return;
        }
        if state.pending.insert(key.to_string()) {
            state.ready.push_back(key.to_string());
            self.notify.notify_one();
        }
    }

    /// Enqueue a key after a delay
    pub fn add_delayed(queue: &Arc<WorkQueue>, key: String, delay: Duration) {
        let queue = Arc::clone(queue);
        tokio::spawn(async move {
            sleep(delay).await;
            queue.add(&key).await;
        });
    }

    /// Wait for the next key. Returns None once the queue is shutting down.
    pub async fn next(&self) -> Option<String> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock().await;
                if state.shutting_down {
                    return None;
                }
                if let Some(key) = state.ready.pop_front() {
                    state.pending.remove(&key);
                    state.active.insert(key.clone());
                    return Some(key);
                }
            }
            notified.await;
        }
    }

    /// Mark an in-flight key as finished, re-enqueueing it if it went dirty
    pub async fn done(&self, key: &str) {
        let mut state = self.state.lock().await;
        state.active.remove(key);
        if state.dirty.remove(key) && !state.shutting_down && state.pending.insert(key.to_string())
        {
            state.ready.push_back(key.to_string());
            self.notify.notify_one();
        }
    }

    /// Clear the retry count after a successful sync
    pub async fn forget(&self, key: &str) {
        let mut state = self.state.lock().await;
        state.retries.remove(key);
    }

    /// Schedule a retry with exponential backoff. Returns the chosen delay,
    /// or None when the retry ceiling is reached and the key is dropped
    /// until the next watch event or resync.
    pub async fn retry(queue: &Arc<WorkQueue>, key: &str) -> Option<Duration> {
        let attempt = {
            let mut state = queue.state.lock().await;
            let count = state.retries.entry(key.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        if attempt > queue.max_retries {
            queue.forget(key).await;
            return None;
        }
        // base * 2^(attempt-1), capped
        let exponent = (attempt - 1).min(16);
        let delay = queue
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(queue.max_delay);
        WorkQueue::add_delayed(queue, key.to_string(), delay);
        Some(delay)
    }

    /// Stop handing out keys. In-flight items finish; nothing new is accepted.
    pub async fn shut_down(&self) {
        let mut state = self.state.lock().await;
        state.shutting_down = true;
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.state.lock().await.ready.len()
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_queue() -> Arc<WorkQueue> {
        Arc::new(WorkQueue::with_policy(
            Duration::from_millis(1),
            Duration::from_millis(8),
            3,
        ))
    }

    #[tokio::test]
    async fn test_add_coalesces_pending_keys() {
        let queue = make_queue();
        queue.add("team-a/web").await;
        queue.add("team-a/web").await;
        queue.add("team-a/web").await;
        assert_eq!(queue.len().await, 1);
        assert_eq!(queue.next().await.unwrap(), "team-a/web");
        assert_eq!(queue.len().await, 0);
    }

    #[tokio::test]
    async fn test_fifo_across_distinct_keys() {
        let queue = make_queue();
        queue.add("team-a/web").await;
        queue.add("team-a/api").await;
        assert_eq!(queue.next().await.unwrap(), "team-a/web");
        assert_eq!(queue.next().await.unwrap(), "team-a/api");
    }

    #[tokio::test]
    async fn test_add_while_active_requeues_on_done() {
        let queue = make_queue();
        queue.add("team-a/web").await;
        let key = queue.next().await.unwrap();
        // A watch event lands while the key is being processed
        queue.add("team-a/web").await;
        assert_eq!(queue.len().await, 0);
        queue.done(&key).await;
        assert_eq!(queue.len().await, 1);
        assert_eq!(queue.next().await.unwrap(), "team-a/web");
    }

    #[tokio::test]
    async fn test_done_without_dirty_does_not_requeue() {
        let queue = make_queue();
        queue.add("team-a/web").await;
        let key = queue.next().await.unwrap();
        queue.done(&key).await;
        assert_eq!(queue.len().await, 0);
    }

    #[tokio::test]
    async fn test_retry_backs_off_and_redelivers() {
        let queue = make_queue();
        queue.add("team-a/web").await;
        let key = queue.next().await.unwrap();
        let delay = WorkQueue::retry(&queue, &key).await.unwrap();
        assert_eq!(delay, Duration::from_millis(1));
        queue.done(&key).await;
        // The delayed add lands after the backoff elapses
        let key = queue.next().await.unwrap();
        assert_eq!(key, "team-a/web");
    }

    #[tokio::test]
    async fn test_retry_delay_doubles_up_to_cap() {
        let queue = Arc::new(WorkQueue::with_policy(
            Duration::from_millis(1),
            Duration::from_millis(3),
            10,
        ));
        assert_eq!(WorkQueue::retry(&queue, "k").await.unwrap(), Duration::from_millis(1));
        assert_eq!(WorkQueue::retry(&queue, "k").await.unwrap(), Duration::from_millis(2));
        assert_eq!(WorkQueue::retry(&queue, "k").await.unwrap(), Duration::from_millis(3));
        assert_eq!(WorkQueue::retry(&queue, "k").await.unwrap(), Duration::from_millis(3));
    }

    #[tokio::test]
    async fn test_retry_ceiling_drops_item_and_resets_count() {
        let queue = make_queue();
        assert!(WorkQueue::retry(&queue, "k").await.is_some());
        assert!(WorkQueue::retry(&queue, "k").await.is_some());
        assert!(WorkQueue::retry(&queue, "k").await.is_some());
        assert!(WorkQueue::retry(&queue, "k").await.is_none());
        // Count was cleared, so the next failure backs off from the start
        assert_eq!(WorkQueue::retry(&queue, "k").await.unwrap(), Duration::from_millis(1));
    }

    #[tokio::test]
    async fn test_forget_resets_backoff() {
        let queue = make_queue();
        WorkQueue::retry(&queue, "k").await;
        WorkQueue::retry(&queue, "k").await;
        queue.forget("k").await;
        assert_eq!(WorkQueue::retry(&queue, "k").await.unwrap(), Duration::from_millis(1));
    }

    #[tokio::test]
    async fn test_shutdown_stops_dequeues() {
        let queue = make_queue();
        queue.add("team-a/web").await;
        queue.shut_down().await;
        assert!(queue.next().await.is_none());
        queue.add("team-a/api").await;
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn test_next_wakes_on_add() {
        let queue = make_queue();
        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.next().await })
        };
        tokio::task::yield_now().await;
        queue.add("team-a/web").await;
        assert_eq!(waiter.await.unwrap().unwrap(), "team-a/web");
    }
}
