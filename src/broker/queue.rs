//! Bounded ingest queue with a configurable overflow policy
//!
//! `push` is synchronous and never waits: when the queue is full the overflow
//! policy decides which record loses. `pop` is the single async consumer side.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;

/// What happens to a push that finds the queue full
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest pending record to make room
    #[default]
    DropOldest,
    /// Reject the incoming record
    DropNewest,
}

/// Result of a push
#[derive(Debug, PartialEq)]
pub enum PushOutcome<T> {
    Accepted,
    /// Accepted after evicting the returned record
    Displaced(T),
    /// Queue full under [`OverflowPolicy::DropNewest`]
    Rejected(T),
    /// Queue closed; nothing is accepted any more
    Closed(T),
}

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Multi-producer, single-consumer bounded queue
pub struct IngestQueue<T> {
    state: Mutex<QueueState<T>>,
    available: Notify,
    capacity: usize,
    policy: OverflowPolicy,
}

impl<T> IngestQueue<T> {
    /// Create a queue; a zero capacity is raised to one
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            available: Notify::new(),
            capacity,
            policy,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Enqueue without waiting
    pub fn push(&self, item: T) -> PushOutcome<T> {
        let outcome = {
            let mut state = self.lock();
            if state.closed {
                return PushOutcome::Closed(item);
            }

            if state.items.len() < self.capacity {
                state.items.push_back(item);
                PushOutcome::Accepted
            } else {
                match self.policy {
                    OverflowPolicy::DropNewest => return PushOutcome::Rejected(item),
                    OverflowPolicy::DropOldest => {
                        let evicted = state.items.pop_front();
                        state.items.push_back(item);
                        match evicted {
                            Some(evicted) => PushOutcome::Displaced(evicted),
                            None => PushOutcome::Accepted,
                        }
                    }
                }
            }
        };

        self.available.notify_one();
        outcome
    }

    /// Wait for the next record
    ///
    /// Returns `None` once the queue is closed and empty. Pending records are
    /// still handed out after `close`.
    pub async fn pop(&self) -> Option<T> {
        loop {
            {
                let mut state = self.lock();
                if let Some(item) = state.items.pop_front() {
                    return Some(item);
                }
                if state.closed {
                    return None;
                }
            }
            self.available.notified().await;
        }
    }

    /// Stop accepting records and wake the consumer
    pub fn close(&self) {
        self.lock().closed = true;
        self.available.notify_one();
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        // Critical sections never panic, so a poisoned lock still holds consistent state
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
