//! URL frontier: the shared work queue that drives the crawl workers.
//!
//! One mutex guards the pending queue together with the two dedupe sets, so
//! a URL can never appear twice across the queue and the processed set. A
//! [`Notify`] pairs with a stop flag to give workers a blocking dequeue and
//! a clean termination path: after [`Frontier::stop`] the queue drains and
//! every further dequeue returns `None`.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;
use url::Url;

/// A unit of crawl work: an absolute URL and its distance from the seed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierItem {
    /// Normalized absolute URL.
    pub url: String,
    /// Link distance from the seed; the seed itself is 0.
    pub depth: u32,
}

#[derive(Default)]
struct FrontierState {
    pending: VecDeque<FrontierItem>,
    queued: HashSet<String>,
    processed: HashSet<String>,
}

/// Thread-safe FIFO frontier with enqueue-time and completion-time dedupe.
#[derive(Default)]
pub struct Frontier {
    state: Mutex<FrontierState>,
    notify: Notify,
    stopped: AtomicBool,
}

impl Frontier {
    /// Constructs a new, empty frontier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical identity form of a URL for dedupe purposes.
    ///
    /// Scheme and host are lowercased (paths keep their case) and a single
    /// trailing slash is trimmed. Unparsable strings fall back to plain
    /// lowercasing so dedupe still behaves deterministically.
    pub fn normalize_url(url: &str) -> String {
        let mut normalized = match Url::parse(url.trim()) {
            Ok(parsed) => parsed.to_string(),
            Err(_) => url.trim().to_lowercase(),
        };
        if normalized.len() > 1 && normalized.ends_with('/') {
            normalized.pop();
        }
        normalized
    }

    /// Enqueues a URL at `depth` unless it is already pending or processed.
    ///
    /// Returns whether the item was inserted. On insertion exactly one
    /// waiting worker is woken.
    pub fn enqueue(&self, url: &str, depth: u32) -> bool {
        let normalized = Self::normalize_url(url);
        {
            let mut state = self.state.lock().expect("frontier mutex poisoned");
            if state.queued.contains(&normalized) || state.processed.contains(&normalized) {
                return false;
            }
            state.queued.insert(normalized.clone());
            state.pending.push_back(FrontierItem {
                url: normalized,
                depth,
            });
        }
        self.notify.notify_one();
        true
    }

    /// Takes the next item, waiting until one is available or the frontier
    /// has been stopped and drained (then `None`).
    ///
    /// The returned URL is no longer tracked as queued; the caller must
    /// finish by calling [`Frontier::mark_processed`].
    pub async fn dequeue(&self) -> Option<FrontierItem> {
        loop {
            {
                let mut state = self.state.lock().expect("frontier mutex poisoned");
                if let Some(item) = state.pending.pop_front() {
                    state.queued.remove(&item.url);
                    return Some(item);
                }
            }
            if self.stopped.load(Ordering::Acquire) {
                // Pass the wake-up along so every blocked worker unwinds.
                self.notify.notify_one();
                return None;
            }
            self.notify.notified().await;
        }
    }

    /// Records that the crawl is done with `url`, successfully or not.
    pub fn mark_processed(&self, url: &str) {
        let normalized = Self::normalize_url(url);
        let mut state = self.state.lock().expect("frontier mutex poisoned");
        state.processed.insert(normalized);
    }

    /// Whether `url` has already been fully handled this run.
    pub fn is_processed(&self, url: &str) -> bool {
        let normalized = Self::normalize_url(url);
        let state = self.state.lock().expect("frontier mutex poisoned");
        state.processed.contains(&normalized)
    }

    /// Requests shutdown and wakes every waiter.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.notify.notify_waiters();
        // A stored permit catches workers that were between their queue
        // check and their wait registration.
        self.notify.notify_one();
    }

    /// Whether [`Frontier::stop`] has been called.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Number of items waiting to be dequeued.
    pub fn pending_count(&self) -> usize {
        let state = self.state.lock().expect("frontier mutex poisoned");
        state.pending.len()
    }

    /// Number of URLs marked processed so far.
    pub fn processed_count(&self) -> usize {
        let state = self.state.lock().expect("frontier mutex poisoned");
        state.processed.len()
    }

    /// Whether the pending queue is empty.
    pub fn is_empty(&self) -> bool {
        self.pending_count() == 0
    }
}
