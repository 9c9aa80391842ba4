//! Server-sent event fan-out for streaming subscriptions.
//!
//! Every subscriber owns a bounded queue. When a queue is full the oldest
//! pending event is dropped, so a slow client never stalls the publisher.
//! Events can also be parked in numbered replay slots, which each new
//! subscriber receives before any live event.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Notify;

/// Highest replay slot index accepted, plus one.
pub const MAX_REPLAY_SLOTS: usize = 4096;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SseEvent {
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl SseEvent {
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            event: None,
            id: None,
        }
    }

    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Body of `POST /_specmock/sse-expectations`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SseExpectation {
    #[serde(flatten)]
    pub event: SseEvent,
    /// `None` broadcasts live; `Some(i)` stores the event in replay slot `i`.
    #[serde(default)]
    pub buffer_index: Option<usize>,
}

#[derive(Debug)]
struct SubscriberQueue {
    events: Mutex<VecDeque<SseEvent>>,
    notify: Notify,
    closed: AtomicBool,
    dropped: AtomicU64,
    capacity: usize,
}

impl SubscriberQueue {
    fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
            capacity,
        }
    }

    fn push(&self, event: SseEvent) {
        {
            let mut events = self.events.lock();
            while events.len() >= self.capacity {
                events.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            events.push_back(event);
        }
        self.notify.notify_one();
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }
}

#[derive(Debug)]
pub struct SseBroadcaster {
    replay: Mutex<Vec<Option<SseEvent>>>,
    subscribers: Mutex<HashMap<u64, Arc<SubscriberQueue>>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl SseBroadcaster {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            replay: Mutex::new(Vec::new()),
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            capacity: capacity.max(1),
        })
    }

    /// Deliver live, or park in a replay slot when an index is given.
    /// Returns the number of subscribers reached by a live event. Slots at
    /// or beyond [`MAX_REPLAY_SLOTS`] are ignored.
    pub fn publish(&self, expectation: SseExpectation) -> usize {
        match expectation.buffer_index {
            Some(index) if index >= MAX_REPLAY_SLOTS => 0,
            Some(index) => {
                let mut replay = self.replay.lock();
                if replay.len() <= index {
                    replay.resize(index + 1, None);
                }
                replay[index] = Some(expectation.event);
                0
            }
            None => {
                let subscribers = self.subscribers.lock();
                for queue in subscribers.values() {
                    queue.push(expectation.event.clone());
                }
                subscribers.len()
            }
        }
    }

    /// Subscribe, receiving the replay slots from index `from` onward and
    /// then every live event.
    pub fn subscribe(self: &Arc<Self>, from: usize) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let queue = Arc::new(SubscriberQueue::new(self.capacity));

        // Registering under the subscriber lock keeps replay ahead of any
        // live event published concurrently.
        let mut subscribers = self.subscribers.lock();
        {
            let replay = self.replay.lock();
            let mut events = queue.events.lock();
            events.extend(replay.iter().skip(from).flatten().cloned());
        }
        subscribers.insert(id, Arc::clone(&queue));

        Subscription {
            id,
            queue,
            broadcaster: Arc::downgrade(self),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    pub fn replay_len(&self) -> usize {
        self.replay.lock().iter().flatten().count()
    }

    /// End every open stream.
    pub fn close_all(&self) {
        for queue in self.subscribers.lock().drain().map(|(_, q)| q) {
            queue.close();
        }
    }

    fn unsubscribe(&self, id: u64) {
        self.subscribers.lock().remove(&id);
    }
}

/// One subscriber's end of the broadcast. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    queue: Arc<SubscriberQueue>,
    broadcaster: Weak<SseBroadcaster>,
}

impl Subscription {
    /// Next event, or `None` once the broadcaster has closed the stream.
    pub async fn recv(&mut self) -> Option<SseEvent> {
        loop {
            let next = self.queue.events.lock().pop_front();
            if let Some(event) = next {
                return Some(event);
            }
            if self.queue.closed.load(Ordering::Acquire) {
                return None;
            }
            self.queue.notify.notified().await;
        }
    }

    /// Events lost to overflow so far.
    pub fn dropped(&self) -> u64 {
        self.queue.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(broadcaster) = self.broadcaster.upgrade() {
            broadcaster.unsubscribe(self.id);
        }
    }
}
