//! Per-node event bus.
//!
//! Subscribers receive every event published on their topic after they
//! subscribe. Closing the bus ends all subscriptions and rejects new ones.

use crate::error::{NodeError, NodeResult};
use meshtest_types::{EventTopic, NodeEvent};
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::mpsc;

#[derive(Debug, Default)]
struct BusInner {
    closed: bool,
    subscribers: HashMap<EventTopic, Vec<mpsc::UnboundedSender<NodeEvent>>>,
}

/// A publish/subscribe bus for [`NodeEvent`]s.
#[derive(Debug, Default)]
pub struct EventBus {
    inner: Mutex<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a subscription to `topic`.
    pub fn subscribe(&self, topic: EventTopic) -> NodeResult<Subscription> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(NodeError::EventBusClosed);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        inner.subscribers.entry(topic).or_default().push(tx);
        Ok(Subscription { topic, rx })
    }

    /// Publishes an event to every live subscriber of its topic.
    pub fn publish(&self, event: NodeEvent) {
        let mut inner = self.inner.lock();
        if inner.closed {
            return;
        }
        if let Some(subs) = inner.subscribers.get_mut(&event.topic()) {
            subs.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }

    /// Closes the bus. Pending events stay readable; then receivers end.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        inner.subscribers.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

/// A subscription to one event topic.
#[derive(Debug)]
pub struct Subscription {
    topic: EventTopic,
    rx: mpsc::UnboundedReceiver<NodeEvent>,
}

impl Subscription {
    pub fn topic(&self) -> EventTopic {
        self.topic
    }

    /// Receives the next event, or `None` once the bus is closed and drained.
    ///
    /// Cancel-safe: dropping the future never loses an event.
    pub async fn recv(&mut self) -> Option<NodeEvent> {
        self.rx.recv().await
    }

    /// Returns an already queued event without waiting.
    pub fn try_recv(&mut self) -> Option<NodeEvent> {
        self.rx.try_recv().ok()
    }
}
