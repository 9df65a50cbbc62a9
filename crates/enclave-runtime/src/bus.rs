//! In-process topic bus.
//!
//! Each subscriber owns an unbounded mpsc channel, so delivery is FIFO per
//! topic per subscriber and a slow subscriber never blocks a publisher.
//! Publishing to a topic nobody listens on drops the message.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

/// Identifies one subscription on a bus.
pub type SubscriptionId = u64;

struct Subscriber<M> {
    id: SubscriptionId,
    tx: mpsc::UnboundedSender<M>,
}

struct BusInner<M> {
    topics: HashMap<String, Vec<Subscriber<M>>>,
    next_id: SubscriptionId,
    stopped: bool,
}

/// Publish/subscribe bus keyed by topic name.
pub struct MessageBus<M> {
    inner: Mutex<BusInner<M>>,
}

/// Receiving end of a subscription.
#[derive(Debug)]
pub struct Subscription<M> {
    /// Subscription id, for [`MessageBus::unsubscribe`].
    pub id: SubscriptionId,
    /// Topic name.
    pub topic: String,
    rx: mpsc::UnboundedReceiver<M>,
}

impl<M> Subscription<M> {
    /// Next message, or `None` once unsubscribed and drained.
    pub async fn recv(&mut self) -> Option<M> {
        self.rx.recv().await
    }

    /// Next message if one is buffered.
    pub fn try_recv(&mut self) -> Option<M> {
        self.rx.try_recv().ok()
    }
}

impl<M: Clone + Send + 'static> MessageBus<M> {
    /// Empty bus.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BusInner {
                topics: HashMap::new(),
                next_id: 1,
                stopped: false,
            }),
        }
    }

    /// Subscribe to `topic`. Returns `None` once the bus is stopped.
    pub fn subscribe(&self, topic: &str) -> Option<Subscription<M>> {
        let mut inner = self.inner.lock();
        if inner.stopped {
            return None;
        }
        let id = inner.next_id;
        inner.next_id += 1;
        let (tx, rx) = mpsc::unbounded_channel();
        inner
            .topics
            .entry(topic.to_owned())
            .or_default()
            .push(Subscriber { id, tx });
        debug!(topic, subscription_id = id, "subscribed");
        Some(Subscription {
            id,
            topic: topic.to_owned(),
            rx,
        })
    }

    /// Remove a subscription. Its receiver drains, then ends.
    pub fn unsubscribe(&self, topic: &str, id: SubscriptionId) -> bool {
        let mut inner = self.inner.lock();
        let Some(subs) = inner.topics.get_mut(topic) else {
            return false;
        };
        let before = subs.len();
        subs.retain(|s| s.id != id);
        before != subs.len()
    }

    /// Deliver `message` to every subscriber of `topic`; returns how many
    /// received it. Closed subscribers are pruned.
    pub fn publish(&self, topic: &str, message: M) -> usize {
        let mut inner = self.inner.lock();
        if inner.stopped {
            debug!(topic, "publish on stopped bus dropped");
            return 0;
        }
        let Some(subs) = inner.topics.get_mut(topic) else {
            return 0;
        };
        subs.retain(|s| s.tx.send(message.clone()).is_ok());
        subs.len()
    }

    /// Number of live subscribers on `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner.lock().topics.get(topic).map_or(0, Vec::len)
    }

    /// Drop every subscription and refuse further traffic.
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        inner.stopped = true;
        inner.topics.clear();
    }

    /// Whether [`stop`](Self::stop) was called.
    pub fn is_stopped(&self) -> bool {
        self.inner.lock().stopped
    }
}

impl<M: Clone + Send + 'static> Default for MessageBus<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> std::fmt::Debug for MessageBus<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("MessageBus")
            .field("topics", &inner.topics.keys().collect::<Vec<_>>())
            .field("stopped", &inner.stopped)
            .finish()
    }
}
