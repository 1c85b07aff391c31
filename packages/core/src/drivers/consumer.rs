//! Subscription consumers
//!
//! A consumer is a bounded channel receiving every entity published under one of its
//! keys after the subscription was made. Dispatch never blocks the publisher: a full
//! consumer misses the message (logged), a dropped consumer is pruned.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};

static NEXT_CONSUMER_ID: AtomicU64 = AtomicU64::new(1);

/// Removes a consumer from the registry that issued it
pub(crate) trait Unsubscribe: Send + Sync {
    fn unsubscribe(&self, consumer_id: u64);
}

/// Receiving side of a subscription
pub struct EntityConsumer<T> {
    id: u64,
    keys: Vec<String>,
    receiver: mpsc::Receiver<T>,
    owner: Option<Weak<dyn Unsubscribe>>,
}

impl<T> EntityConsumer<T> {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Keys this consumer listens to; empty means every key
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub async fn recv(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    /// `None` when nothing is buffered (or the driver went away)
    pub fn try_recv(&mut self) -> Option<T> {
        match self.receiver.try_recv() {
            Ok(value) => Some(value),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Stop receiving; messages already buffered stay readable
    pub fn unsubscribe(&mut self) {
        if let Some(owner) = self.owner.take().and_then(|weak| weak.upgrade()) {
            owner.unsubscribe(self.id);
        }
        self.receiver.close();
    }
}

impl<T> Drop for EntityConsumer<T> {
    fn drop(&mut self) {
        if let Some(owner) = self.owner.take().and_then(|weak| weak.upgrade()) {
            owner.unsubscribe(self.id);
        }
    }
}

impl<T> std::fmt::Debug for EntityConsumer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityConsumer")
            .field("id", &self.id)
            .field("keys", &self.keys)
            .finish()
    }
}

struct Subscription<T> {
    keys: Vec<String>,
    sender: mpsc::Sender<T>,
}

/// Sending side, owned by a driver
pub struct ConsumerRegistry<T> {
    driver: String,
    capacity: usize,
    subscriptions: HashMap<u64, Subscription<T>>,
}

impl<T: Clone> ConsumerRegistry<T> {
    pub fn new(driver: impl Into<String>, capacity: usize) -> Self {
        Self {
            driver: driver.into(),
            capacity: capacity.max(1),
            subscriptions: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    pub(crate) fn subscribe(
        &mut self,
        keys: Vec<String>,
        owner: Option<Weak<dyn Unsubscribe>>,
    ) -> EntityConsumer<T> {
        let id = NEXT_CONSUMER_ID.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.capacity);
        self.subscriptions.insert(
            id,
            Subscription {
                keys: keys.clone(),
                sender,
            },
        );

        tracing::debug!("{}: consumer {} subscribed to {} key(s)", self.driver, id, keys.len());
        EntityConsumer {
            id,
            keys,
            receiver,
            owner,
        }
    }

    pub fn remove(&mut self, consumer_id: u64) -> bool {
        self.subscriptions.remove(&consumer_id).is_some()
    }

    /// Send `entity` to every consumer listening to one of `keys`
    pub fn dispatch(&mut self, keys: &[String], entity: &T) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();

        for (id, subscription) in &self.subscriptions {
            let interested = subscription.keys.is_empty()
                || subscription.keys.iter().any(|k| keys.contains(k));
            if !interested {
                continue;
            }

            match subscription.sender.try_send(entity.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!("{}: consumer {} is full, message dropped", self.driver, id);
                }
                Err(TrySendError::Closed(_)) => closed.push(*id),
            }
        }

        for id in closed {
            tracing::debug!("{}: pruning closed consumer {}", self.driver, id);
            self.subscriptions.remove(&id);
        }

        delivered
    }

    pub fn clear(&mut self) {
        self.subscriptions.clear();
    }
}

/// Shared handle so a consumer can deregister itself without holding the driver
pub(crate) type SharedRegistry<T> = Arc<std::sync::Mutex<ConsumerRegistry<T>>>;

impl<T: Clone + Send + 'static> Unsubscribe for std::sync::Mutex<ConsumerRegistry<T>> {
    fn unsubscribe(&self, consumer_id: u64) {
        if let Ok(mut registry) = self.lock() {
            registry.remove(consumer_id);
        }
    }
}
