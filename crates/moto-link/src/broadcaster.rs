//! Bounded fan-out of received frames and messages
//!
//! Each subscriber owns a bounded queue. Broadcasting performs a
//! non-blocking offer per subscriber and drops the item on a full queue,
//! so a slow consumer can never stall the serial reader.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::warn;

/// Queue capacity handed to each subscriber.
pub const SUBSCRIBER_CAPACITY: usize = 128;

struct Registry<T> {
    label: &'static str,
    next_id: AtomicU64,
    subscribers: RwLock<HashMap<u64, mpsc::Sender<T>>>,
}

/// Thread-safe fan-out of values to any number of subscribers.
pub struct Broadcaster<T> {
    registry: Arc<Registry<T>>,
}

impl<T> Clone for Broadcaster<T> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
        }
    }
}

impl<T> Broadcaster<T> {
    /// `label` names the channel in slow-subscriber warnings.
    pub fn new(label: &'static str) -> Self {
        Self {
            registry: Arc::new(Registry {
                label,
                next_id: AtomicU64::new(0),
                subscribers: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry.subscribers.write().insert(id, tx);
        Subscription {
            id,
            rx,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Remove a subscriber and close its queue.
    ///
    /// Dropping the handle has the same effect; this is the explicit form.
    pub fn unsubscribe(&self, subscription: Subscription<T>) {
        drop(subscription);
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.subscribers.read().len()
    }

    /// Remove and close every subscriber queue.
    pub fn cleanup(&self) {
        self.registry.subscribers.write().clear();
    }
}

impl<T: Clone> Broadcaster<T> {
    /// Offer the item to every subscriber without blocking.
    pub fn broadcast(&self, item: T) {
        let subscribers = self.registry.subscribers.read();
        for tx in subscribers.values() {
            match tx.try_send(item.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        channel = self.registry.label,
                        "slow subscriber, queue is full, dropping item"
                    );
                }
                // subscriber dropped concurrently; the map entry goes away
                // with the subscription handle
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
    }
}

/// A subscriber's receiving end. Unsubscribes itself on drop.
pub struct Subscription<T> {
    id: u64,
    rx: mpsc::Receiver<T>,
    registry: Weak<Registry<T>>,
}

impl<T> Subscription<T> {
    /// Receive the next item. `None` once the queue is closed and drained.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.subscribers.write().remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_in_broadcast_order() {
        let broadcaster = Broadcaster::new("test");
        let mut a = broadcaster.subscribe();
        let mut b = broadcaster.subscribe();

        for i in 0..5u32 {
            broadcaster.broadcast(i);
        }
        for i in 0..5u32 {
            assert_eq!(a.recv().await, Some(i));
            assert_eq!(b.recv().await, Some(i));
        }
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let broadcaster = Broadcaster::new("test");
        let mut sub = broadcaster.subscribe();

        for i in 0..(SUBSCRIBER_CAPACITY as u32 + 10) {
            broadcaster.broadcast(i);
        }

        // exactly the first CAPACITY items survive, in order
        for i in 0..SUBSCRIBER_CAPACITY as u32 {
            assert_eq!(sub.recv().await, Some(i));
        }
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn drop_unsubscribes() {
        let broadcaster = Broadcaster::new("test");
        let sub = broadcaster.subscribe();
        assert_eq!(broadcaster.subscriber_count(), 1);
        drop(sub);
        assert_eq!(broadcaster.subscriber_count(), 0);
        broadcaster.broadcast(1u32);
    }

    #[tokio::test]
    async fn cleanup_closes_all_queues() {
        let broadcaster = Broadcaster::new("test");
        let mut sub = broadcaster.subscribe();
        broadcaster.broadcast(7u32);
        broadcaster.cleanup();

        // buffered item is still delivered, then the queue reports closed
        assert_eq!(sub.recv().await, Some(7));
        assert_eq!(sub.recv().await, None);
        assert_eq!(broadcaster.subscriber_count(), 0);
    }
}
