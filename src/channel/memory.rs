//! In-memory host channel
//!
//! Pairs a widget-side [`MemoryChannel`] with a host-side [`MemoryHost`].
//! Used by tests and the harness binary in place of a real host page.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tokio::sync::mpsc;

use super::{HostChannel, HostMessage, Subscription};
use crate::error::{Result, WidgetError};

type Subscribers = DashMap<u64, mpsc::UnboundedSender<HostMessage>>;

/// Create a connected widget/host channel pair
pub fn memory_channel() -> (MemoryChannel, MemoryHost) {
    let subscribers = Arc::new(Subscribers::new());
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

    let channel = MemoryChannel {
        subscribers: Arc::clone(&subscribers),
        outbound: outbound_tx,
        next_id: Arc::new(AtomicU64::new(0)),
    };
    let host = MemoryHost {
        subscribers,
        outbound: outbound_rx,
    };

    (channel, host)
}

/// Widget side of an in-memory channel
#[derive(Clone)]
pub struct MemoryChannel {
    subscribers: Arc<Subscribers>,
    outbound: mpsc::UnboundedSender<HostMessage>,
    next_id: Arc<AtomicU64>,
}

impl HostChannel for MemoryChannel {
    fn send(&self, message: HostMessage) -> Result<()> {
        self.outbound
            .send(message)
            .map_err(|e| WidgetError::Channel(format!("host is gone, dropped '{}'", e.0.kind)))
    }

    fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.insert(id, tx);

        let subscribers: Weak<Subscribers> = Arc::downgrade(&self.subscribers);
        Subscription::new(rx, move || {
            if let Some(subscribers) = subscribers.upgrade() {
                subscribers.remove(&id);
            }
        })
    }
}

/// Host side of an in-memory channel
pub struct MemoryHost {
    subscribers: Arc<Subscribers>,
    outbound: mpsc::UnboundedReceiver<HostMessage>,
}

impl MemoryHost {
    /// Next message posted by the widget
    pub async fn recv(&mut self) -> Option<HostMessage> {
        self.outbound.recv().await
    }

    /// Next message posted by the widget, if one is already queued
    pub fn try_recv(&mut self) -> Option<HostMessage> {
        self.outbound.try_recv().ok()
    }

    /// Deliver a message to every active subscription.
    ///
    /// Returns how many subscriptions received it.
    pub fn deliver(&self, message: HostMessage) -> usize {
        self.subscribers
            .iter()
            .filter(|entry| entry.value().send(message.clone()).is_ok())
            .count()
    }

    /// Number of active subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
