//! Fan-out of gateway events to operator sessions
//!
//! Every session gets its own bounded queue. Publishing never blocks: a full
//! queue drops the event for that session only, and a closed queue removes
//! the session.

use std::sync::Arc;

use gateway_types::GatewayEvent;
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug)]
struct Subscriber {
    id: Uuid,
    sender: mpsc::Sender<Arc<GatewayEvent>>,
    /// Peer description for logging
    name: String,
}

/// Hub delivery counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HubMetrics {
    pub events_published: u64,
    pub events_delivered: u64,
    pub events_dropped: u64,
    pub dead_subscribers_removed: u64,
    pub active_subscribers: usize,
}

pub struct Hub {
    subscribers: RwLock<Vec<Subscriber>>,
    metrics: RwLock<HubMetrics>,
}

impl Hub {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            metrics: RwLock::new(HubMetrics::default()),
        }
    }

    /// Register a session and return its queue.
    pub async fn subscribe(
        &self,
        id: Uuid,
        name: String,
        buffer_size: usize,
    ) -> mpsc::Receiver<Arc<GatewayEvent>> {
        let (sender, receiver) = mpsc::channel(buffer_size.max(1));

        let active = {
            let mut subscribers = self.subscribers.write().await;
            subscribers.push(Subscriber {
                id,
                sender,
                name: name.clone(),
            });
            subscribers.len()
        };
        self.metrics.write().await.active_subscribers = active;

        debug!(subscriber = %name, %id, buffer_size, "New subscriber registered");
        receiver
    }

    /// Remove a session. Unknown ids are ignored.
    pub async fn unsubscribe(&self, id: Uuid) {
        let active = {
            let mut subscribers = self.subscribers.write().await;
            subscribers.retain(|s| s.id != id);
            subscribers.len()
        };
        self.metrics.write().await.active_subscribers = active;
    }

    /// Deliver `event` to every session without waiting on any of them.
    pub async fn publish(&self, event: GatewayEvent) {
        let event = Arc::new(event);
        let subscribers = self.subscribers.read().await;
        let mut dead = Vec::new();
        let mut delivered = 0;
        let mut dropped = 0;

        for subscriber in subscribers.iter() {
            match subscriber.sender.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        subscriber = %subscriber.name,
                        event_type = event.event_type_name(),
                        "Subscriber buffer full, dropping event"
                    );
                    dropped += 1;
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(subscriber = %subscriber.name, "Subscriber channel closed, marking for removal");
                    dead.push(subscriber.id);
                }
            }
        }
        drop(subscribers);

        let active = if dead.is_empty() {
            None
        } else {
            let mut subscribers = self.subscribers.write().await;
            subscribers.retain(|s| !dead.contains(&s.id));
            Some(subscribers.len())
        };

        let mut metrics = self.metrics.write().await;
        metrics.events_published += 1;
        metrics.events_delivered += delivered;
        metrics.events_dropped += dropped;
        metrics.dead_subscribers_removed += dead.len() as u64;
        if let Some(active) = active {
            metrics.active_subscribers = active;
        }
    }

    pub async fn metrics(&self) -> HubMetrics {
        *self.metrics.read().await
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}
