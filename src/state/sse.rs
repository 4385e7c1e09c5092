use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::dto::sse::ServerEvent;

/// Broadcast hub feeding the SSE streams of one shop.
pub struct SseHub {
    sender: broadcast::Sender<ServerEvent>,
}

impl SseHub {
    /// Construct a new hub backed by a Tokio broadcast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a new subscriber that will receive subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Send an event to all current subscribers, ignoring delivery errors.
    pub fn broadcast(&self, event: ServerEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Lazily created hubs, one per shop with at least one listener.
pub struct ShopHubs {
    hubs: DashMap<Uuid, Arc<SseHub>>,
    capacity: usize,
}

impl ShopHubs {
    pub fn new(capacity: usize) -> Self {
        Self {
            hubs: DashMap::new(),
            capacity,
        }
    }

    /// Hub of `shop_id`, created on first use.
    pub fn hub(&self, shop_id: Uuid) -> Arc<SseHub> {
        self.hubs
            .entry(shop_id)
            .or_insert_with(|| Arc::new(SseHub::new(self.capacity)))
            .clone()
    }

    /// Deliver to the shop's listeners. Shops nobody listens to are skipped.
    pub fn broadcast(&self, shop_id: Uuid, event: ServerEvent) {
        if let Some(hub) = self.hubs.get(&shop_id) {
            hub.broadcast(event);
        }
    }

    /// Deliver to every shop.
    pub fn broadcast_all(&self, event: &ServerEvent) {
        for hub in self.hubs.iter() {
            hub.broadcast(event.clone());
        }
    }

    /// Drop the shop's hub once its last listener is gone.
    pub fn release(&self, shop_id: Uuid) {
        self.hubs
            .remove_if(&shop_id, |_, hub| hub.subscriber_count() == 0);
    }

    pub fn len(&self) -> usize {
        self.hubs.len()
    }
}
