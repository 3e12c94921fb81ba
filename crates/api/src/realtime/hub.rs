//! Subscriber registry and fanout
//!
//! Two registries live behind one lock: the staff-wide feed and a map of
//! per-conversation rooms. Publishing snapshots the target list and delivers
//! outside the lock, so a slow sink never blocks subscribe, unsubscribe or a
//! publish to another scope.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

use super::events::StreamEvent;
use super::sink::{EventSink, SinkError};

/// Where an event is published or a subscriber listens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Staff,
    Conversation(Uuid),
}

/// Who sits behind a sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Staff,
    Customer,
}

impl Audience {
    pub fn for_staff(is_staff: bool) -> Self {
        if is_staff {
            Audience::Staff
        } else {
            Audience::Customer
        }
    }
}

struct Subscriber {
    id: Uuid,
    audience: Audience,
    sink: Arc<dyn EventSink>,
}

#[derive(Default)]
struct Registry {
    staff: Vec<Arc<Subscriber>>,
    rooms: HashMap<Uuid, Vec<Arc<Subscriber>>>,
}

impl Registry {
    fn snapshot(&self, scope: Scope) -> Vec<Arc<Subscriber>> {
        match scope {
            Scope::Staff => self.staff.clone(),
            Scope::Conversation(id) => self.rooms.get(&id).cloned().unwrap_or_default(),
        }
    }

    fn insert(&mut self, scope: Scope, subscriber: Arc<Subscriber>) -> usize {
        let list = match scope {
            Scope::Staff => &mut self.staff,
            Scope::Conversation(id) => self.rooms.entry(id).or_default(),
        };
        list.push(subscriber);
        list.len()
    }

    fn remove(&mut self, scope: Scope, subscriber_id: Uuid) -> bool {
        match scope {
            Scope::Staff => {
                let before = self.staff.len();
                self.staff.retain(|s| s.id != subscriber_id);
                self.staff.len() < before
            }
            Scope::Conversation(id) => {
                let Some(room) = self.rooms.get_mut(&id) else {
                    return false;
                };
                let before = room.len();
                room.retain(|s| s.id != subscriber_id);
                let removed = room.len() < before;

                // Clean up empty rooms
                if room.is_empty() {
                    self.rooms.remove(&id);
                    tracing::debug!(conversation_id = %id, "Removed empty conversation room");
                }
                removed
            }
        }
    }
}

/// Registration handle. Dropping it deregisters the subscriber.
pub struct Subscription {
    id: Uuid,
    scope: Scope,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            if registry.lock().remove(self.scope, self.id) {
                tracing::debug!(
                    subscriber_id = %self.id,
                    scope = ?self.scope,
                    "Subscriber removed"
                );
            }
        }
    }
}

/// Outcome of one publish call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HubStats {
    pub staff_subscribers: usize,
    pub conversation_rooms: usize,
    pub total_subscribers: usize,
}

/// Process-wide event hub, cheap to clone
#[derive(Clone, Default)]
pub struct EventHub {
    registry: Arc<Mutex<Registry>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `sink` on `scope`.
    ///
    /// The sink receives a `ready` frame before it becomes visible to
    /// publishers, so no domain event can overtake it.
    pub fn subscribe(
        &self,
        scope: Scope,
        audience: Audience,
        sink: Arc<dyn EventSink>,
    ) -> Subscription {
        let id = Uuid::new_v4();
        let subscriber = Arc::new(Subscriber { id, audience, sink });

        let mut registry = self.registry.lock();
        if let Err(e) = subscriber.sink.deliver(&StreamEvent::Ready { subscriber_id: id }) {
            tracing::warn!(subscriber_id = %id, error = %e, "Failed to send ready frame");
        }
        let size = registry.insert(scope, subscriber);
        drop(registry);

        tracing::debug!(
            subscriber_id = %id,
            scope = ?scope,
            audience = ?audience,
            scope_size = size,
            "Subscriber added"
        );

        Subscription {
            id,
            scope,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Remove a subscriber explicitly. Returns whether it was registered.
    pub fn unsubscribe(&self, scope: Scope, subscriber_id: Uuid) -> bool {
        self.registry.lock().remove(scope, subscriber_id)
    }

    pub fn publish_to_staff(&self, event: &StreamEvent) -> PublishReport {
        self.publish(Scope::Staff, event)
    }

    pub fn publish_to_conversation(&self, conversation_id: Uuid, event: &StreamEvent) -> PublishReport {
        self.publish(Scope::Conversation(conversation_id), event)
    }

    /// Deliver `event` to every subscriber of `scope`.
    ///
    /// Never fails: a sink that errors is logged and evicted, and the
    /// remaining sinks still receive the event.
    pub fn publish(&self, scope: Scope, event: &StreamEvent) -> PublishReport {
        let targets = self.registry.lock().snapshot(scope);
        let staff_only = event.is_staff_only();

        let mut report = PublishReport::default();
        let mut evicted = Vec::new();

        for subscriber in &targets {
            if staff_only && subscriber.audience == Audience::Customer {
                report.skipped += 1;
                continue;
            }
            match subscriber.sink.deliver(event) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(
                        subscriber_id = %subscriber.id,
                        event_type = event.event_type(),
                        error = %e,
                        "Failed to deliver event to subscriber"
                    );
                    evicted.push((subscriber.id, e));
                }
            }
        }

        if !evicted.is_empty() {
            let mut registry = self.registry.lock();
            for (id, reason) in evicted {
                if registry.remove(scope, id) {
                    tracing::info!(
                        subscriber_id = %id,
                        lagging = reason == SinkError::Lagging,
                        "Evicted subscriber after failed delivery"
                    );
                }
            }
        }

        tracing::debug!(
            scope = ?scope,
            event_type = event.event_type(),
            recipients = report.delivered,
            skipped = report.skipped,
            failed = report.failed,
            "Published event"
        );

        report
    }

    /// Drop every registered sink, ending all open streams.
    /// Returns how many subscribers were removed.
    pub fn disconnect_all(&self) -> usize {
        let mut registry = self.registry.lock();
        let removed = registry.staff.len() + registry.rooms.values().map(Vec::len).sum::<usize>();
        registry.staff.clear();
        registry.rooms.clear();
        removed
    }

    /// Wait for `signal`, then [`disconnect_all`](Self::disconnect_all).
    /// A signal that fails to install never resolves, so shutdown only
    /// happens on an actual signal.
    pub async fn disconnect_on<F>(&self, signal: F) -> usize
    where
        F: Future<Output = std::io::Result<()>>,
    {
        if let Err(e) = signal.await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        self.disconnect_all()
    }

    pub fn subscriber_count(&self, scope: Scope) -> usize {
        let registry = self.registry.lock();
        match scope {
            Scope::Staff => registry.staff.len(),
            Scope::Conversation(id) => registry.rooms.get(&id).map(Vec::len).unwrap_or(0),
        }
    }

    pub fn stats(&self) -> HubStats {
        let registry = self.registry.lock();
        let in_rooms: usize = registry.rooms.values().map(Vec::len).sum();
        HubStats {
            staff_subscribers: registry.staff.len(),
            conversation_rooms: registry.rooms.len(),
            total_subscribers: registry.staff.len() + in_rooms,
        }
    }
}
