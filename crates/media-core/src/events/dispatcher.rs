//! Subscription index and fan-out
//!
//! The dispatcher does not check whether objects exist or which events they
//! emit; the graph validates both under the object's lock before calling
//! [`EventDispatcher::subscribe`]. Publishing for an object is likewise
//! serialized by the graph, which keeps per-object event order.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use rmedia_infra_common::{DispatchConfig, TaskManager};

use super::pool::{DeliveryJob, DeliveryPool};
use super::{Destination, EventNotification, EventSink};
use crate::types::{EventType, ObjectId, SubscriptionId};

/// A live subscription
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: SubscriptionId,
    pub object_id: ObjectId,
    pub event_type: EventType,
    pub destination: Destination,
    pub created_at: DateTime<Utc>,
}

/// Dispatcher counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchStats {
    pub subscriptions: usize,
    /// Event occurrences published
    pub published: u64,
    /// Notifications accepted by a worker queue
    pub enqueued: u64,
    pub delivered: u64,
    /// Sink errors and timeouts
    pub failed: u64,
    /// Notifications lost to full or closed queues
    pub dropped: u64,
}

/// Subscription index plus the delivery pool
pub struct EventDispatcher {
    by_object: DashMap<ObjectId, Vec<Subscription>>,
    by_id: DashMap<SubscriptionId, ObjectId>,
    pool: DeliveryPool,
    published: AtomicU64,
}

impl EventDispatcher {
    pub fn new(config: &DispatchConfig, sink: Arc<dyn EventSink>) -> Self {
        Self {
            by_object: DashMap::new(),
            by_id: DashMap::new(),
            pool: DeliveryPool::new(config, sink),
            published: AtomicU64::new(0),
        }
    }

    /// Start the delivery workers
    pub async fn start(&self, tasks: &TaskManager) -> rmedia_infra_common::Result<usize> {
        self.pool.start(tasks).await
    }

    /// Register a subscription. The caller guarantees the object is live and
    /// emits `event_type`.
    pub fn subscribe(&self, object_id: ObjectId, event_type: EventType, destination: Destination) -> SubscriptionId {
        let id = SubscriptionId::new();
        debug!("Subscribing {} to {} on {}", destination, event_type, object_id);

        self.by_object.entry(object_id).or_default().push(Subscription {
            id,
            object_id,
            event_type,
            destination,
            created_at: Utc::now(),
        });
        self.by_id.insert(id, object_id);
        id
    }

    /// Remove a subscription. Unknown ids are a no-op; returns whether one
    /// was removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let Some((_, object_id)) = self.by_id.remove(&id) else {
            return false;
        };

        if let Some(mut subs) = self.by_object.get_mut(&object_id) {
            subs.retain(|s| s.id != id);
        }
        self.by_object.remove_if(&object_id, |_, subs| subs.is_empty());
        debug!("Unsubscribed {} from {}", id, object_id);
        true
    }

    /// Fan an event out to the matching subscriptions. Returns the number
    /// of notifications queued.
    pub fn publish(&self, object_id: ObjectId, event_type: &EventType, payload: serde_json::Value) -> usize {
        let targets: Vec<Subscription> = match self.by_object.get(&object_id) {
            Some(subs) => subs.iter().filter(|s| &s.event_type == event_type).cloned().collect(),
            None => Vec::new(),
        };
        self.published.fetch_add(1, Ordering::Relaxed);
        self.fan_out(object_id, event_type, payload, targets)
    }

    /// Publish `Destroyed` for an object and drop every subscription
    /// anchored to it, so nothing can follow the `Destroyed` notification.
    pub fn publish_final(&self, object_id: ObjectId, payload: serde_json::Value) -> usize {
        let subs = self.by_object.remove(&object_id).map(|(_, subs)| subs).unwrap_or_default();
        for sub in &subs {
            self.by_id.remove(&sub.id);
        }

        let targets: Vec<Subscription> = subs
            .into_iter()
            .filter(|s| s.event_type == EventType::Destroyed)
            .collect();
        self.published.fetch_add(1, Ordering::Relaxed);
        self.fan_out(object_id, &EventType::Destroyed, payload, targets)
    }

    fn fan_out(
        &self,
        object_id: ObjectId,
        event_type: &EventType,
        payload: serde_json::Value,
        targets: Vec<Subscription>,
    ) -> usize {
        let timestamp = Utc::now();
        targets
            .into_iter()
            .filter(|sub| {
                self.pool.enqueue(DeliveryJob {
                    destination: sub.destination.clone(),
                    notification: EventNotification {
                        subscription_id: sub.id,
                        object_id,
                        event_type: event_type.clone(),
                        payload: payload.clone(),
                        timestamp,
                    },
                })
            })
            .count()
    }

    /// Remove every subscription held by `destination` (its client session
    /// ended) and close its delivery lane. Returns how many were removed.
    pub fn release_destination(&self, destination: &Destination) -> usize {
        let mut removed = Vec::new();
        self.by_object.retain(|_, subs| {
            subs.retain(|s| {
                if &s.destination == destination {
                    removed.push(s.id);
                    false
                } else {
                    true
                }
            });
            !subs.is_empty()
        });

        for id in &removed {
            self.by_id.remove(id);
        }
        if !removed.is_empty() {
            debug!("Released {} subscriptions of {}", removed.len(), destination);
        }
        self.pool.release(destination);
        removed.len()
    }

    /// Whether any subscription is anchored to the object
    pub fn has_subscriptions(&self, object_id: ObjectId) -> bool {
        self.by_object.get(&object_id).is_some_and(|subs| !subs.is_empty())
    }

    pub fn subscriptions_for(&self, object_id: ObjectId) -> Vec<Subscription> {
        self.by_object
            .get(&object_id)
            .map(|subs| subs.clone())
            .unwrap_or_default()
    }

    pub fn subscription(&self, id: SubscriptionId) -> Option<Subscription> {
        let object_id = *self.by_id.get(&id)?;
        self.by_object
            .get(&object_id)
            .and_then(|subs| subs.iter().find(|s| s.id == id).cloned())
    }

    pub fn stats(&self) -> DispatchStats {
        let counters = self.pool.counters();
        DispatchStats {
            subscriptions: self.by_id.len(),
            published: self.published.load(Ordering::Relaxed),
            enqueued: counters.enqueued.load(Ordering::Relaxed),
            delivered: counters.delivered.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            dropped: counters.dropped.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeliveryError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct CollectingSink {
        seen: Mutex<Vec<(Destination, EventNotification)>>,
    }

    #[async_trait]
    impl EventSink for CollectingSink {
        async fn deliver(&self, destination: &Destination, n: &EventNotification) -> Result<(), DeliveryError> {
            self.seen.lock().push((destination.clone(), n.clone()));
            Ok(())
        }
    }

    fn dispatcher() -> (EventDispatcher, Arc<CollectingSink>) {
        let sink = Arc::new(CollectingSink::default());
        let config = DispatchConfig {
            workers: 2,
            queue_capacity: 16,
            delivery_timeout_ms: 500,
        };
        (EventDispatcher::new(&config, sink.clone()), sink)
    }

    #[test]
    fn test_publish_matches_event_type() {
        let (dispatcher, _) = dispatcher();
        let object = ObjectId::new();
        dispatcher.subscribe(object, EventType::EndOfStream, "a".into());
        dispatcher.subscribe(object, EventType::MediaError, "a".into());
        dispatcher.subscribe(object, EventType::EndOfStream, "b".into());

        assert_eq!(dispatcher.publish(object, &EventType::EndOfStream, serde_json::Value::Null), 2);
        assert_eq!(dispatcher.publish(ObjectId::new(), &EventType::EndOfStream, serde_json::Value::Null), 0);
        assert_eq!(dispatcher.stats().published, 2);
        assert_eq!(dispatcher.stats().enqueued, 2);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let (dispatcher, _) = dispatcher();
        let object = ObjectId::new();
        let id = dispatcher.subscribe(object, EventType::Destroyed, "a".into());
        assert!(dispatcher.has_subscriptions(object));

        assert!(dispatcher.unsubscribe(id));
        assert!(!dispatcher.unsubscribe(id));
        assert!(!dispatcher.unsubscribe(SubscriptionId::new()));
        assert!(!dispatcher.has_subscriptions(object));
    }

    #[test]
    fn test_publish_final_removes_everything() {
        let (dispatcher, _) = dispatcher();
        let object = ObjectId::new();
        let destroyed = dispatcher.subscribe(object, EventType::Destroyed, "a".into());
        let eos = dispatcher.subscribe(object, EventType::EndOfStream, "a".into());

        assert_eq!(dispatcher.publish_final(object, serde_json::Value::Null), 1);
        assert!(!dispatcher.has_subscriptions(object));
        assert!(dispatcher.subscription(destroyed).is_none());
        assert!(!dispatcher.unsubscribe(eos));
        assert_eq!(dispatcher.publish(object, &EventType::EndOfStream, serde_json::Value::Null), 0);
    }

    #[test]
    fn test_release_destination() {
        let (dispatcher, _) = dispatcher();
        let a = ObjectId::new();
        let b = ObjectId::new();
        dispatcher.subscribe(a, EventType::Destroyed, "gone".into());
        dispatcher.subscribe(b, EventType::Destroyed, "gone".into());
        let kept = dispatcher.subscribe(b, EventType::Destroyed, "stays".into());

        assert_eq!(dispatcher.release_destination(&"gone".into()), 2);
        assert!(!dispatcher.has_subscriptions(a));
        assert_eq!(dispatcher.subscriptions_for(b).len(), 1);
        assert!(dispatcher.subscription(kept).is_some());
        assert_eq!(dispatcher.stats().subscriptions, 1);
    }

    #[tokio::test]
    async fn test_notifications_reach_sink() {
        let (dispatcher, sink) = dispatcher();
        let tasks = TaskManager::new("dispatch-test");
        dispatcher.start(&tasks).await.unwrap();

        let object = ObjectId::new();
        let id = dispatcher.subscribe(object, EventType::Custom("CodeFound".into()), "client".into());
        dispatcher.publish(object, &EventType::Custom("CodeFound".into()), serde_json::json!({ "code": "42" }));
        tokio::time::sleep(Duration::from_millis(50)).await;

        let seen = sink.seen.lock().clone();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0.as_str(), "client");
        assert_eq!(seen[0].1.subscription_id, id);
        assert_eq!(seen[0].1.payload["code"], "42");
        assert_eq!(dispatcher.stats().delivered, 1);

        tasks.shutdown_all().await.unwrap();
    }
}
