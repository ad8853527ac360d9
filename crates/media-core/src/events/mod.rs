//! Event subscriptions and delivery
//!
//! Observers subscribe to `(object, event type)` pairs. Publishing fans out
//! to the matching subscriptions and enqueues one delivery job per
//! subscription on a sharded worker pool; the publisher never waits for,
//! nor learns about, delivery outcomes.

pub mod dispatcher;
pub mod pool;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DeliveryError;
use crate::types::{EventType, ObjectId, SubscriptionId};

pub use dispatcher::{DispatchStats, EventDispatcher, Subscription};
pub use pool::{DeliveryJob, DeliveryPool};

/// Opaque address of a remote observer, supplied by the transport
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Destination(pub String);

impl Destination {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Destination {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One event occurrence as delivered to one subscription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventNotification {
    pub subscription_id: SubscriptionId,
    pub object_id: ObjectId,
    pub event_type: EventType,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Push channel towards remote observers
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Deliver one notification. Errors are logged and counted by the
    /// caller, never retried.
    async fn deliver(&self, destination: &Destination, notification: &EventNotification) -> Result<(), DeliveryError>;
}
