//! Media objects and their lock-guarded state

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, MutexGuard};
use tokio::time::Instant;

use crate::registry::{ElementFactory, EngineHandle};
use crate::types::{EventType, ObjectId, ObjectInfo, ObjectKind};

/// Lifecycle of a media object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Visible and usable
    Live,
    /// Claimed by a destroy; no new children, connections or subscriptions
    Releasing,
    /// Torn down and removed from the index
    Released,
}

/// Mutable state of an object, guarded by its lock
#[derive(Debug)]
pub(crate) struct ObjectState {
    pub lifecycle: Lifecycle,
    pub last_touched: Instant,
    /// Owned children in creation order
    pub children: Vec<ObjectId>,
    /// Mixer ports routing this element
    pub routed_by: Vec<ObjectId>,
    pub handle: Option<EngineHandle>,
    pub name: String,
    pub tags: BTreeMap<String, String>,
}

impl ObjectState {
    pub fn is_live(&self) -> bool {
        self.lifecycle == Lifecycle::Live
    }

    pub fn touch(&mut self) {
        self.last_touched = Instant::now();
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_touched)
    }
}

/// A node of the media object graph.
///
/// Identity, kind and ownership edges are immutable; everything else lives
/// behind the object's lock.
pub struct MediaObject {
    pub id: ObjectId,
    pub kind: ObjectKind,
    pub parent: Option<ObjectId>,
    /// Root pipeline (the object itself for pipelines)
    pub pipeline: ObjectId,
    /// Element routed by a mixer port
    pub routed: Option<ObjectId>,
    pub retention: Duration,
    pub created_at: DateTime<Utc>,
    /// Event types this object emits
    pub events: Vec<EventType>,
    pub(crate) factory: Option<Arc<dyn ElementFactory>>,
    state: Mutex<ObjectState>,
    released_tx: watch::Sender<bool>,
    _released_rx: watch::Receiver<bool>,
}

pub(crate) struct NewObject {
    pub id: ObjectId,
    pub kind: ObjectKind,
    pub parent: Option<ObjectId>,
    pub pipeline: ObjectId,
    pub routed: Option<ObjectId>,
    pub retention: Duration,
    pub events: Vec<EventType>,
    pub factory: Option<Arc<dyn ElementFactory>>,
    pub handle: Option<EngineHandle>,
    pub name: Option<String>,
}

impl MediaObject {
    pub(crate) fn new(init: NewObject) -> Self {
        let (released_tx, released_rx) = watch::channel(false);
        let name = init
            .name
            .unwrap_or_else(|| format!("{}_{}", init.kind.type_name(), init.id.short()));

        Self {
            id: init.id,
            kind: init.kind,
            parent: init.parent,
            pipeline: init.pipeline,
            routed: init.routed,
            retention: init.retention,
            created_at: Utc::now(),
            events: init.events,
            factory: init.factory,
            state: Mutex::new(ObjectState {
                lifecycle: Lifecycle::Live,
                last_touched: Instant::now(),
                children: Vec::new(),
                routed_by: Vec::new(),
                handle: init.handle,
                name,
                tags: BTreeMap::new(),
            }),
            released_tx,
            _released_rx: released_rx,
        }
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, ObjectState> {
        self.state.lock().await
    }

    pub fn emits(&self, event: &EventType) -> bool {
        self.events.contains(event)
    }

    pub async fn lifecycle(&self) -> Lifecycle {
        self.state.lock().await.lifecycle
    }

    pub(crate) fn mark_released(&self) {
        self.released_tx.send_replace(true);
    }

    /// Resolve once the object has been fully torn down
    pub async fn wait_released(&self) {
        let mut rx = self.released_tx.subscribe();
        let _ = rx.wait_for(|released| *released).await;
    }

    pub(crate) fn info(&self, state: &ObjectState) -> ObjectInfo {
        ObjectInfo {
            id: self.id,
            type_name: self.kind.type_name().to_string(),
            category: self.kind.category(),
            parent: self.parent,
            pipeline: self.pipeline,
            name: state.name.clone(),
            tags: state.tags.clone(),
            created_at: self.created_at,
            retention_ms: self.retention.as_millis() as u64,
            idle_ms: state.idle_for(Instant::now()).as_millis() as u64,
            children: state.children.clone(),
            routed: self.routed,
            events: self.events.clone(),
        }
    }
}

impl fmt::Debug for MediaObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaObject")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("parent", &self.parent)
            .field("routed", &self.routed)
            .finish()
    }
}
